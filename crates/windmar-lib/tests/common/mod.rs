//! Common test utilities and fixture helpers.
//!
//! Forecasts are ingested synchronously straight into a store so routing
//! tests do not need a runtime.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use windmar_lib::{
    BoundingBox, ForecastRun, ForecastSource, LatLon, StormCell, SyntheticSource, WeatherSource,
    WeatherStore,
};

/// Path to fixtures directory used by tests.
#[allow(dead_code)]
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../docs/fixtures")
}

/// Model cycle every fixture forecast is issued at.
#[allow(dead_code)]
pub fn cycle() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
}

/// Hours `0..=horizon` in 3 h steps.
#[allow(dead_code)]
pub fn hours(horizon: u32) -> Vec<u32> {
    (0..=horizon).step_by(3).collect()
}

/// Region every synthetic fixture covers.
#[allow(dead_code)]
pub fn region() -> BoundingBox {
    BoundingBox::new(30.0, 50.0, -40.0, -10.0)
}

/// Stationary storm centred on the 40N track between the route endpoints.
#[allow(dead_code)]
pub fn storm() -> StormCell {
    StormCell {
        center: LatLon::new(40.0, -25.0),
        radius_deg: 3.0,
        peak_wind_ms: 30.0,
        peak_hs_m: 8.0,
    }
}

/// Storm over otherwise calm water on a 1 degree grid.
#[allow(dead_code)]
pub fn storm_source() -> SyntheticSource {
    SyntheticSource::new(region(), 1.0)
        .without_background()
        .with_storm(storm())
}

/// Ingest and complete one run per source, returning the completed runs.
#[allow(dead_code)]
pub fn ingest_all(
    store: &WeatherStore,
    weather: &dyn WeatherSource,
    run_time: DateTime<Utc>,
    hours: &[u32],
) -> Vec<Arc<ForecastRun>> {
    ForecastSource::ALL
        .iter()
        .map(|source| ingest(store, weather, *source, run_time, hours))
        .collect()
}

/// Ingest and complete one run of `source`.
#[allow(dead_code)]
pub fn ingest(
    store: &WeatherStore,
    weather: &dyn WeatherSource,
    source: ForecastSource,
    run_time: DateTime<Utc>,
    hours: &[u32],
) -> Arc<ForecastRun> {
    let run_id = store
        .begin_run(source, run_time, weather.resolution_deg(), weather.bbox())
        .expect("begin run");
    for &hour in hours {
        for parameter in source.parameters() {
            let grid = weather
                .fetch(source, run_time, hour, parameter)
                .expect("synthetic fetch");
            store
                .write_slice(run_id, hour, parameter, &grid)
                .expect("write slice");
        }
        store.record_hour(run_id, hour).expect("record hour");
    }
    store.complete_run(run_id, hours).expect("complete run")
}
