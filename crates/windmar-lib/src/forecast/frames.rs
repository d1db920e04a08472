//! Bulk forecast frames resampled onto a display grid.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::geo::aligned_axis;
use crate::weather::{ForecastRun, ForecastSource, GridSlice, WeatherStore};

/// Default thinning step for lightweight displays, hours.
pub const DEFAULT_THINNING_STEP_HOURS: u32 = 12;

/// Samples of one forecast hour on the display grid, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FrameValues {
    /// Eastward/northward components, m/s.
    Velocity { u: Vec<f32>, v: Vec<f32> },
    /// Single scalar field such as significant wave height.
    Scalar { values: Vec<f32> },
}

/// Every forecast hour of a complete run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastFrames {
    pub source: ForecastSource,
    pub run_id: i64,
    pub run_date: String,
    pub run_hour: String,
    pub lats: Vec<f32>,
    pub lons: Vec<f32>,
    pub frames: BTreeMap<u32, FrameValues>,
    pub cached_hours: usize,
    pub total_hours: usize,
}

impl ForecastFrames {
    /// Keep only hours that are multiples of `step_hours`.
    pub fn thinned(&self, step_hours: u32) -> Self {
        let step = step_hours.max(1);
        let frames: BTreeMap<u32, FrameValues> = self
            .frames
            .iter()
            .filter(|(hour, _)| *hour % step == 0)
            .map(|(hour, values)| (*hour, values.clone()))
            .collect();
        Self {
            cached_hours: frames.len(),
            frames,
            ..self.clone()
        }
    }
}

/// Bilinearly resample a slice onto the given axes.
pub fn resample(slice: &GridSlice, lats: &[f64], lons: &[f64]) -> Vec<f32> {
    let mut out = Vec::with_capacity(lats.len() * lons.len());
    for &lat in lats {
        for &lon in lons {
            out.push(slice.sample(lat, lon) as f32);
        }
    }
    out
}

/// Assemble frames for every hour of a complete run.
pub(crate) fn build_frames(
    store: &WeatherStore,
    run: &ForecastRun,
    display_resolution_deg: f64,
) -> Result<ForecastFrames> {
    let lats = aligned_axis(run.bbox.lat_min, run.bbox.lat_max, display_resolution_deg);
    let lons = aligned_axis(run.bbox.lon_min, run.bbox.lon_max, display_resolution_deg);

    let mut frames = BTreeMap::new();
    for &hour in &run.forecast_hours {
        let values = match run.source {
            ForecastSource::Wind => FrameValues::Velocity {
                u: resample(&store.require_slice(run.id, hour, "wind_u")?, &lats, &lons),
                v: resample(&store.require_slice(run.id, hour, "wind_v")?, &lats, &lons),
            },
            ForecastSource::Currents => FrameValues::Velocity {
                u: resample(&store.require_slice(run.id, hour, "current_u")?, &lats, &lons),
                v: resample(&store.require_slice(run.id, hour, "current_v")?, &lats, &lons),
            },
            ForecastSource::Waves => FrameValues::Scalar {
                values: resample(&store.require_slice(run.id, hour, "wave_hs")?, &lats, &lons),
            },
        };
        frames.insert(hour, values);
    }

    debug!(
        run_id = run.id,
        source = %run.source,
        frames = frames.len(),
        rows = lats.len(),
        cols = lons.len(),
        "assembled forecast frames"
    );

    Ok(ForecastFrames {
        source: run.source,
        run_id: run.id,
        run_date: run.run_date(),
        run_hour: run.run_hour(),
        lats: lats.iter().map(|v| *v as f32).collect(),
        lons: lons.iter().map(|v| *v as f32).collect(),
        cached_hours: frames.len(),
        total_hours: run.forecast_hours.len(),
        frames,
    })
}
