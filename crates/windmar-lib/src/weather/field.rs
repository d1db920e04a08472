//! Read-only weather snapshots handed to the search engines.
//!
//! A [`WeatherField`] owns decoded slices for the hours a search needs, so
//! sampling never touches the store and concurrent searches share nothing
//! mutable.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::error::Result;
use crate::geo::LatLon;

use super::store::WeatherStore;
use super::types::{ForecastRun, ForecastSource, GridSlice, MetOcean};

#[derive(Debug, Clone)]
struct SourceLayer {
    run: Arc<ForecastRun>,
    /// Slices per forecast hour, in `ForecastSource::parameters` order.
    hours: BTreeMap<u32, Vec<GridSlice>>,
}

impl SourceLayer {
    fn nearest_hour(&self, valid_time: DateTime<Utc>) -> Option<&Vec<GridSlice>> {
        let offset = (valid_time - self.run.run_time).num_seconds() as f64 / 3600.0;
        self.hours
            .iter()
            .min_by(|(a, _), (b, _)| {
                let da = (**a as f64 - offset).abs();
                let db = (**b as f64 - offset).abs();
                da.total_cmp(&db)
            })
            .map(|(_, slices)| slices)
    }

    fn last_valid_time(&self) -> Option<DateTime<Utc>> {
        self.run
            .last_hour()
            .map(|h| self.run.run_time + Duration::hours(h as i64))
    }
}

/// Time-indexed weather over the region of one search.
#[derive(Debug, Clone, Default)]
pub struct WeatherField {
    layers: Vec<SourceLayer>,
}

impl WeatherField {
    /// A field with no data; every sample is calm.
    pub fn calm() -> Self {
        Self::default()
    }

    /// Load the hours of each run whose valid times are nearest to the
    /// interval `[from, until]`.
    pub fn load(
        store: &WeatherStore,
        runs: &[Arc<ForecastRun>],
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Self> {
        let mut layers = Vec::with_capacity(runs.len());
        for run in runs {
            let (Some(first), Some(last)) = (run.nearest_hour(from), run.nearest_hour(until)) else {
                continue;
            };
            let mut hours = BTreeMap::new();
            for &hour in run.forecast_hours.iter().filter(|h| (first..=last).contains(*h)) {
                let slices = run
                    .source
                    .parameters()
                    .iter()
                    .map(|parameter| store.require_slice(run.id, hour, parameter))
                    .collect::<Result<Vec<_>>>()?;
                hours.insert(hour, slices);
            }
            debug!(
                run_id = run.id,
                source = %run.source,
                first_hour = first,
                last_hour = last,
                hours = hours.len(),
                "loaded weather layer"
            );
            layers.push(SourceLayer {
                run: Arc::clone(run),
                hours,
            });
        }
        Ok(Self { layers })
    }

    pub fn is_calm(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn run_ids(&self) -> Vec<i64> {
        self.layers.iter().map(|layer| layer.run.id).collect()
    }

    /// Earliest end of coverage across the loaded sources.
    pub fn last_valid_time(&self) -> Option<DateTime<Utc>> {
        self.layers
            .iter()
            .filter_map(SourceLayer::last_valid_time)
            .min()
    }

    /// Weather at a position, using each source's forecast hour nearest to
    /// `valid_time`. Sources without data contribute calm values.
    pub fn sample(&self, position: LatLon, valid_time: DateTime<Utc>) -> MetOcean {
        let mut out = MetOcean::calm();
        for layer in &self.layers {
            let Some(slices) = layer.nearest_hour(valid_time) else {
                continue;
            };
            let values: Vec<f64> = slices
                .iter()
                .map(|slice| slice.sample(position.lat, position.lon))
                .collect();
            match (layer.run.source, values.as_slice()) {
                (ForecastSource::Wind, [u, v]) => {
                    out.wind_u = *u;
                    out.wind_v = *v;
                }
                (ForecastSource::Waves, [hs, tp, dir]) => {
                    out.wave_hs = hs.max(0.0);
                    out.wave_tp = tp.max(0.0);
                    out.wave_dir = *dir;
                }
                (ForecastSource::Currents, [u, v]) => {
                    out.current_u = *u;
                    out.current_v = *v;
                }
                _ => {}
            }
        }
        out
    }
}
