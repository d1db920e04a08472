use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geo::{normalize_degrees, BoundingBox, MS_TO_KTS};

/// Independent forecast feeds, each ingested as its own sequence of runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForecastSource {
    Wind,
    Waves,
    Currents,
}

impl ForecastSource {
    pub const ALL: [ForecastSource; 3] = [
        ForecastSource::Wind,
        ForecastSource::Waves,
        ForecastSource::Currents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ForecastSource::Wind => "wind",
            ForecastSource::Waves => "waves",
            ForecastSource::Currents => "currents",
        }
    }

    /// Parameters that must all be present before an hour counts as cached.
    pub fn parameters(&self) -> &'static [&'static str] {
        match self {
            ForecastSource::Wind => &["wind_u", "wind_v"],
            ForecastSource::Waves => &["wave_hs", "wave_tp", "wave_dir"],
            ForecastSource::Currents => &["current_u", "current_v"],
        }
    }
}

impl fmt::Display for ForecastSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ForecastSource {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "wind" => Ok(ForecastSource::Wind),
            "waves" | "wave" => Ok(ForecastSource::Waves),
            "currents" | "current" => Ok(ForecastSource::Currents),
            other => Err(Error::InvalidConfig {
                key: "source".to_string(),
                message: format!("unknown forecast source '{other}'"),
            }),
        }
    }
}

/// Lifecycle state of a forecast run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Ingesting,
    Complete,
    Failed,
    Superseded,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Ingesting => "ingesting",
            RunStatus::Complete => "complete",
            RunStatus::Failed => "failed",
            RunStatus::Superseded => "superseded",
        }
    }

    pub(crate) fn parse(value: &str) -> Result<Self> {
        match value {
            "ingesting" => Ok(RunStatus::Ingesting),
            "complete" => Ok(RunStatus::Complete),
            "failed" => Ok(RunStatus::Failed),
            "superseded" => Ok(RunStatus::Superseded),
            other => Err(Error::CorruptData {
                message: format!("unknown run status '{other}'"),
            }),
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ingestion cycle of one weather source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRun {
    pub id: i64,
    pub source: ForecastSource,
    pub run_time: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub resolution_deg: f64,
    pub bbox: BoundingBox,
    /// Ascending forecast-hour offsets known to be available.
    pub forecast_hours: Vec<u32>,
    pub metadata: serde_json::Value,
}

impl ForecastRun {
    /// Model cycle date as `YYYYMMDD`.
    pub fn run_date(&self) -> String {
        self.run_time.format("%Y%m%d").to_string()
    }

    /// Model cycle hour as `HH`.
    pub fn run_hour(&self) -> String {
        self.run_time.format("%H").to_string()
    }

    /// Largest forecast hour of the run, if any were recorded.
    pub fn last_hour(&self) -> Option<u32> {
        self.forecast_hours.iter().copied().max()
    }

    /// Forecast hour nearest to `valid_time`, clamped to the recorded range.
    pub fn nearest_hour(&self, valid_time: DateTime<Utc>) -> Option<u32> {
        let offset_hours = (valid_time - self.run_time).num_seconds() as f64 / 3600.0;
        self.forecast_hours.iter().copied().min_by(|a, b| {
            let da = (*a as f64 - offset_hours).abs();
            let db = (*b as f64 - offset_hours).abs();
            da.total_cmp(&db).then(a.cmp(b))
        })
    }
}

/// A rectangular grid of samples plus its coordinate axes, as supplied by a
/// weather source. Data is row-major with `lats.len()` rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawGrid {
    pub lats: Vec<f32>,
    pub lons: Vec<f32>,
    pub data: Vec<f32>,
}

impl RawGrid {
    pub fn rows(&self) -> usize {
        self.lats.len()
    }

    pub fn cols(&self) -> usize {
        self.lons.len()
    }

    pub fn validate_shape(&self) -> Result<()> {
        if self.lats.is_empty() || self.lons.is_empty() {
            return Err(Error::InvalidShape {
                message: "grid axes must not be empty".to_string(),
            });
        }
        let expected = self.rows() * self.cols();
        if self.data.len() != expected {
            return Err(Error::InvalidShape {
                message: format!(
                    "data has {} values but axes describe {}x{} = {}",
                    self.data.len(),
                    self.rows(),
                    self.cols(),
                    expected
                ),
            });
        }
        Ok(())
    }
}

/// Decoded 2-D field for one (run, forecast hour, parameter).
#[derive(Debug, Clone, PartialEq)]
pub struct GridSlice {
    pub run_id: i64,
    pub forecast_hour: u32,
    pub parameter: String,
    pub rows: usize,
    pub cols: usize,
    pub lats: Vec<f32>,
    pub lons: Vec<f32>,
    pub data: Vec<f32>,
}

impl GridSlice {
    /// Bilinear interpolation at a position. Samples outside the grid are 0 and
    /// NaN cells contribute 0.
    pub fn sample(&self, lat: f64, lon: f64) -> f64 {
        let Some((r0, r1, fr)) = bracket(&self.lats, lat) else {
            return 0.0;
        };
        let Some((c0, c1, fc)) = bracket(&self.lons, lon) else {
            return 0.0;
        };

        let value = |r: usize, c: usize| -> f64 {
            let v = self.data[r * self.cols + c];
            if v.is_nan() {
                0.0
            } else {
                v as f64
            }
        };

        let top = value(r0, c0) * (1.0 - fc) + value(r0, c1) * fc;
        let bottom = value(r1, c0) * (1.0 - fc) + value(r1, c1) * fc;
        top * (1.0 - fr) + bottom * fr
    }
}

/// Locate `x` between two neighbouring axis entries, returning their indices and
/// the fractional weight of the second. Axes may be ascending or descending.
fn bracket(axis: &[f32], x: f64) -> Option<(usize, usize, f64)> {
    let n = axis.len();
    if n == 0 {
        return None;
    }
    let first = axis[0] as f64;
    let last = axis[n - 1] as f64;
    let (lo, hi) = if first <= last { (first, last) } else { (last, first) };
    if !(lo..=hi).contains(&x) {
        return None;
    }
    if n == 1 {
        return Some((0, 0, 0.0));
    }
    for i in 0..n - 1 {
        let a = axis[i] as f64;
        let b = axis[i + 1] as f64;
        let (min, max) = if a <= b { (a, b) } else { (b, a) };
        if (min..=max).contains(&x) {
            let span = b - a;
            let frac = if span == 0.0 { 0.0 } else { (x - a) / span };
            return Some((i, i + 1, frac.clamp(0.0, 1.0)));
        }
    }
    None
}

/// Point weather sample consumed by the cost model. Missing data is calm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetOcean {
    /// Eastward wind component, m/s.
    pub wind_u: f64,
    /// Northward wind component, m/s.
    pub wind_v: f64,
    /// Significant wave height, m.
    pub wave_hs: f64,
    /// Peak wave period, s.
    pub wave_tp: f64,
    /// Direction waves come from, degrees.
    pub wave_dir: f64,
    pub current_u: f64,
    pub current_v: f64,
}

impl MetOcean {
    pub fn calm() -> Self {
        Self::default()
    }

    /// Build a sample from speed and "coming from" direction, the usual
    /// meteorological convention.
    pub fn from_wind(speed_ms: f64, from_deg: f64) -> Self {
        let rad = from_deg.to_radians();
        Self {
            wind_u: -speed_ms * rad.sin(),
            wind_v: -speed_ms * rad.cos(),
            ..Self::default()
        }
    }

    pub fn with_waves(mut self, hs_m: f64, from_deg: f64) -> Self {
        self.wave_hs = hs_m;
        self.wave_dir = normalize_degrees(from_deg);
        self
    }

    /// Add a current setting towards `toward_deg`.
    pub fn with_current(mut self, speed_ms: f64, toward_deg: f64) -> Self {
        let rad = toward_deg.to_radians();
        self.current_u = speed_ms * rad.sin();
        self.current_v = speed_ms * rad.cos();
        self
    }

    pub fn wind_speed_ms(&self) -> f64 {
        self.wind_u.hypot(self.wind_v)
    }

    /// Direction the wind blows from, degrees.
    pub fn wind_from_deg(&self) -> f64 {
        normalize_degrees((-self.wind_u).atan2(-self.wind_v).to_degrees())
    }

    pub fn current_speed_kts(&self) -> f64 {
        self.current_u.hypot(self.current_v) * MS_TO_KTS
    }

    /// Direction the current sets towards, degrees.
    pub fn current_toward_deg(&self) -> f64 {
        normalize_degrees(self.current_u.atan2(self.current_v).to_degrees())
    }

    /// Component-wise average, used for edge weather between two nodes.
    pub fn average(&self, other: &Self) -> Self {
        let wave_dir = {
            let (sa, ca) = self.wave_dir.to_radians().sin_cos();
            let (sb, cb) = other.wave_dir.to_radians().sin_cos();
            normalize_degrees((sa + sb).atan2(ca + cb).to_degrees())
        };
        Self {
            wind_u: (self.wind_u + other.wind_u) / 2.0,
            wind_v: (self.wind_v + other.wind_v) / 2.0,
            wave_hs: (self.wave_hs + other.wave_hs) / 2.0,
            wave_tp: (self.wave_tp + other.wave_tp) / 2.0,
            wave_dir,
            current_u: (self.current_u + other.current_u) / 2.0,
            current_v: (self.current_v + other.current_v) / 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slice(data: Vec<f32>) -> GridSlice {
        GridSlice {
            run_id: 1,
            forecast_hour: 0,
            parameter: "wind_u".to_string(),
            rows: 2,
            cols: 2,
            lats: vec![10.0, 11.0],
            lons: vec![20.0, 21.0],
            data,
        }
    }

    #[test]
    fn bilinear_sample_interpolates_between_corners() {
        let grid = slice(vec![0.0, 2.0, 4.0, 6.0]);
        assert!((grid.sample(10.5, 20.5) - 3.0).abs() < 1e-9);
        assert!((grid.sample(10.0, 21.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn samples_outside_grid_or_nan_are_calm() {
        let grid = slice(vec![f32::NAN, 2.0, 4.0, 6.0]);
        assert_eq!(grid.sample(12.0, 20.0), 0.0);
        assert!((grid.sample(10.0, 20.0)).abs() < 1e-9);
    }

    #[test]
    fn descending_latitude_axis_is_supported() {
        let mut grid = slice(vec![4.0, 6.0, 0.0, 2.0]);
        grid.lats = vec![11.0, 10.0];
        assert!((grid.sample(10.0, 20.0) - 0.0).abs() < 1e-9);
        assert!((grid.sample(11.0, 21.0) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn wind_direction_uses_coming_from_convention() {
        let north_wind = MetOcean::from_wind(10.0, 0.0);
        assert!(north_wind.wind_v < 0.0);
        assert!(north_wind.wind_from_deg().abs() < 1e-9 || (north_wind.wind_from_deg() - 360.0).abs() < 1e-9);
        let west_wind = MetOcean::from_wind(5.0, 270.0);
        assert!((west_wind.wind_from_deg() - 270.0).abs() < 1e-9);
        assert!((west_wind.wind_speed_ms() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn current_direction_uses_setting_towards_convention() {
        let east = MetOcean::calm().with_current(1.0, 90.0);
        assert!((east.current_toward_deg() - 90.0).abs() < 1e-9);
        assert!((east.current_speed_kts() - MS_TO_KTS).abs() < 1e-9);
    }

    #[test]
    fn raw_grid_shape_is_checked() {
        let grid = RawGrid {
            lats: vec![0.0, 1.0],
            lons: vec![0.0, 1.0, 2.0],
            data: vec![0.0; 5],
        };
        assert!(matches!(grid.validate_shape(), Err(Error::InvalidShape { .. })));
    }

    #[test]
    fn source_round_trips_through_strings() {
        for source in ForecastSource::ALL {
            assert_eq!(source.as_str().parse::<ForecastSource>().ok(), Some(source));
        }
        assert!("pressure".parse::<ForecastSource>().is_err());
    }
}
