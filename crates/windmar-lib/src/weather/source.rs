//! Raw weather sources feeding ingestion.
//!
//! Sources are synchronous: the orchestrator runs every fetch on the blocking
//! pool, so implementations are free to do blocking IO.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Timelike, Utc};
use reqwest::blocking::Client;
use tracing::debug;

use crate::error::{Error, Result};
use crate::geo::{aligned_axis, BoundingBox, LatLon};

use super::types::{ForecastSource, RawGrid};

/// Supplier of gridded forecast samples for any (run, hour, parameter).
pub trait WeatherSource: Send + Sync + 'static {
    /// Short identifier recorded in run metadata.
    fn name(&self) -> &str;

    /// Native grid spacing in degrees.
    fn resolution_deg(&self) -> f64;

    /// Region covered by every grid this source returns.
    fn bbox(&self) -> BoundingBox;

    /// Fetch one parameter grid for a model cycle and forecast hour.
    fn fetch(
        &self,
        source: ForecastSource,
        run_time: DateTime<Utc>,
        forecast_hour: u32,
        parameter: &str,
    ) -> Result<RawGrid>;
}

/// Latest model cycle that has been published by `now`, given the cycle
/// interval and the delay before a cycle becomes available.
pub fn model_cycle(now: DateTime<Utc>, interval_hours: u32, availability_delay_hours: u32) -> DateTime<Utc> {
    let published = now - Duration::hours(availability_delay_hours as i64);
    let interval_secs = interval_hours.max(1) as i64 * 3600;
    let ts = published.timestamp();
    DateTime::from_timestamp(ts - ts.rem_euclid(interval_secs), 0).unwrap_or(published)
}

/// Stationary storm overlaid on synthetic weather.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StormCell {
    pub center: LatLon,
    pub radius_deg: f64,
    /// Wind speed at the centre, m/s.
    pub peak_wind_ms: f64,
    /// Significant wave height at the centre, m.
    pub peak_hs_m: f64,
}

impl StormCell {
    /// Intensity in [0, 1], falling to zero at the radius.
    fn intensity(&self, lat: f64, lon: f64) -> f64 {
        let d = ((lat - self.center.lat).powi(2) + (lon - self.center.lon).powi(2)).sqrt();
        if d >= self.radius_deg {
            0.0
        } else {
            1.0 - (d / self.radius_deg).powi(2)
        }
    }
}

/// Deterministic generator of plausible mid-latitude weather.
///
/// The background is a westerly flow with a cyclonic system drifting with the
/// hour of day, waves derived from wind and a weak current gyre.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    bbox: BoundingBox,
    resolution_deg: f64,
    background: bool,
    storms: Vec<StormCell>,
}

impl SyntheticSource {
    pub fn new(bbox: BoundingBox, resolution_deg: f64) -> Self {
        Self {
            bbox,
            resolution_deg,
            background: true,
            storms: Vec::new(),
        }
    }

    /// Drop the background flow, leaving only storm cells over calm water.
    pub fn without_background(mut self) -> Self {
        self.background = false;
        self
    }

    pub fn with_storm(mut self, storm: StormCell) -> Self {
        self.storms.push(storm);
        self
    }

    fn wind(&self, lat: f64, lon: f64, valid_time: DateTime<Utc>) -> (f64, f64) {
        let (mut u, mut v) = (0.0, 0.0);
        if self.background {
            u += 5.0 + 3.0 * (lat * 2.0).to_radians().sin();
            v += 2.0 * (lon * 3.0 + lat * 2.0).to_radians().cos();

            let hour_factor = (valid_time.hour() as f64 * std::f64::consts::PI / 12.0).sin();
            let center_lat = 45.0 + 5.0 * hour_factor;
            let center_lon = 10.0 * hour_factor;
            let dist = ((lat - center_lat).powi(2) + (lon - center_lon).powi(2)).sqrt();
            let strength = 8.0 * (-dist / 10.0).exp();
            let angle = (lat - center_lat).atan2(lon - center_lon) + std::f64::consts::FRAC_PI_2;
            u += -strength * angle.sin();
            v += strength * angle.cos();
        }
        for storm in &self.storms {
            let intensity = storm.intensity(lat, lon);
            if intensity > 0.0 {
                // Counter-clockwise circulation around the centre.
                let angle = (lat - storm.center.lat).atan2(lon - storm.center.lon)
                    + std::f64::consts::FRAC_PI_2;
                let speed = storm.peak_wind_ms * intensity;
                u += speed * angle.cos();
                v += speed * angle.sin();
            }
        }
        (u, v)
    }

    fn value(&self, parameter: &str, lat: f64, lon: f64, valid_time: DateTime<Utc>) -> Result<f64> {
        let (u, v) = self.wind(lat, lon, valid_time);
        let wind_speed = u.hypot(v);
        let storm_hs: f64 = self
            .storms
            .iter()
            .map(|storm| storm.peak_hs_m * storm.intensity(lat, lon))
            .sum();
        let hs = (0.15 * wind_speed).max(storm_hs).max(0.3);

        Ok(match parameter {
            "wind_u" => u,
            "wind_v" => v,
            "wave_hs" => hs,
            "wave_tp" => 4.0 * hs.sqrt() + 2.0,
            "wave_dir" => ((-u).atan2(-v).to_degrees() + 360.0) % 360.0,
            "current_u" if self.background => 0.3 * (lat * 4.0).to_radians().sin(),
            "current_v" if self.background => 0.2 * (lon * 4.0).to_radians().cos(),
            "current_u" | "current_v" => 0.0,
            other => {
                return Err(Error::InvalidConfig {
                    key: "parameter".to_string(),
                    message: format!("synthetic source has no parameter '{other}'"),
                })
            }
        })
    }
}

impl WeatherSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn resolution_deg(&self) -> f64 {
        self.resolution_deg
    }

    fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    fn fetch(
        &self,
        source: ForecastSource,
        run_time: DateTime<Utc>,
        forecast_hour: u32,
        parameter: &str,
    ) -> Result<RawGrid> {
        if !source.parameters().iter().any(|p| *p == parameter) {
            return Err(Error::InvalidConfig {
                key: "parameter".to_string(),
                message: format!("{parameter} is not a {source} parameter"),
            });
        }
        let valid_time = run_time + Duration::hours(forecast_hour as i64);
        let lats = aligned_axis(self.bbox.lat_min, self.bbox.lat_max, self.resolution_deg);
        let lons = aligned_axis(self.bbox.lon_min, self.bbox.lon_max, self.resolution_deg);

        let mut data = Vec::with_capacity(lats.len() * lons.len());
        for &lat in &lats {
            for &lon in &lons {
                data.push(self.value(parameter, lat, lon, valid_time)? as f32);
            }
        }

        Ok(RawGrid {
            lats: lats.into_iter().map(|v| v as f32).collect(),
            lons: lons.into_iter().map(|v| v as f32).collect(),
            data,
        })
    }
}

/// Live feed serving one JSON grid per (run, hour, parameter) from
/// `{base_url}/{source}/{YYYYMMDDHH}/{hour:03}/{parameter}.json`.
#[derive(Debug, Clone)]
pub struct HttpSource {
    base_url: String,
    bbox: BoundingBox,
    resolution_deg: f64,
    timeout: StdDuration,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>, bbox: BoundingBox, resolution_deg: f64) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bbox,
            resolution_deg,
            timeout: StdDuration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url_for(
        &self,
        source: ForecastSource,
        run_time: DateTime<Utc>,
        forecast_hour: u32,
        parameter: &str,
    ) -> String {
        format!(
            "{}/{}/{}/{:03}/{}.json",
            self.base_url,
            source,
            run_time.format("%Y%m%d%H"),
            forecast_hour,
            parameter
        )
    }

    // Built per fetch: a blocking client must not be dropped inside the async runtime.
    fn build_client(&self) -> Result<Client> {
        Client::builder()
            .timeout(self.timeout)
            .user_agent(user_agent())
            .build()
            .map_err(Error::Http)
    }
}

fn user_agent() -> String {
    format!("windmar-lib/{version}", version = env!("CARGO_PKG_VERSION"))
}

impl WeatherSource for HttpSource {
    fn name(&self) -> &str {
        "http"
    }

    fn resolution_deg(&self) -> f64 {
        self.resolution_deg
    }

    fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    fn fetch(
        &self,
        source: ForecastSource,
        run_time: DateTime<Utc>,
        forecast_hour: u32,
        parameter: &str,
    ) -> Result<RawGrid> {
        let url = self.url_for(source, run_time, forecast_hour, parameter);
        debug!(%url, "fetching forecast grid");
        let client = self.build_client()?;
        let response = client.get(&url).send()?.error_for_status()?;
        let grid: RawGrid = response.json()?;
        grid.validate_shape()?;
        Ok(grid)
    }
}
