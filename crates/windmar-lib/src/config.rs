//! Planner configuration with environment overrides.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::routing::Connectivity;

pub const ENV_STORE_PATH: &str = "WINDMAR_STORE_PATH";
pub const ENV_FORECAST_HORIZON_HOURS: &str = "WINDMAR_FORECAST_HORIZON_HOURS";
pub const ENV_FORECAST_STEP_HOURS: &str = "WINDMAR_FORECAST_STEP_HOURS";
pub const ENV_INGEST_MAX_ATTEMPTS: &str = "WINDMAR_INGEST_MAX_ATTEMPTS";
pub const ENV_GRID_RESOLUTION_DEG: &str = "WINDMAR_GRID_RESOLUTION_DEG";
pub const ENV_TE_RESOLUTION_DEG: &str = "WINDMAR_TE_RESOLUTION_DEG";

const STORE_FILE_NAME: &str = "forecast_cache.db";

/// Search engine tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Spatial A* grid spacing in degrees.
    pub grid_resolution_deg: f64,
    /// Time-expanded grid spacing in degrees.
    pub te_resolution_deg: f64,
    pub time_step_hours: f64,
    /// Longest transition, in time steps, the time-expanded engine allows.
    /// Unset derives it per search so every grid edge fits at the requested speed.
    #[serde(default)]
    pub max_steps_per_edge: Option<u32>,
    /// Degrees added around the start/end bounding box.
    pub grid_margin_deg: f64,
    pub connectivity: Connectivity,
    /// Voyage horizon when no forecast bounds it.
    pub max_voyage_hours: f64,
    /// Weight of weather exposure in the A* edge score. Zero is pure fuel.
    pub safety_weight: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            grid_resolution_deg: 0.5,
            te_resolution_deg: 1.0,
            time_step_hours: 3.0,
            max_steps_per_edge: None,
            grid_margin_deg: 2.0,
            connectivity: Connectivity::Eight,
            max_voyage_hours: 480.0,
            safety_weight: 0.0,
        }
    }
}

/// Hard wind/wave limits in force for one search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyLimits {
    pub max_wind_ms: f64,
    pub max_wave_m: f64,
}

impl SafetyLimits {
    pub fn allows(&self, wind_ms: f64, wave_m: f64) -> bool {
        wind_ms <= self.max_wind_ms && wave_m <= self.max_wave_m
    }

    /// Fraction of the limits used, clamped to [0, 1].
    pub fn exposure(&self, wind_ms: f64, wave_m: f64) -> f64 {
        let wind = if self.max_wind_ms > 0.0 { wind_ms / self.max_wind_ms } else { 1.0 };
        let wave = if self.max_wave_m > 0.0 { wave_m / self.max_wave_m } else { 1.0 };
        wind.max(wave).clamp(0.0, 1.0)
    }
}

/// Admissible wind/wave envelope. Level 0 is the calm end, level 1 the
/// full envelope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyEnvelope {
    pub calm_wind_ms: f64,
    pub max_wind_ms: f64,
    pub calm_wave_m: f64,
    pub max_wave_m: f64,
}

impl Default for SafetyEnvelope {
    fn default() -> Self {
        Self {
            calm_wind_ms: 10.0,
            max_wind_ms: 25.0,
            calm_wave_m: 2.5,
            max_wave_m: 5.0,
        }
    }
}

impl SafetyEnvelope {
    pub fn limits(&self, level: f64) -> SafetyLimits {
        let level = level.clamp(0.0, 1.0);
        SafetyLimits {
            max_wind_ms: self.calm_wind_ms + level * (self.max_wind_ms - self.calm_wind_ms),
            max_wave_m: self.calm_wave_m + level * (self.max_wave_m - self.calm_wave_m),
        }
    }
}

/// Bounded exponential backoff for external fetches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        Duration::from_millis((self.initial_backoff_ms as f64 * factor) as u64)
    }
}

/// Forecast ingestion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    pub horizon_hours: u32,
    pub step_hours: u32,
    pub retry: RetryPolicy,
    pub cycle_interval_hours: u32,
    pub availability_delay_hours: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            horizon_hours: 120,
            step_hours: 3,
            retry: RetryPolicy::default(),
            cycle_interval_hours: 6,
            availability_delay_hours: 4,
        }
    }
}

impl IngestConfig {
    /// Forecast hours of one run, `0..=horizon` in `step` increments.
    pub fn forecast_hours(&self) -> Vec<u32> {
        (0..=self.horizon_hours)
            .step_by(self.step_hours.max(1) as usize)
            .collect()
    }
}

/// Top-level configuration for the planner and forecast cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    pub search: SearchConfig,
    pub safety: SafetyEnvelope,
    pub ingest: IngestConfig,
    /// Spacing of the grid bulk frames are resampled onto.
    pub display_resolution_deg: f64,
    pub store_path: Option<PathBuf>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            safety: SafetyEnvelope::default(),
            ingest: IngestConfig::default(),
            display_resolution_deg: 1.0,
            store_path: None,
        }
    }
}

impl PlannerConfig {
    /// Defaults overridden by `WINDMAR_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overridden by values from `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(path) = lookup(ENV_STORE_PATH).filter(|v| !v.trim().is_empty()) {
            config.store_path = Some(PathBuf::from(path));
        }
        if let Some(value) = parse_var::<u32, _>(&lookup, ENV_FORECAST_HORIZON_HOURS)? {
            config.ingest.horizon_hours = value;
        }
        if let Some(value) = parse_var::<u32, _>(&lookup, ENV_FORECAST_STEP_HOURS)? {
            config.ingest.step_hours = value;
        }
        if let Some(value) = parse_var::<u32, _>(&lookup, ENV_INGEST_MAX_ATTEMPTS)? {
            config.ingest.retry.max_attempts = value;
        }
        if let Some(value) = parse_var::<f64, _>(&lookup, ENV_GRID_RESOLUTION_DEG)? {
            config.search.grid_resolution_deg = value;
        }
        if let Some(value) = parse_var::<f64, _>(&lookup, ENV_TE_RESOLUTION_DEG)? {
            config.search.te_resolution_deg = value;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            (self.search.grid_resolution_deg, ENV_GRID_RESOLUTION_DEG),
            (self.search.te_resolution_deg, ENV_TE_RESOLUTION_DEG),
            (self.search.time_step_hours, "search.time_step_hours"),
            (self.search.max_voyage_hours, "search.max_voyage_hours"),
            (self.display_resolution_deg, "display_resolution_deg"),
        ];
        for (value, key) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(invalid(key, "must be a finite positive number"));
            }
        }
        if self.ingest.step_hours == 0 {
            return Err(invalid(ENV_FORECAST_STEP_HOURS, "must be at least 1"));
        }
        if self.ingest.retry.max_attempts == 0 {
            return Err(invalid(ENV_INGEST_MAX_ATTEMPTS, "must be at least 1"));
        }
        if self.search.max_steps_per_edge == Some(0) {
            return Err(invalid("search.max_steps_per_edge", "must be at least 1"));
        }
        if self.search.safety_weight < 0.0 || !self.search.safety_weight.is_finite() {
            return Err(invalid("search.safety_weight", "must be non-negative"));
        }
        let s = &self.safety;
        if s.calm_wind_ms > s.max_wind_ms || s.calm_wave_m > s.max_wave_m {
            return Err(invalid("safety", "calm limits must not exceed maximum limits"));
        }
        Ok(())
    }

    /// Store location: the configured path, else the platform data directory.
    pub fn resolve_store_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.store_path {
            return Ok(path.clone());
        }
        let dirs = ProjectDirs::from("org", "windmar", "windmar").ok_or(Error::ProjectDirsUnavailable)?;
        Ok(dirs.data_dir().join(STORE_FILE_NAME))
    }
}

fn invalid(key: &str, message: &str) -> Error {
    Error::InvalidConfig {
        key: key.to_string(),
        message: message.to_string(),
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| invalid(key, &format!("'{raw}': {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_cover_forty_one_hours() {
        let config = PlannerConfig::default();
        let hours = config.ingest.forecast_hours();
        assert_eq!(hours.len(), 41);
        assert_eq!(hours.last().copied(), Some(120));
        config.validate().unwrap();
    }

    #[test]
    fn environment_overrides_apply() {
        let config = PlannerConfig::from_lookup(lookup(&[
            (ENV_STORE_PATH, "/tmp/wm.db"),
            (ENV_FORECAST_HORIZON_HOURS, "24"),
            (ENV_FORECAST_STEP_HOURS, "6"),
            (ENV_GRID_RESOLUTION_DEG, "0.25"),
        ]))
        .unwrap();
        assert_eq!(config.store_path, Some(PathBuf::from("/tmp/wm.db")));
        assert_eq!(config.ingest.forecast_hours(), vec![0, 6, 12, 18, 24]);
        assert_eq!(config.search.grid_resolution_deg, 0.25);
        assert_eq!(config.resolve_store_path().unwrap(), PathBuf::from("/tmp/wm.db"));
    }

    #[test]
    fn bad_values_are_rejected() {
        let err = PlannerConfig::from_lookup(lookup(&[(ENV_TE_RESOLUTION_DEG, "wide")])).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { ref key, .. } if key == ENV_TE_RESOLUTION_DEG));
        assert!(PlannerConfig::from_lookup(lookup(&[(ENV_INGEST_MAX_ATTEMPTS, "0")])).is_err());
        assert!(PlannerConfig::from_lookup(lookup(&[(ENV_GRID_RESOLUTION_DEG, "-1")])).is_err());
    }

    #[test]
    fn safety_levels_interpolate_envelope() {
        let envelope = SafetyEnvelope::default();
        assert_eq!(envelope.limits(0.0).max_wind_ms, 10.0);
        assert_eq!(envelope.limits(1.0).max_wave_m, 5.0);
        let mid = envelope.limits(0.5);
        assert!((mid.max_wind_ms - 17.5).abs() < 1e-9);
        assert!((mid.max_wave_m - 3.75).abs() < 1e-9);
    }

    #[test]
    fn backoff_grows_geometrically() {
        let retry = RetryPolicy::default();
        assert_eq!(retry.backoff(1), Duration::from_millis(200));
        assert_eq!(retry.backoff(2), Duration::from_millis(400));
        assert_eq!(retry.backoff(3), Duration::from_millis(800));
    }
}
