//! Handlers for each CLI subcommand.
//!
//! `main.rs` parses arguments and dispatches here; handlers own loading
//! configuration, stores and catalogs and hand results to [`crate::output`].

pub mod calibrate;
pub mod forecast;
pub mod fuel;
pub mod route;
pub mod vessels;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use windmar_lib::{BoundingBox, LatLon, PlannerConfig, WeatherStore};

/// Parse `lat,lon` in decimal degrees.
pub fn parse_position(value: &str) -> std::result::Result<LatLon, String> {
    let [lat, lon] = parse_numbers::<2>(value)?;
    if !(-90.0..=90.0).contains(&lat) {
        return Err(format!("latitude {lat} is outside [-90, 90]"));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(format!("longitude {lon} is outside [-180, 180]"));
    }
    Ok(LatLon::new(lat, lon))
}

/// Parse `south,north,west,east` in decimal degrees.
pub fn parse_bbox(value: &str) -> std::result::Result<BoundingBox, String> {
    let [south, north, west, east] = parse_numbers::<4>(value)?;
    if south >= north || west >= east {
        return Err(format!("empty bounding box {value}"));
    }
    Ok(BoundingBox::new(south, north, west, east))
}

/// Parse an RFC 3339 timestamp.
pub fn parse_time(value: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|err| format!("invalid RFC 3339 time {value}: {err}"))
}

fn parse_numbers<const N: usize>(value: &str) -> std::result::Result<[f64; N], String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != N {
        return Err(format!("expected {N} comma-separated numbers, got {value:?}"));
    }
    let mut out = [0.0; N];
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = part
            .parse::<f64>()
            .ok()
            .filter(|number| number.is_finite())
            .ok_or_else(|| format!("invalid number {part:?}"))?;
    }
    Ok(out)
}

/// Open the forecast store, preferring an explicit `--store` path.
pub fn open_store(config: &PlannerConfig, explicit: Option<&Path>) -> Result<Arc<WeatherStore>> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => config
            .resolve_store_path()
            .context("failed to resolve the forecast store location")?,
    };
    let store = WeatherStore::open(&path)
        .with_context(|| format!("failed to open forecast store at {}", path.display()))?;
    Ok(Arc::new(store))
}
