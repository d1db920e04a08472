//! Geographic primitives shared by the weather grids and both search engines.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in nautical miles.
pub const EARTH_RADIUS_NM: f64 = 3440.065;

/// Metres per second to knots.
pub const MS_TO_KTS: f64 = 1.943_844;

/// Knots to metres per second.
pub const KTS_TO_MS: f64 = 0.514_444;

/// Geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle (haversine) distance to another position in nautical miles.
    pub fn distance_nm(&self, other: &Self) -> f64 {
        let phi1 = self.lat.to_radians();
        let phi2 = other.lat.to_radians();
        let dphi = phi2 - phi1;
        let dlambda = (other.lon - self.lon).to_radians();

        let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_NM * a.sqrt().min(1.0).asin()
    }

    /// Initial great-circle bearing towards `other`, degrees clockwise from north in [0, 360).
    pub fn bearing_to(&self, other: &Self) -> f64 {
        let phi1 = self.lat.to_radians();
        let phi2 = other.lat.to_radians();
        let dlambda = (other.lon - self.lon).to_radians();

        let y = dlambda.sin() * phi2.cos();
        let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlambda.cos();
        normalize_degrees(y.atan2(x).to_degrees())
    }

    /// Great-circle midpoint between two positions.
    pub fn midpoint(&self, other: &Self) -> Self {
        let phi1 = self.lat.to_radians();
        let phi2 = other.lat.to_radians();
        let lambda1 = self.lon.to_radians();
        let dlambda = (other.lon - self.lon).to_radians();

        let bx = phi2.cos() * dlambda.cos();
        let by = phi2.cos() * dlambda.sin();
        let phi = (phi1.sin() + phi2.sin()).atan2(((phi1.cos() + bx).powi(2) + by * by).sqrt());
        let lambda = lambda1 + by.atan2(phi1.cos() + bx);
        Self {
            lat: phi.to_degrees(),
            lon: lambda.to_degrees(),
        }
    }
}

/// Axis-aligned geographic bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl BoundingBox {
    pub fn new(lat_min: f64, lat_max: f64, lon_min: f64, lon_max: f64) -> Self {
        Self {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
        }
    }

    /// Smallest box containing both points, grown by `margin_deg` on every side
    /// and clamped to valid latitudes.
    pub fn around(a: LatLon, b: LatLon, margin_deg: f64) -> Self {
        Self {
            lat_min: (a.lat.min(b.lat) - margin_deg).max(-90.0),
            lat_max: (a.lat.max(b.lat) + margin_deg).min(90.0),
            lon_min: a.lon.min(b.lon) - margin_deg,
            lon_max: a.lon.max(b.lon) + margin_deg,
        }
    }

    pub fn contains(&self, point: LatLon) -> bool {
        (self.lat_min..=self.lat_max).contains(&point.lat)
            && (self.lon_min..=self.lon_max).contains(&point.lon)
    }
}

/// Normalize an angle to [0, 360).
pub fn normalize_degrees(angle: f64) -> f64 {
    let wrapped = angle % 360.0;
    if wrapped < 0.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}

/// Smallest absolute difference between two bearings, in [0, 180].
pub fn angle_between(a: f64, b: f64) -> f64 {
    let diff = normalize_degrees(a - b);
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

/// Evenly spaced axis from `min` to `max` inclusive, aligned to multiples of `step`.
pub fn aligned_axis(min: f64, max: f64, step: f64) -> Vec<f64> {
    let first = (min / step).floor() as i64;
    let last = (max / step).ceil() as i64;
    (first..=last).map(|i| i as f64 * step).collect()
}
