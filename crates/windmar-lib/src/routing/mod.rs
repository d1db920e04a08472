//! Weather routing over lat/lon grids.
//!
//! This module provides:
//! - [`Engine`] - The two search engines (spatial A* and time-expanded Dijkstra)
//! - [`Strategy`] - Fuel, safety and Pareto strategies
//! - [`SearchContext`] - Everything a single engine run reads
//! - [`Itinerary`] - Planned route with waypoints, legs and totals
//! - [`RouteOptimizer`] - Main entry point resolving weather and running engines
//!
//! # Strategy Pattern
//!
//! Each engine implements the [`RouteSearch`] trait. The two engines share the
//! vessel cost model but not their state spaces: A* searches cells under
//! departure-time weather, while the time-expanded engine searches
//! `(cell, time step)` states so weather evolves along the voyage.
//!
//! # Example
//!
//! ```ignore
//! use windmar_lib::{RouteOptimizer, RouteRequest, PlannerConfig, VesselSpecs, LatLon};
//!
//! let optimizer = RouteOptimizer::new(PlannerConfig::default(), None);
//! let request = RouteRequest::new(LatLon::new(45.0, -10.0), LatLon::new(50.0, -3.0), departure);
//! let outcome = optimizer.optimize_route(&request, &VesselSpecs::default())?;
//! println!("{:.1} t", outcome.primary().total_fuel_mt);
//! ```

mod astar;
mod grid;
mod mask;
mod pareto;
mod strategy;
mod time_expanded;

pub use astar::SpatialAStar;
pub use grid::{Connectivity, SearchGrid};
pub use mask::{LandMask, NavigabilityMask, OpenSea};
pub use pareto::pareto_front;
pub use strategy::{select_engine, RouteOptimizer, RouteOutcome, RouteRequest};
pub use time_expanded::TimeExpanded;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::{SafetyLimits, SearchConfig};
use crate::error::{Error, Result};
use crate::geo::LatLon;
use crate::vessel::CostModel;
use crate::weather::{MetOcean, WeatherField};

/// Connectors shorter than this are dropped from itineraries.
const MIN_LEG_NM: f64 = 1e-6;

/// Costs closer than this are treated as equal when breaking ties.
pub(crate) const COST_EPSILON: f64 = 1e-9;

/// Expansions between cancellation checks.
pub(crate) const CANCEL_CHECK_INTERVAL: usize = 256;

/// Supported search engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Engine {
    /// Spatial A* under departure-time weather.
    #[default]
    #[serde(rename = "astar")]
    Astar,
    /// Dijkstra over (cell, time step) states.
    #[serde(rename = "time-expanded")]
    TimeExpanded,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Engine::Astar => "astar",
            Engine::TimeExpanded => "time-expanded",
        };
        f.write_str(value)
    }
}

impl FromStr for Engine {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "astar" | "a-star" | "a*" => Ok(Engine::Astar),
            "time-expanded" | "time_expanded" | "visir" => Ok(Engine::TimeExpanded),
            other => Err(Error::InvalidConfig {
                key: "engine".to_string(),
                message: format!("unknown engine '{other}'"),
            }),
        }
    }
}

/// Route optimization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Minimize fuel under the full safety envelope.
    #[default]
    Fuel,
    /// Minimize fuel under the strictest envelope.
    Safety,
    /// One run per safety level, returned unranked.
    Pareto,
}

impl Strategy {
    /// Safety levels searched for this strategy, strictest first.
    pub fn safety_levels(&self) -> &'static [f64] {
        match self {
            Strategy::Fuel => &[1.0],
            Strategy::Safety => &[0.0],
            Strategy::Pareto => &[0.0, 0.5, 1.0],
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Strategy::Fuel => "fuel",
            Strategy::Safety => "safety",
            Strategy::Pareto => "pareto",
        };
        f.write_str(value)
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fuel" => Ok(Strategy::Fuel),
            "safety" => Ok(Strategy::Safety),
            "pareto" => Ok(Strategy::Pareto),
            other => Err(Error::InvalidConfig {
                key: "strategy".to_string(),
                message: format!("unknown strategy '{other}'"),
            }),
        }
    }
}

/// Route point with its estimated time of arrival.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    #[serde(flatten)]
    pub position: LatLon,
    pub eta: DateTime<Utc>,
}

/// One costed segment between consecutive waypoints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub from: LatLon,
    pub to: LatLon,
    pub distance_nm: f64,
    pub hours: f64,
    pub fuel_mt: f64,
    pub heading_deg: f64,
    pub speed_over_ground_kts: f64,
    /// Wind speed the leg was costed with, m/s.
    pub wind_ms: f64,
    /// Significant wave height the leg was costed with, m.
    pub wave_hs_m: f64,
}

/// A planned route. Immutable once returned by an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Itinerary {
    pub engine: Engine,
    pub strategy: Strategy,
    /// Fraction of the safety envelope in force, 0 strictest.
    pub safety_level: f64,
    pub waypoints: Vec<Waypoint>,
    pub legs: Vec<Leg>,
    pub total_distance_nm: f64,
    pub total_hours: f64,
    pub total_fuel_mt: f64,
    pub departure: DateTime<Utc>,
    pub arrival: DateTime<Utc>,
    /// False when costed in calm water.
    pub weather_used: bool,
    pub forecast_run_ids: Vec<i64>,
}

impl Itinerary {
    pub fn fuel_per_nm(&self) -> f64 {
        if self.total_distance_nm > 0.0 {
            self.total_fuel_mt / self.total_distance_nm
        } else {
            0.0
        }
    }

    /// Build an itinerary from consecutive legs starting at `start`.
    pub(crate) fn from_legs(engine: Engine, ctx: &SearchContext<'_>, start: LatLon, legs: Vec<Leg>) -> Self {
        let mut waypoints = Vec::with_capacity(legs.len() + 1);
        waypoints.push(Waypoint {
            position: start,
            eta: ctx.departure,
        });
        let mut elapsed = 0.0;
        for leg in &legs {
            elapsed += leg.hours;
            waypoints.push(Waypoint {
                position: leg.to,
                eta: ctx.departure + hours(elapsed),
            });
        }

        Self {
            engine,
            strategy: ctx.strategy,
            safety_level: ctx.safety_level,
            total_distance_nm: legs.iter().map(|l| l.distance_nm).sum(),
            total_fuel_mt: legs.iter().map(|l| l.fuel_mt).sum(),
            total_hours: elapsed,
            departure: ctx.departure,
            arrival: ctx.departure + hours(elapsed),
            weather_used: !ctx.field.is_calm(),
            forecast_run_ids: ctx.field.run_ids(),
            waypoints,
            legs,
        }
    }
}

/// Inputs shared by every engine run of one request.
#[derive(Clone, Copy)]
pub struct SearchContext<'a> {
    pub cost: &'a CostModel,
    pub field: &'a WeatherField,
    pub mask: &'a dyn NavigabilityMask,
    pub config: &'a SearchConfig,
    pub limits: SafetyLimits,
    pub safety_level: f64,
    pub strategy: Strategy,
    pub departure: DateTime<Utc>,
    /// Speed through the water, knots.
    pub speed_kts: f64,
    pub is_laden: bool,
    pub cancel: &'a CancellationToken,
}

impl SearchContext<'_> {
    /// Cost a straight leg under fixed weather. `None` when the vessel cannot
    /// make way against the current.
    pub(crate) fn cost_leg(&self, from: LatLon, to: LatLon, weather: &MetOcean) -> Result<Option<Leg>> {
        let distance_nm = from.distance_nm(&to);
        let heading_deg = from.bearing_to(&to);
        let edge = self
            .cost
            .edge_cost(self.speed_kts, heading_deg, self.is_laden, weather)?;
        Ok(edge.leg(distance_nm).map(|leg| Leg {
            from,
            to,
            distance_nm: leg.distance_nm,
            hours: leg.hours,
            fuel_mt: leg.fuel_mt,
            heading_deg,
            speed_over_ground_kts: edge.speed_over_ground_kts,
            wind_ms: weather.wind_speed_ms(),
            wave_hs_m: weather.wave_hs,
        }))
    }

    /// Cost a connector between an exact endpoint and its snapped node.
    /// Zero-length connectors yield no leg.
    pub(crate) fn connector(
        &self,
        from: LatLon,
        to: LatLon,
        weather: &MetOcean,
        route: (LatLon, LatLon),
    ) -> Result<Option<Leg>> {
        if from.distance_nm(&to) < MIN_LEG_NM {
            return Ok(None);
        }
        match self.cost_leg(from, to, weather)? {
            Some(leg) => Ok(Some(leg)),
            None => Err(Error::no_path(route.0, route.1)),
        }
    }

    pub(crate) fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Common interface of the search engines.
pub trait RouteSearch: Send + Sync {
    /// The engine identifier.
    fn engine(&self) -> Engine;

    /// Find the cheapest route from `start` to `end` under `ctx`.
    ///
    /// Fails with [`Error::NoPath`] when no navigable route satisfies the
    /// safety limits.
    fn search(&self, start: LatLon, end: LatLon, ctx: &SearchContext<'_>) -> Result<Itinerary>;
}

pub(crate) fn hours(value: f64) -> Duration {
    Duration::milliseconds((value * 3_600_000.0).round() as i64)
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct FloatOrd(pub f64);

impl PartialEq for FloatOrd {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for FloatOrd {}

impl PartialOrd for FloatOrd {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatOrd {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engines_parse_and_display() {
        assert_eq!("astar".parse::<Engine>().unwrap(), Engine::Astar);
        assert_eq!("Time-Expanded".parse::<Engine>().unwrap(), Engine::TimeExpanded);
        assert_eq!(Engine::TimeExpanded.to_string(), "time-expanded");
        assert!("bfs".parse::<Engine>().is_err());
    }

    #[test]
    fn strategies_map_to_safety_levels() {
        assert_eq!(Strategy::Fuel.safety_levels(), &[1.0]);
        assert_eq!(Strategy::Safety.safety_levels(), &[0.0]);
        assert_eq!(Strategy::Pareto.safety_levels(), &[0.0, 0.5, 1.0]);
        assert_eq!("PARETO".parse::<Strategy>().unwrap(), Strategy::Pareto);
    }

    #[test]
    fn float_ord_is_total() {
        assert!(FloatOrd(1.0) < FloatOrd(2.0));
        assert_eq!(FloatOrd(3.5), FloatOrd(3.5));
    }
}
