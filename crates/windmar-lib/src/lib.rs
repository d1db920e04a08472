//! WINDMAR library entry points.
//!
//! This crate exposes the weather grid store, the forecast cache
//! orchestrator, the vessel cost model and the two weather routing engines.
//! Higher-level consumers (the CLI) should only depend on the items exported
//! here instead of reimplementing behavior.

pub mod config;
pub mod error;
pub mod forecast;
pub mod geo;
pub mod routing;
pub mod vessel;
pub mod weather;

pub use config::{IngestConfig, PlannerConfig, RetryPolicy, SafetyEnvelope, SafetyLimits, SearchConfig};
pub use error::{Error, Result};
pub use forecast::{ForecastCache, ForecastFrames, ForecastStatus, FrameValues, PrefetchOutcome};
pub use geo::{BoundingBox, LatLon};
pub use routing::{
    pareto_front, select_engine, Connectivity, Engine, Itinerary, LandMask, Leg, NavigabilityMask, OpenSea,
    RouteOptimizer, RouteOutcome, RouteRequest, RouteSearch, SearchContext, Strategy, Waypoint,
};
pub use vessel::{
    calibrate, fuel_scenarios, read_noon_reports, CalibrationFactors, CalibrationResult, CostModel, EdgeCost,
    FuelScenario, NoonReport, VesselCatalog, VesselSpecs, VoyageFuel,
};
pub use weather::{
    ForecastRun, ForecastSource, GridSlice, HttpSource, MetOcean, RawGrid, RunStatus, StormCell, SyntheticSource,
    WeatherField, WeatherSource, WeatherStore,
};
