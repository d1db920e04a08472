//! Strategy evaluation: weather resolution, engine selection and the
//! per-safety-level searches behind each strategy.

use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::PlannerConfig;
use crate::error::{Error, Result};
use crate::geo::LatLon;
use crate::vessel::{CostModel, VesselSpecs};
use crate::weather::{ForecastRun, ForecastSource, WeatherField, WeatherStore};

use super::astar::SpatialAStar;
use super::mask::{NavigabilityMask, OpenSea};
use super::time_expanded::TimeExpanded;
use super::{hours, Engine, Itinerary, RouteSearch, SearchContext, Strategy};

/// Select the search implementation for an engine.
pub fn select_engine(engine: Engine) -> Box<dyn RouteSearch> {
    match engine {
        Engine::Astar => Box::new(SpatialAStar),
        Engine::TimeExpanded => Box::new(TimeExpanded),
    }
}

/// A route optimization request.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    pub start: LatLon,
    pub end: LatLon,
    pub departure: DateTime<Utc>,
    pub is_laden: bool,
    pub use_weather: bool,
    /// Fail instead of falling back to calm water when no forecast exists.
    pub require_weather: bool,
    pub strategy: Strategy,
    pub engine: Engine,
    /// Speed through the water; the vessel's service speed when unset.
    pub speed_kts: Option<f64>,
}

impl RouteRequest {
    /// Laden, weather-aware fuel strategy on the A* engine.
    pub fn new(start: LatLon, end: LatLon, departure: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            departure,
            is_laden: true,
            use_weather: true,
            require_weather: false,
            strategy: Strategy::Fuel,
            engine: Engine::Astar,
            speed_kts: None,
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_engine(mut self, engine: Engine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_speed(mut self, speed_kts: f64) -> Self {
        self.speed_kts = Some(speed_kts);
        self
    }

    pub fn ballast(mut self) -> Self {
        self.is_laden = false;
        self
    }

    pub fn without_weather(mut self) -> Self {
        self.use_weather = false;
        self
    }

    pub fn requiring_weather(mut self) -> Self {
        self.require_weather = true;
        self
    }
}

/// One itinerary, or one per safety level for the Pareto strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Single(Itinerary),
    /// Ordered strictest safety level first, not ranked.
    Pareto(Vec<Itinerary>),
}

impl RouteOutcome {
    pub fn itineraries(&self) -> &[Itinerary] {
        match self {
            RouteOutcome::Single(itinerary) => std::slice::from_ref(itinerary),
            RouteOutcome::Pareto(itineraries) => itineraries,
        }
    }

    /// The single itinerary, or the most permissive Pareto member.
    pub fn primary(&self) -> &Itinerary {
        match self {
            RouteOutcome::Single(itinerary) => itinerary,
            RouteOutcome::Pareto(itineraries) => &itineraries[itineraries.len() - 1],
        }
    }

    pub fn into_itineraries(self) -> Vec<Itinerary> {
        match self {
            RouteOutcome::Single(itinerary) => vec![itinerary],
            RouteOutcome::Pareto(itineraries) => itineraries,
        }
    }
}

/// Runs route requests against the latest complete forecasts.
pub struct RouteOptimizer {
    config: PlannerConfig,
    store: Option<Arc<WeatherStore>>,
    mask: Arc<dyn NavigabilityMask>,
}

impl RouteOptimizer {
    /// Optimizer over open sea. Without a store every route is costed in
    /// calm water.
    pub fn new(config: PlannerConfig, store: Option<Arc<WeatherStore>>) -> Self {
        Self {
            config,
            store,
            mask: Arc::new(OpenSea),
        }
    }

    pub fn with_mask(mut self, mask: Arc<dyn NavigabilityMask>) -> Self {
        self.mask = mask;
        self
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn optimize_route(&self, request: &RouteRequest, vessel: &VesselSpecs) -> Result<RouteOutcome> {
        self.optimize_route_with_cancel(request, vessel, &CancellationToken::new())
    }

    /// Evaluate the request's strategy on its engine. Pareto searches run in
    /// parallel over a shared read-only weather snapshot.
    pub fn optimize_route_with_cancel(
        &self,
        request: &RouteRequest,
        vessel: &VesselSpecs,
        cancel: &CancellationToken,
    ) -> Result<RouteOutcome> {
        let cost = CostModel::new(vessel.clone())?;
        let speed_kts = request.speed_kts.unwrap_or_else(|| vessel.service_speed(request.is_laden));
        // Reject bad speeds before touching the store.
        cost.min_fuel_rate(speed_kts, request.is_laden)?;

        let field = self.resolve_weather(request, speed_kts)?;
        let engine = select_engine(request.engine);
        let base = SearchContext {
            cost: &cost,
            field: &field,
            mask: self.mask.as_ref(),
            config: &self.config.search,
            limits: self.config.safety.limits(1.0),
            safety_level: 1.0,
            strategy: request.strategy,
            departure: request.departure,
            speed_kts,
            is_laden: request.is_laden,
            cancel,
        };
        let at_level = |level: f64| SearchContext {
            limits: self.config.safety.limits(level),
            safety_level: level,
            ..base
        };

        let levels = request.strategy.safety_levels();
        let outcome = if let [level] = levels {
            RouteOutcome::Single(engine.search(request.start, request.end, &at_level(*level))?)
        } else {
            let engine = engine.as_ref();
            let results: Vec<Result<Itinerary>> = thread::scope(|scope| {
                let handles: Vec<_> = levels
                    .iter()
                    .map(|level| {
                        let ctx = at_level(*level);
                        scope.spawn(move || engine.search(request.start, request.end, &ctx))
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| match handle.join() {
                        Ok(result) => result,
                        Err(panic) => std::panic::resume_unwind(panic),
                    })
                    .collect()
            });
            RouteOutcome::Pareto(results.into_iter().collect::<Result<Vec<_>>>()?)
        };

        for itinerary in outcome.itineraries() {
            info!(
                engine = %itinerary.engine,
                strategy = %itinerary.strategy,
                safety_level = itinerary.safety_level,
                distance_nm = itinerary.total_distance_nm,
                hours = itinerary.total_hours,
                fuel_mt = itinerary.total_fuel_mt,
                weather_used = itinerary.weather_used,
                "route optimized"
            );
        }
        Ok(outcome)
    }

    /// Snapshot the weather the request is costed with.
    fn resolve_weather(&self, request: &RouteRequest, speed_kts: f64) -> Result<WeatherField> {
        if !request.use_weather {
            return Ok(WeatherField::calm());
        }
        let (store, runs) = match &self.store {
            Some(store) => {
                let runs: Vec<Arc<ForecastRun>> = ForecastSource::ALL
                    .iter()
                    .filter_map(|source| store.latest_complete(*source))
                    .collect();
                (Some(store), runs)
            }
            None => (None, Vec::new()),
        };
        let Some(store) = store.filter(|_| !runs.is_empty()) else {
            if request.require_weather {
                return Err(Error::UnsupportedEngine {
                    engine: request.engine.to_string(),
                    reason: "no complete forecast run is available".to_string(),
                });
            }
            warn!(engine = %request.engine, "no complete forecast run; costing in calm water");
            return Ok(WeatherField::calm());
        };

        let until = match request.engine {
            Engine::Astar => request.departure,
            Engine::TimeExpanded => {
                let voyage_hours = request.start.distance_nm(&request.end) / speed_kts;
                check_coverage(&runs, request.departure, voyage_hours)?;
                request.departure + hours(self.config.search.max_voyage_hours)
            }
        };
        WeatherField::load(store, &runs, request.departure, until)
    }
}

impl std::fmt::Debug for RouteOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteOptimizer")
            .field("config", &self.config)
            .field("store", &self.store.as_ref().and_then(|s| s.path().map(|p| p.to_path_buf())))
            .finish_non_exhaustive()
    }
}

/// Every run must reach `departure + voyage_hours`.
fn check_coverage(runs: &[Arc<ForecastRun>], departure: DateTime<Utc>, voyage_hours: f64) -> Result<()> {
    let required_end = departure + hours(voyage_hours);
    for run in runs {
        let available_hours = run.last_hour().unwrap_or(0);
        if run.run_time + Duration::hours(available_hours as i64) < required_end {
            return Err(Error::InsufficientForecastCoverage {
                feed: run.source.to_string(),
                available_hours,
                required_hours: (required_end - run.run_time).num_seconds() as f64 / 3600.0,
            });
        }
    }
    Ok(())
}
