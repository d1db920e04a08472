mod common;

use std::sync::Arc;

use chrono::Duration;
use windmar_lib::{
    pareto_front, Engine, Error, Itinerary, LatLon, PlannerConfig, RouteOptimizer, RouteRequest,
    SafetyLimits, SearchConfig, Strategy, VesselSpecs, WeatherField, WeatherStore,
};

use common::{cycle, hours, ingest_all, storm, storm_source};

const START: LatLon = LatLon { lat: 40.0, lon: -30.0 };
const END: LatLon = LatLon { lat: 40.0, lon: -20.0 };

struct StormScenario {
    store: Arc<WeatherStore>,
    optimizer: RouteOptimizer,
}

fn wide_config() -> PlannerConfig {
    PlannerConfig {
        search: SearchConfig {
            // Room to pass the storm on either side.
            grid_margin_deg: 4.0,
            ..SearchConfig::default()
        },
        ..PlannerConfig::default()
    }
}

impl StormScenario {
    fn new() -> Self {
        Self::with_horizon(72)
    }

    fn with_horizon(horizon: u32) -> Self {
        let store = Arc::new(WeatherStore::open_in_memory().expect("store"));
        ingest_all(&store, &storm_source(), cycle(), &hours(horizon));
        let optimizer = RouteOptimizer::new(wide_config(), Some(Arc::clone(&store)));
        Self { store, optimizer }
    }

    fn request(&self) -> RouteRequest {
        RouteRequest::new(START, END, cycle())
    }

    fn field(&self) -> WeatherField {
        let runs: Vec<_> = windmar_lib::ForecastSource::ALL
            .iter()
            .filter_map(|source| self.store.latest_complete(*source))
            .collect();
        let last = runs.iter().filter_map(|run| run.last_hour()).min().unwrap_or(0);
        WeatherField::load(&self.store, &runs, cycle(), cycle() + Duration::hours(last as i64))
            .expect("field")
    }

    fn limits(&self, level: f64) -> SafetyLimits {
        self.optimizer.config().safety.limits(level)
    }
}

fn assert_within_limits(itinerary: &Itinerary, field: &WeatherField, limits: SafetyLimits) {
    // Exact endpoints are exempt; every grid waypoint must be inside the limits.
    let inner = &itinerary.waypoints[1..itinerary.waypoints.len() - 1];
    assert!(!inner.is_empty());
    for waypoint in inner {
        let weather = field.sample(waypoint.position, waypoint.eta);
        assert!(
            limits.allows(weather.wind_speed_ms(), weather.wave_hs),
            "waypoint {:?} sees {:.1} m/s, {:.1} m",
            waypoint.position,
            weather.wind_speed_ms(),
            weather.wave_hs
        );
    }
}

#[test]
fn calm_route_follows_the_parallel() {
    let optimizer = RouteOptimizer::new(PlannerConfig::default(), None);
    let request = RouteRequest::new(START, END, cycle()).without_weather();
    let outcome = optimizer
        .optimize_route(&request, &VesselSpecs::default())
        .expect("route");
    let itinerary = outcome.primary();
    assert_eq!(itinerary.engine, Engine::Astar);
    assert!(!itinerary.weather_used);
    // A grid route between two points on a parallel is within a few percent
    // of the great circle.
    let gc = START.distance_nm(&END);
    assert!(itinerary.total_distance_nm >= gc - 1e-6);
    assert!(itinerary.total_distance_nm < gc * 1.03);
    let per_nm = itinerary.total_fuel_mt / itinerary.total_distance_nm;
    assert!((itinerary.fuel_per_nm() - per_nm).abs() < 1e-12);
}

#[test]
fn strict_safety_level_routes_around_the_storm() {
    let scenario = StormScenario::new();
    let field = scenario.field();

    for engine in [Engine::Astar, Engine::TimeExpanded] {
        let request = scenario
            .request()
            .with_engine(engine)
            .with_strategy(Strategy::Safety);
        let outcome = scenario
            .optimizer
            .optimize_route(&request, &VesselSpecs::default())
            .expect("route around storm");
        let itinerary = outcome.primary();
        assert_eq!(itinerary.engine, engine);
        assert_eq!(itinerary.safety_level, 0.0);
        assert!(itinerary.weather_used);
        assert_eq!(itinerary.forecast_run_ids.len(), 3);
        assert_within_limits(itinerary, &field, scenario.limits(0.0));

        let closest = itinerary
            .waypoints
            .iter()
            .map(|w| w.position.distance_nm(&storm().center))
            .fold(f64::INFINITY, f64::min);
        assert!(closest > 100.0, "{engine} passed {closest:.0} nm from the storm centre");
    }
}

#[test]
fn time_expanded_transitions_respect_every_safety_level() {
    let scenario = StormScenario::new();
    let field = scenario.field();
    let request = scenario
        .request()
        .with_engine(Engine::TimeExpanded)
        .with_strategy(Strategy::Pareto);
    let outcome = scenario
        .optimizer
        .optimize_route(&request, &VesselSpecs::default())
        .expect("pareto routes");
    for itinerary in outcome.itineraries() {
        assert_within_limits(itinerary, &field, scenario.limits(itinerary.safety_level));
    }
}

#[test]
fn time_expanded_routes_slow_passages_through_weather() {
    let scenario = StormScenario::with_horizon(120);
    let field = scenario.field();
    let vessel = VesselSpecs::default();
    let request = scenario.request().with_speed(8.0);

    let spatial = scenario
        .optimizer
        .optimize_route(&request, &vessel)
        .expect("a* route at 8 kn");
    let outcome = scenario
        .optimizer
        .optimize_route(&request.clone().with_engine(Engine::TimeExpanded), &vessel)
        .expect("time-expanded route at 8 kn");
    let itinerary = outcome.primary();

    assert_eq!(itinerary.engine, Engine::TimeExpanded);
    assert!(itinerary.weather_used);
    assert!(itinerary.total_hours < 120.0);
    assert!(itinerary.total_hours >= START.distance_nm(&END) / 8.0 - 1e-6);
    assert_within_limits(itinerary, &field, scenario.limits(1.0));
    // Coarser grid, same weather: within reach of the spatial optimum.
    let spatial_fuel = spatial.primary().total_fuel_mt;
    assert!(
        itinerary.total_fuel_mt < spatial_fuel * 1.25,
        "time-expanded {:.2} t against a* {:.2} t",
        itinerary.total_fuel_mt,
        spatial_fuel
    );
}

#[test]
fn pareto_fuel_does_not_increase_as_safety_relaxes() {
    let scenario = StormScenario::new();
    let request = scenario.request().with_strategy(Strategy::Pareto);
    let outcome = scenario
        .optimizer
        .optimize_route(&request, &VesselSpecs::default())
        .expect("pareto routes");

    let itineraries = outcome.itineraries();
    assert_eq!(itineraries.len(), 3);
    let levels: Vec<f64> = itineraries.iter().map(|i| i.safety_level).collect();
    assert_eq!(levels, vec![0.0, 0.5, 1.0]);
    for pair in itineraries.windows(2) {
        assert!(
            pair[1].total_fuel_mt <= pair[0].total_fuel_mt + 1e-6,
            "fuel rose from {:.3} t at level {} to {:.3} t at level {}",
            pair[0].total_fuel_mt,
            pair[0].safety_level,
            pair[1].total_fuel_mt,
            pair[1].safety_level
        );
    }
    // The strict route detours around the whole storm.
    assert!(itineraries[0].total_distance_nm > START.distance_nm(&END) * 1.03);

    let front = pareto_front(itineraries);
    assert!(!front.is_empty());
    assert!(front
        .windows(2)
        .all(|pair| pair[0].total_fuel_mt <= pair[1].total_fuel_mt));
}

#[test]
fn weather_is_used_only_when_requested() {
    let scenario = StormScenario::new();
    let calm = scenario
        .optimizer
        .optimize_route(&scenario.request().without_weather(), &VesselSpecs::default())
        .expect("calm route");
    assert!(!calm.primary().weather_used);
    assert!(calm.primary().forecast_run_ids.is_empty());

    // The calm route runs straight through the storm.
    let gc = START.distance_nm(&END);
    assert!(calm.primary().total_distance_nm < gc * 1.03);
}

#[test]
fn time_expanded_rejects_short_forecasts() {
    let store = Arc::new(WeatherStore::open_in_memory().expect("store"));
    ingest_all(&store, &storm_source(), cycle(), &hours(12));
    let optimizer = RouteOptimizer::new(wide_config(), Some(store));
    let request = RouteRequest::new(START, END, cycle()).with_engine(Engine::TimeExpanded);
    let err = optimizer
        .optimize_route(&request, &VesselSpecs::default())
        .unwrap_err();
    assert!(matches!(
        err,
        Error::InsufficientForecastCoverage { available_hours: 12, .. }
    ));

    // The spatial engine only needs departure-time weather.
    optimizer
        .optimize_route(&request.clone().with_engine(Engine::Astar), &VesselSpecs::default())
        .expect("a* route");
}

#[test]
fn ballast_passage_burns_less_than_laden() {
    let optimizer = RouteOptimizer::new(PlannerConfig::default(), None);
    let laden = RouteRequest::new(START, END, cycle()).with_speed(14.0);
    let ballast = laden.clone().ballast();
    let vessel = VesselSpecs::default();
    let laden_fuel = optimizer.optimize_route(&laden, &vessel).unwrap().primary().total_fuel_mt;
    let ballast_fuel = optimizer.optimize_route(&ballast, &vessel).unwrap().primary().total_fuel_mt;
    assert!(ballast_fuel < laden_fuel);
}
