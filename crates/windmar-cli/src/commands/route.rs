//! Route command handler for weather-optimized voyages.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use tracing::info;

use windmar_lib::{
    pareto_front, Connectivity, Engine, Itinerary, LatLon, PlannerConfig, RouteOptimizer, RouteRequest, Strategy,
};

use super::vessels::VesselArgs;
use super::{open_store, parse_position, parse_time};
use crate::output::{print_json, render_itineraries, OutputFormat, RouteReport};

/// Arguments for the route command.
#[derive(Debug, Clone, Args)]
pub struct RouteCommandArgs {
    /// Departure position as `lat,lon`.
    #[arg(long, value_parser = parse_position, allow_hyphen_values = true)]
    pub from: LatLon,
    /// Arrival position as `lat,lon`.
    #[arg(long, value_parser = parse_position, allow_hyphen_values = true)]
    pub to: LatLon,
    /// Departure time (RFC 3339); defaults to now.
    #[arg(long, value_parser = parse_time)]
    pub departure: Option<DateTime<Utc>>,
    /// Search engine: `astar` or `time-expanded`.
    #[arg(long, default_value_t = Engine::Astar)]
    pub engine: Engine,
    /// Optimization strategy: `fuel`, `safety` or `pareto`.
    #[arg(long, default_value_t = Strategy::Fuel)]
    pub strategy: Strategy,
    /// Grid connectivity: 4, 8 or 16.
    #[arg(long)]
    pub connectivity: Option<Connectivity>,
    /// Weight of weather exposure in the edge cost (0 = fuel only).
    #[arg(long)]
    pub safety_weight: Option<f64>,
    /// Speed through water in knots (defaults to the vessel's service speed).
    #[arg(long)]
    pub speed: Option<f64>,
    /// Sail in ballast rather than laden.
    #[arg(long)]
    pub ballast: bool,
    /// Cost in calm water without consulting the forecast store.
    #[arg(long, conflicts_with = "require_weather")]
    pub no_weather: bool,
    /// Fail instead of falling back to calm water when no forecast is cached.
    #[arg(long)]
    pub require_weather: bool,
    /// Print only totals, not every waypoint.
    #[arg(long)]
    pub summary: bool,
    #[command(flatten)]
    pub vessel: VesselArgs,
}

impl RouteCommandArgs {
    /// Convert CLI args to a library request.
    pub fn to_request(&self, now: DateTime<Utc>) -> RouteRequest {
        let mut request = RouteRequest::new(self.from, self.to, self.departure.unwrap_or(now))
            .with_engine(self.engine)
            .with_strategy(self.strategy);
        if let Some(speed) = self.speed {
            request = request.with_speed(speed);
        }
        if self.ballast {
            request = request.ballast();
        }
        if self.no_weather {
            request = request.without_weather();
        }
        if self.require_weather {
            request = request.requiring_weather();
        }
        request
    }

    /// Apply search overrides on top of the environment configuration.
    pub fn apply(&self, config: &mut PlannerConfig) {
        if let Some(connectivity) = self.connectivity {
            config.search.connectivity = connectivity;
        }
        if let Some(weight) = self.safety_weight {
            config.search.safety_weight = weight;
        }
    }
}

/// Handle the route subcommand.
pub fn handle_route_command(
    mut config: PlannerConfig,
    store_path: Option<&Path>,
    args: &RouteCommandArgs,
    format: OutputFormat,
) -> Result<()> {
    args.apply(&mut config);
    config.validate().context("invalid planner configuration")?;

    let vessel = args.vessel.resolve()?;
    let store = if args.no_weather {
        None
    } else {
        Some(open_store(&config, store_path)?)
    };
    let request = args.to_request(Utc::now());

    info!(
        engine = %request.engine,
        strategy = %request.strategy,
        vessel = %vessel.name,
        "optimizing route"
    );
    let optimizer = RouteOptimizer::new(config, store);
    let outcome = optimizer
        .optimize_route(&request, &vessel)
        .context("route optimization failed")?;

    let itineraries = outcome.itineraries();
    let non_dominated = non_dominated_flags(itineraries);
    match format {
        OutputFormat::Text => {
            render_itineraries(itineraries, &non_dominated, !args.summary);
            Ok(())
        }
        OutputFormat::Json => print_json(&RouteReport {
            itineraries,
            non_dominated,
        }),
    }
}

/// Whether each itinerary survives the Pareto filter.
fn non_dominated_flags(itineraries: &[Itinerary]) -> Vec<bool> {
    let front = pareto_front(itineraries);
    itineraries
        .iter()
        .map(|itinerary| front.iter().any(|kept| kept == itinerary))
        .collect()
}
