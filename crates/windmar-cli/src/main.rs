use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use windmar_cli::commands::calibrate::{handle_calibrate, CalibrateArgs};
use windmar_cli::commands::forecast::{handle_forecast_command, ForecastCommand};
use windmar_cli::commands::fuel::{handle_fuel, handle_scenarios, FuelArgs};
use windmar_cli::commands::route::{handle_route_command, RouteCommandArgs};
use windmar_cli::commands::vessels::{handle_list_vessels, VesselArgs};
use windmar_cli::logging::{init_logging, LogFormat};
use windmar_cli::output::OutputFormat;
use windmar_lib::PlannerConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "WINDMAR weather routing and forecast cache")]
struct Cli {
    /// Override the forecast store path (defaults to $WINDMAR_STORE_PATH or the platform data dir).
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Output format for command results.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Optimize a voyage between two positions.
    Route(RouteCommandArgs),
    /// Fuel for a passage in a single weather condition.
    Fuel(FuelArgs),
    /// Compare fuel across the reference weather scenarios.
    Scenarios(VesselArgs),
    /// Fit the vessel cost model to noon reports.
    Calibrate(CalibrateArgs),
    /// List vessels in the catalog.
    Vessels {
        /// Vessel catalog CSV.
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// Manage the forecast cache.
    Forecast {
        #[command(subcommand)]
        command: ForecastCommand,
    },
}

fn main() -> Result<()> {
    init_logging(LogFormat::from_env());
    let cli = Cli::parse();
    let config = PlannerConfig::from_env().context("invalid WINDMAR_* environment configuration")?;
    let store = cli.store.as_deref();

    match &cli.command {
        Command::Route(args) => handle_route_command(config, store, args, cli.format),
        Command::Fuel(args) => handle_fuel(args, cli.format),
        Command::Scenarios(args) => handle_scenarios(args, cli.format),
        Command::Calibrate(args) => handle_calibrate(args, cli.format),
        Command::Vessels { catalog } => handle_list_vessels(catalog.as_deref(), cli.format),
        Command::Forecast { command } => handle_forecast_command(config, store, command, cli.format),
    }
}
