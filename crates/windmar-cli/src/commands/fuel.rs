//! Single-condition fuel calculation and the canned fuel scenarios.

use anyhow::{Context, Result};
use clap::Args;

use windmar_lib::{fuel_scenarios, CostModel, MetOcean};

use super::vessels::VesselArgs;
use crate::output::{print_json, render_scenarios, render_voyage_fuel, OutputFormat};

/// Arguments for the `fuel` command.
#[derive(Debug, Clone, Args)]
pub struct FuelArgs {
    #[command(flatten)]
    pub vessel: VesselArgs,
    /// Speed through water in knots (defaults to the vessel's service speed).
    #[arg(long)]
    pub speed: Option<f64>,
    /// Distance in nautical miles.
    #[arg(long, default_value_t = 348.0)]
    pub distance: f64,
    /// Sail in ballast rather than laden.
    #[arg(long)]
    pub ballast: bool,
    /// Vessel heading in degrees true.
    #[arg(long, default_value_t = 0.0)]
    pub heading: f64,
    /// True wind speed in m/s.
    #[arg(long, default_value_t = 0.0)]
    pub wind_speed: f64,
    /// Direction the wind blows from, degrees true.
    #[arg(long, default_value_t = 0.0)]
    pub wind_dir: f64,
    /// Significant wave height in metres.
    #[arg(long, default_value_t = 0.0)]
    pub wave_height: f64,
    /// Direction the waves come from, degrees true.
    #[arg(long, default_value_t = 0.0)]
    pub wave_dir: f64,
}

impl FuelArgs {
    fn conditions(&self) -> Option<MetOcean> {
        if self.wind_speed == 0.0 && self.wave_height == 0.0 {
            return None;
        }
        Some(MetOcean::from_wind(self.wind_speed, self.wind_dir).with_waves(self.wave_height, self.wave_dir))
    }
}

/// Handle the `fuel` subcommand.
pub fn handle_fuel(args: &FuelArgs, format: OutputFormat) -> Result<()> {
    let vessel = args.vessel.resolve()?;
    let model = CostModel::new(vessel.clone()).context("invalid vessel specification")?;
    let speed = args.speed.unwrap_or_else(|| vessel.service_speed(!args.ballast));
    let conditions = args.conditions();
    let result = model
        .voyage_fuel(speed, !args.ballast, conditions.as_ref(), args.heading, args.distance)
        .context("fuel calculation failed")?;

    match format {
        OutputFormat::Text => {
            render_voyage_fuel(&vessel, &result);
            Ok(())
        }
        OutputFormat::Json => print_json(&result),
    }
}

/// Handle the `scenarios` subcommand.
pub fn handle_scenarios(args: &VesselArgs, format: OutputFormat) -> Result<()> {
    let vessel = args.resolve()?;
    let model = CostModel::new(vessel.clone()).context("invalid vessel specification")?;
    let scenarios = fuel_scenarios(&model).context("fuel scenarios failed")?;
    match format {
        OutputFormat::Text => {
            render_scenarios(&vessel, &scenarios);
            Ok(())
        }
        OutputFormat::Json => print_json(&scenarios),
    }
}
