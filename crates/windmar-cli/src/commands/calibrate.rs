//! The `calibrate` command: fit the cost model to noon reports.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use windmar_lib::{calibrate, read_noon_reports, CostModel};

use super::vessels::VesselArgs;
use crate::output::{print_json, render_calibration, OutputFormat};

/// Arguments for the `calibrate` command.
#[derive(Debug, Clone, Args)]
pub struct CalibrateArgs {
    #[command(flatten)]
    pub vessel: VesselArgs,
    /// Noon report CSV with a header row.
    #[arg(long)]
    pub reports: PathBuf,
}

/// Handle the `calibrate` subcommand.
pub fn handle_calibrate(args: &CalibrateArgs, format: OutputFormat) -> Result<()> {
    let vessel = args.vessel.resolve()?;
    let model = CostModel::new(vessel.clone()).context("invalid vessel specification")?;
    let reports = read_noon_reports(&args.reports)
        .with_context(|| format!("failed to read noon reports from {}", args.reports.display()))?;
    let result = calibrate(&model, &reports).context("calibration failed")?;

    match format {
        OutputFormat::Text => {
            render_calibration(&vessel, &result);
            Ok(())
        }
        OutputFormat::Json => print_json(&result),
    }
}
