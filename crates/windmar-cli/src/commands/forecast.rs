//! Forecast cache commands: prefetch, status and bulk frames.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use windmar_lib::forecast::DEFAULT_THINNING_STEP_HOURS;
use windmar_lib::{
    BoundingBox, ForecastCache, ForecastRun, ForecastSource, ForecastStatus, HttpSource, PlannerConfig,
    PrefetchOutcome, SyntheticSource, WeatherSource, WeatherStore,
};

use super::{open_store, parse_bbox, parse_time};
use crate::output::{print_json, render_frames, render_runs, render_status, OutputFormat};

/// Forecast cache subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum ForecastCommand {
    /// Ingest the latest model cycle and wait until every hour is cached.
    Prefetch(PrefetchArgs),
    /// Report cache readiness per source.
    Status(StatusArgs),
    /// Dump the bulk frames of a source's active run.
    Frames(FramesArgs),
}

/// Where forecast grids come from.
#[derive(Debug, Clone, Args)]
pub struct FeedArgs {
    /// Base URL of a live grid feed; synthetic weather when unset.
    #[arg(long)]
    pub http_url: Option<String>,
    /// Region to ingest as `south,north,west,east`.
    #[arg(long, value_parser = parse_bbox, default_value = "20,60,-80,0", allow_hyphen_values = true)]
    pub bbox: BoundingBox,
    /// Native grid spacing in degrees.
    #[arg(long, default_value_t = 1.0)]
    pub resolution: f64,
}

impl FeedArgs {
    fn weather(&self) -> Arc<dyn WeatherSource> {
        match &self.http_url {
            Some(url) => Arc::new(HttpSource::new(url.as_str(), self.bbox, self.resolution)),
            None => Arc::new(SyntheticSource::new(self.bbox, self.resolution)),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct PrefetchArgs {
    #[command(flatten)]
    pub feed: FeedArgs,
    /// Sources to ingest (repeatable); all when omitted.
    #[arg(long = "source")]
    pub sources: Vec<ForecastSource>,
    /// Model cycle to ingest (RFC 3339); the latest published one when omitted.
    #[arg(long, value_parser = parse_time)]
    pub cycle: Option<DateTime<Utc>>,
    /// Last forecast hour to ingest.
    #[arg(long)]
    pub horizon: Option<u32>,
}

#[derive(Debug, Clone, Args)]
pub struct StatusArgs {
    /// Sources to report (repeatable); all when omitted.
    #[arg(long = "source")]
    pub sources: Vec<ForecastSource>,
    /// Also list every recorded run.
    #[arg(long)]
    pub runs: bool,
}

#[derive(Debug, Clone, Args)]
pub struct FramesArgs {
    #[arg(long)]
    pub source: ForecastSource,
    /// Keep only frames whose hour is a multiple of this step.
    #[arg(long, num_args = 0..=1, default_missing_value = "12")]
    pub thin: Option<u32>,
}

#[derive(Debug, Serialize)]
struct SourceReport {
    #[serde(flatten)]
    status: ForecastStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    runs: Option<Vec<ForecastRun>>,
}

fn sources_or_all(sources: &[ForecastSource]) -> Vec<ForecastSource> {
    if sources.is_empty() {
        ForecastSource::ALL.to_vec()
    } else {
        sources.to_vec()
    }
}

/// Cache over an existing store for read-only commands. Its feed is never
/// fetched from.
fn reader_cache(config: &PlannerConfig, store: Arc<WeatherStore>) -> ForecastCache {
    let feed = Arc::new(SyntheticSource::new(BoundingBox::new(-1.0, 1.0, -1.0, 1.0), 1.0));
    ForecastCache::new(store, feed, config.ingest.clone(), config.display_resolution_deg)
}

/// Dispatch a forecast subcommand.
pub fn handle_forecast_command(
    config: PlannerConfig,
    store_path: Option<&Path>,
    command: &ForecastCommand,
    format: OutputFormat,
) -> Result<()> {
    match command {
        ForecastCommand::Prefetch(args) => handle_prefetch(config, store_path, args, format),
        ForecastCommand::Status(args) => handle_status(&config, store_path, args, format),
        ForecastCommand::Frames(args) => handle_frames(&config, store_path, args, format),
    }
}

fn handle_prefetch(
    config: PlannerConfig,
    store_path: Option<&Path>,
    args: &PrefetchArgs,
    format: OutputFormat,
) -> Result<()> {
    let mut ingest = config.ingest.clone();
    if let Some(horizon) = args.horizon {
        ingest.horizon_hours = horizon;
    }
    let store = open_store(&config, store_path)?;
    let cache = ForecastCache::new(store, args.feed.weather(), ingest, config.display_resolution_deg);
    let sources = sources_or_all(&args.sources);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let (statuses, failed) = runtime.block_on(async {
        for source in &sources {
            let outcome = match args.cycle {
                Some(cycle) => cache.trigger_prefetch_for_cycle(*source, cycle),
                None => cache.trigger_prefetch(*source),
            }
            .with_context(|| format!("failed to start {source} prefetch"))?;
            match outcome {
                PrefetchOutcome::PreviouslyFailed(run_id) => {
                    warn!(run_id, source = %source, "cycle failed earlier; not retrying until the next cycle")
                }
                other => info!(run_id = other.run_id(), source = %source, outcome = ?other, "prefetch"),
            }
        }

        let mut statuses = Vec::with_capacity(sources.len());
        let mut failed = Vec::new();
        for source in &sources {
            match cache.wait(*source).await {
                Ok(status) => statuses.push(status),
                Err(err) => {
                    warn!(source = %source, error = %err, "ingestion failed");
                    failed.push(*source);
                    statuses.push(cache.status(*source));
                }
            }
        }
        Ok::<_, anyhow::Error>((statuses, failed))
    })?;

    match format {
        OutputFormat::Text => statuses.iter().for_each(render_status),
        OutputFormat::Json => print_json(&statuses)?,
    }

    if !failed.is_empty() {
        let names: Vec<String> = failed.iter().map(|source| source.to_string()).collect();
        bail!("ingestion failed for {}", names.join(", "));
    }
    Ok(())
}

fn handle_status(
    config: &PlannerConfig,
    store_path: Option<&Path>,
    args: &StatusArgs,
    format: OutputFormat,
) -> Result<()> {
    let store = open_store(config, store_path)?;
    let cache = reader_cache(config, Arc::clone(&store));

    let mut reports = Vec::new();
    for source in sources_or_all(&args.sources) {
        let runs = if args.runs {
            Some(store.runs(source).context("failed to list forecast runs")?)
        } else {
            None
        };
        reports.push(SourceReport {
            status: cache.status(source),
            runs,
        });
    }

    match format {
        OutputFormat::Text => {
            for report in &reports {
                render_status(&report.status);
                if let Some(runs) = &report.runs {
                    render_runs(runs);
                }
            }
            Ok(())
        }
        OutputFormat::Json => print_json(&reports),
    }
}

fn handle_frames(
    config: &PlannerConfig,
    store_path: Option<&Path>,
    args: &FramesArgs,
    format: OutputFormat,
) -> Result<()> {
    let store = open_store(config, store_path)?;
    let cache = reader_cache(config, store);
    let mut frames = cache
        .bulk_frames(args.source)
        .with_context(|| format!("{} frames are not available", args.source))?;
    if let Some(step) = args.thin {
        frames = frames.thinned(step.max(1));
    }

    match format {
        OutputFormat::Text => {
            render_frames(&frames);
            Ok(())
        }
        OutputFormat::Json => print_json(&frames),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_list_means_all() {
        assert_eq!(sources_or_all(&[]), ForecastSource::ALL.to_vec());
        assert_eq!(
            sources_or_all(&[ForecastSource::Waves]),
            vec![ForecastSource::Waves]
        );
    }

    #[test]
    fn default_thinning_step_matches_library() {
        assert_eq!(DEFAULT_THINNING_STEP_HOURS, 12);
    }
}
