//! Background ingestion of forecast runs and the prefetch/poll/bulk-read
//! protocol built on top of it.
//!
//! ```text
//!  trigger_prefetch ──► begin_run ──► [ hour 0: fetch params ∥ ] ──► record_hour
//!                                     [ hour 3: fetch params ∥ ] ──► record_hour
//!                                                 ...
//!                                     complete_run  (or fail_run)
//! ```
//!
//! Hours are ingested in ascending order; the parameters of one hour are
//! fetched concurrently on the blocking pool. Progress is kept in atomics so
//! [`ForecastCache::status`] never touches the store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{IngestConfig, RetryPolicy};
use crate::error::{Error, Result};
use crate::weather::{model_cycle, ForecastSource, RunStatus, WeatherSource, WeatherStore};

use super::frames::{build_frames, ForecastFrames};

/// Result of a prefetch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "run_id", rename_all = "snake_case")]
pub enum PrefetchOutcome {
    /// A new run was created and ingestion started.
    Started(i64),
    AlreadyIngesting(i64),
    AlreadyComplete(i64),
    /// The cycle failed earlier and is not retried; the next cycle will be.
    PreviouslyFailed(i64),
}

impl PrefetchOutcome {
    pub fn run_id(&self) -> i64 {
        match self {
            PrefetchOutcome::Started(id)
            | PrefetchOutcome::AlreadyIngesting(id)
            | PrefetchOutcome::AlreadyComplete(id)
            | PrefetchOutcome::PreviouslyFailed(id) => *id,
        }
    }
}

/// Pollable progress of a source's forecast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastStatus {
    pub source: ForecastSource,
    pub run_id: Option<i64>,
    pub cached_hours: usize,
    pub total_hours: usize,
    pub run_date: Option<String>,
    pub run_hour: Option<String>,
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum IngestState {
    Ingesting,
    Complete,
    Failed(String),
}

/// Book-keeping for one in-flight (or just finished) ingestion.
#[derive(Debug)]
struct Ingestion {
    run_id: i64,
    run_time: DateTime<Utc>,
    total_hours: usize,
    cached_hours: AtomicUsize,
    state: watch::Sender<IngestState>,
    cancel: CancellationToken,
}

impl Ingestion {
    fn is_ingesting(&self) -> bool {
        *self.state.borrow() == IngestState::Ingesting
    }
}

/// Everything the ingestion task needs, shared with its per-parameter jobs.
struct IngestContext {
    store: Arc<WeatherStore>,
    weather: Arc<dyn WeatherSource>,
    source: ForecastSource,
    retry: RetryPolicy,
    hours: Vec<u32>,
    ingestion: Arc<Ingestion>,
}

/// Bridge between a slow weather feed and fast internal consumption.
pub struct ForecastCache {
    store: Arc<WeatherStore>,
    weather: Arc<dyn WeatherSource>,
    config: IngestConfig,
    display_resolution_deg: f64,
    active: Mutex<HashMap<ForecastSource, Arc<Ingestion>>>,
}

impl std::fmt::Debug for ForecastCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastCache")
            .field("weather", &self.weather.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ForecastCache {
    pub fn new(
        store: Arc<WeatherStore>,
        weather: Arc<dyn WeatherSource>,
        config: IngestConfig,
        display_resolution_deg: f64,
    ) -> Self {
        Self {
            store,
            weather,
            config,
            display_resolution_deg,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<WeatherStore> {
        &self.store
    }

    fn active(&self) -> MutexGuard<'_, HashMap<ForecastSource, Arc<Ingestion>>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start ingesting the latest published cycle of `source` unless it is
    /// already ingesting, complete or known to have failed.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn trigger_prefetch(&self, source: ForecastSource) -> Result<PrefetchOutcome> {
        let cycle = model_cycle(
            Utc::now(),
            self.config.cycle_interval_hours,
            self.config.availability_delay_hours,
        );
        self.trigger_prefetch_for_cycle(source, cycle)
    }

    /// As [`trigger_prefetch`](Self::trigger_prefetch) for an explicit model cycle.
    pub fn trigger_prefetch_for_cycle(
        &self,
        source: ForecastSource,
        run_time: DateTime<Utc>,
    ) -> Result<PrefetchOutcome> {
        let mut active = self.active();

        if let Some(ingestion) = active.get(&source) {
            if ingestion.is_ingesting() && ingestion.run_time == run_time {
                return Ok(PrefetchOutcome::AlreadyIngesting(ingestion.run_id));
            }
        }

        if let Some(run) = self.store.find_run(source, run_time)? {
            return Ok(match run.status {
                RunStatus::Complete | RunStatus::Superseded => PrefetchOutcome::AlreadyComplete(run.id),
                RunStatus::Failed => PrefetchOutcome::PreviouslyFailed(run.id),
                RunStatus::Ingesting => PrefetchOutcome::AlreadyIngesting(run.id),
            });
        }

        let run_id = self.store.begin_run(
            source,
            run_time,
            self.weather.resolution_deg(),
            self.weather.bbox(),
        )?;
        self.store
            .annotate_run(run_id, "provider", &serde_json::json!(self.weather.name()))?;

        let hours = self.config.forecast_hours();
        let (state, _) = watch::channel(IngestState::Ingesting);
        let ingestion = Arc::new(Ingestion {
            run_id,
            run_time,
            total_hours: hours.len(),
            cached_hours: AtomicUsize::new(0),
            state,
            cancel: CancellationToken::new(),
        });

        // A newer cycle replaces an older in-flight one.
        if let Some(previous) = active.insert(source, Arc::clone(&ingestion)) {
            if previous.is_ingesting() {
                info!(run_id = previous.run_id, "cancelling ingestion of older cycle");
                previous.cancel.cancel();
            }
        }
        drop(active);

        let ctx = Arc::new(IngestContext {
            store: Arc::clone(&self.store),
            weather: Arc::clone(&self.weather),
            source,
            retry: self.config.retry,
            hours,
            ingestion,
        });
        info!(run_id, source = %source, run_time = %run_time, "starting forecast ingestion");
        tokio::spawn(run_ingestion(ctx));

        Ok(PrefetchOutcome::Started(run_id))
    }

    /// Cheap progress snapshot: the in-flight run if one is ingesting,
    /// otherwise the latest complete run.
    pub fn status(&self, source: ForecastSource) -> ForecastStatus {
        if let Some(ingestion) = self.active().get(&source).cloned() {
            if ingestion.is_ingesting() {
                return ForecastStatus {
                    source,
                    run_id: Some(ingestion.run_id),
                    cached_hours: ingestion.cached_hours.load(Ordering::Acquire),
                    total_hours: ingestion.total_hours,
                    run_date: Some(ingestion.run_time.format("%Y%m%d").to_string()),
                    run_hour: Some(ingestion.run_time.format("%H").to_string()),
                    complete: false,
                };
            }
        }

        match self.store.latest_complete(source) {
            Some(run) => ForecastStatus {
                source,
                run_id: Some(run.id),
                cached_hours: run.forecast_hours.len(),
                total_hours: run.forecast_hours.len(),
                run_date: Some(run.run_date()),
                run_hour: Some(run.run_hour()),
                complete: true,
            },
            None => ForecastStatus {
                source,
                run_id: None,
                cached_hours: 0,
                total_hours: self.config.forecast_hours().len(),
                run_date: None,
                run_hour: None,
                complete: false,
            },
        }
    }

    /// Every hour of the active run resampled onto the display grid.
    ///
    /// Fails with `NotReady` until [`status`](Self::status) reports complete.
    pub fn bulk_frames(&self, source: ForecastSource) -> Result<ForecastFrames> {
        let status = self.status(source);
        let run = match self.store.latest_complete(source) {
            Some(run) if status.complete => run,
            _ => {
                return Err(Error::NotReady {
                    feed: source.to_string(),
                    cached_hours: status.cached_hours,
                    total_hours: status.total_hours,
                })
            }
        };
        build_frames(&self.store, &run, self.display_resolution_deg)
    }

    /// Request cancellation of an in-flight ingestion. Returns whether one
    /// was running.
    pub fn cancel(&self, source: ForecastSource) -> bool {
        match self.active().get(&source) {
            Some(ingestion) if ingestion.is_ingesting() => {
                ingestion.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Wait for the current ingestion of `source`, if any, to finish.
    ///
    /// Returns `IngestionFailed` if it ended in failure or was cancelled.
    pub async fn wait(&self, source: ForecastSource) -> Result<ForecastStatus> {
        let ingestion = self.active().get(&source).cloned();
        if let Some(ingestion) = ingestion {
            let mut rx = ingestion.state.subscribe();
            let final_state = rx
                .wait_for(|state| *state != IngestState::Ingesting)
                .await
                .map(|state| state.clone())
                .unwrap_or_else(|_| IngestState::Failed("ingestion task dropped".to_string()));
            if let IngestState::Failed(reason) = final_state {
                return Err(Error::IngestionFailed {
                    run_id: ingestion.run_id,
                    reason,
                });
            }
        }
        Ok(self.status(source))
    }

    /// Cancel every in-flight ingestion.
    pub fn shutdown(&self) {
        for ingestion in self.active().values() {
            ingestion.cancel.cancel();
        }
    }
}

fn join_error(err: tokio::task::JoinError) -> Error {
    Error::Io(std::io::Error::other(err.to_string()))
}

/// Run a store operation on the blocking pool.
async fn with_store<T, F>(store: &Arc<WeatherStore>, op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&WeatherStore) -> Result<T> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || op(&store))
        .await
        .map_err(join_error)?
}

/// Fetch one parameter with bounded retries and persist it.
async fn fetch_parameter(ctx: Arc<IngestContext>, hour: u32, parameter: &'static str) -> Result<()> {
    let run_id = ctx.ingestion.run_id;
    let run_time = ctx.ingestion.run_time;
    let source = ctx.source;
    let mut attempt = 1;
    loop {
        let weather = Arc::clone(&ctx.weather);
        let fetched = tokio::task::spawn_blocking(move || weather.fetch(source, run_time, hour, parameter))
            .await
            .map_err(join_error)?;

        match fetched {
            Ok(grid) => {
                return with_store(&ctx.store, move |store| {
                    store.write_slice(run_id, hour, parameter, &grid)
                })
                .await;
            }
            Err(err) if err.is_retryable() && attempt < ctx.retry.max_attempts => {
                let delay = ctx.retry.backoff(attempt);
                warn!(
                    run_id,
                    hour,
                    parameter,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "forecast fetch failed, retrying"
                );
                tokio::select! {
                    _ = ctx.ingestion.cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Fetch and store every parameter of one hour.
async fn ingest_hour(ctx: &Arc<IngestContext>, hour: u32) -> Result<()> {
    let mut jobs = JoinSet::new();
    for &parameter in ctx.source.parameters() {
        jobs.spawn(fetch_parameter(Arc::clone(ctx), hour, parameter));
    }

    loop {
        tokio::select! {
            biased;
            _ = ctx.ingestion.cancel.cancelled() => {
                jobs.abort_all();
                return Err(Error::Cancelled);
            }
            joined = jobs.join_next() => match joined {
                None => break,
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(err))) => {
                    jobs.abort_all();
                    return Err(err);
                }
                Some(Err(err)) => {
                    jobs.abort_all();
                    return Err(join_error(err));
                }
            }
        }
    }

    let run_id = ctx.ingestion.run_id;
    with_store(&ctx.store, move |store| store.record_hour(run_id, hour)).await
}

async fn run_ingestion(ctx: Arc<IngestContext>) {
    let mut outcome: Result<()> = Ok(());
    for &hour in &ctx.hours {
        if ctx.ingestion.cancel.is_cancelled() {
            outcome = Err(Error::Cancelled);
            break;
        }
        if let Err(err) = ingest_hour(&ctx, hour).await {
            outcome = Err(err);
            break;
        }
        ctx.ingestion.cached_hours.fetch_add(1, Ordering::AcqRel);
    }

    let final_state = finish(&ctx, outcome).await;
    ctx.ingestion.state.send_replace(final_state);
}

/// Complete the run unless ingestion failed or was cancelled meanwhile.
async fn finish(ctx: &Arc<IngestContext>, outcome: Result<()>) -> IngestState {
    let run_id = ctx.ingestion.run_id;
    // A cancel can land while the last hour is being recorded.
    let outcome = outcome.and_then(|()| {
        if ctx.ingestion.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    });
    if let Err(err) = outcome {
        return fail(ctx, err.to_string()).await;
    }

    let hours = ctx.hours.clone();
    match with_store(&ctx.store, move |store| store.complete_run(run_id, &hours)).await {
        Ok(run) => {
            info!(run_id, source = %ctx.source, status = %run.status, "forecast ingestion finished");
            IngestState::Complete
        }
        Err(err) => fail(ctx, err.to_string()).await,
    }
}

async fn fail(ctx: &Arc<IngestContext>, reason: String) -> IngestState {
    let run_id = ctx.ingestion.run_id;
    let stored_reason = reason.clone();
    if let Err(err) = with_store(&ctx.store, move |store| store.fail_run(run_id, &stored_reason)).await {
        error!(run_id, error = %err, "could not mark forecast run failed");
    }
    warn!(
        run_id,
        source = %ctx.source,
        cached_hours = ctx.ingestion.cached_hours.load(Ordering::Acquire),
        reason = %reason,
        "forecast ingestion failed"
    );
    IngestState::Failed(reason)
}
