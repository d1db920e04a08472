//! Forecast cache orchestration: prefetch, progress polling and bulk frames.

pub mod frames;
pub mod orchestrator;

pub use frames::{resample, FrameValues, ForecastFrames, DEFAULT_THINNING_STEP_HOURS};
pub use orchestrator::{ForecastCache, ForecastStatus, PrefetchOutcome};
