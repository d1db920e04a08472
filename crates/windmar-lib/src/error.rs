use thiserror::Error;

/// Convenient result alias for the WINDMAR library.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// A run for this source and model cycle already exists.
    #[error("forecast run for {feed} at {run_time} already exists")]
    DuplicateRun { feed: String, run_time: String },

    /// The run does not exist or is not in a state that permits the operation.
    #[error("unknown or inactive forecast run {run_id}")]
    UnknownRun { run_id: i64 },

    /// Grid data dimensions disagree with the coordinate axes.
    #[error("invalid grid shape: {message}")]
    InvalidShape { message: String },

    /// A compressed slice could not be decoded to its recorded shape.
    #[error("corrupt grid data: {message}")]
    CorruptData { message: String },

    /// Bulk frames were requested before the active run completed.
    #[error("forecast for {feed} is not ready ({cached_hours}/{total_hours} hours cached)")]
    NotReady {
        feed: String,
        cached_hours: usize,
        total_hours: usize,
    },

    /// No navigable path satisfies the search constraints.
    #[error("no route found from ({start_lat:.3}, {start_lon:.3}) to ({end_lat:.3}, {end_lon:.3})")]
    NoPath {
        start_lat: f64,
        start_lon: f64,
        end_lat: f64,
        end_lon: f64,
    },

    /// Speed outside the vessel's operating domain.
    #[error("invalid speed {speed_kts} kts (must be > 0 and < {max_kts})")]
    InvalidSpeed { speed_kts: f64, max_kts: f64 },

    /// The requested engine cannot run with the available weather data.
    #[error("engine {engine} is unsupported: {reason}")]
    UnsupportedEngine { engine: String, reason: String },

    /// The complete forecast does not span the voyage time horizon.
    #[error(
        "forecast {feed} covers up to +{available_hours}h but the voyage needs +{required_hours:.1}h"
    )]
    InsufficientForecastCoverage {
        feed: String,
        available_hours: u32,
        required_hours: f64,
    },

    /// Ingestion of a run failed after exhausting retries.
    #[error("ingestion of run {run_id} failed: {reason}")]
    IngestionFailed { run_id: i64, reason: String },

    /// No slice stored for the requested key.
    #[error("no slice for run {run_id} hour {forecast_hour} parameter {parameter}")]
    SliceNotFound {
        run_id: i64,
        forecast_hour: u32,
        parameter: String,
    },

    /// Published slices are immutable.
    #[error("slice for run {run_id} hour {forecast_hour} parameter {parameter} already written")]
    DuplicateSlice {
        run_id: i64,
        forecast_hour: u32,
        parameter: String,
    },

    /// The parameter is not one the source publishes.
    #[error("{feed} has no parameter '{parameter}'")]
    UnknownParameter { feed: String, parameter: String },

    /// Noon reports cannot determine the calibration factors.
    #[error("calibration failed: {message}")]
    Calibration { message: String },

    /// Work was halted by a caller-initiated cancellation.
    #[error("operation cancelled")]
    Cancelled,

    /// Raised when vessel data fails validation.
    #[error("invalid vessel data: {message}")]
    VesselDataValidation { message: String },

    /// Raised when duplicate vessel names are encountered during catalog load.
    #[error("duplicate vessel name encountered: {name}")]
    DuplicateVesselName { name: String },

    /// Raised when a configuration value cannot be used.
    #[error("invalid configuration {key}: {message}")]
    InvalidConfig { key: String, message: String },

    /// No suitable project directories could be resolved for this platform.
    #[error("failed to resolve project directories for the forecast store")]
    ProjectDirsUnavailable,

    /// Wrapper for SQLite errors.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// Wrapper for IO errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Wrapper for HTTP client errors.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Wrapper for JSON errors.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether an external fetch that produced this error is worth retrying.
    ///
    /// Store-layer errors are deterministic and never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Io(_))
    }

    pub(crate) fn no_path(start: crate::geo::LatLon, end: crate::geo::LatLon) -> Self {
        Error::NoPath {
            start_lat: start.lat,
            start_lon: start.lon,
            end_lat: end.lat,
            end_lon: end.lon,
        }
    }
}
