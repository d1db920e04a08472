//! Forecast runs, compressed grid slices and the sources that produce them.

pub mod codec;
pub mod field;
pub mod source;
pub mod store;
pub mod types;

pub use codec::CompressedSlice;
pub use field::WeatherField;
pub use source::{model_cycle, HttpSource, StormCell, SyntheticSource, WeatherSource};
pub use store::WeatherStore;
pub use types::{ForecastRun, ForecastSource, GridSlice, MetOcean, RawGrid, RunStatus};
