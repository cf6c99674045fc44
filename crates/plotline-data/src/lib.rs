//! Data layer for plotline: the time-series cache, request coalescing and
//! historical sources.

pub mod coalescer;
pub mod csv;
pub mod dataset;
pub mod source;
pub mod store;
pub mod synthetic;
pub mod validation;

use thiserror::Error;

pub use self::csv::CsvSource;
pub use coalescer::{split_windows, FetchBatch, FetchReport, RequestCoalescer};
pub use dataset::{Dataset, DatasetId};
pub use source::{FetchRequest, FetchResponse, HistoricalSource};
pub use store::{Clock, DatasetUpdate, ManualClock, SystemClock, TimeSeriesStore};
pub use synthetic::RandomWalkSource;

/// Data layer errors.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Invalid dataset id: {0}")]
    InvalidDatasetId(String),
    #[error("Unknown dataset: {0}")]
    UnknownDataset(DatasetId),
}
