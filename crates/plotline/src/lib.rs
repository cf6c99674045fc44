//! Plotline - chart pipeline from historical series to draw instructions.
//!
//! A [`Workspace`] owns the shared [`plotline_data::TimeSeriesStore`], the
//! charts drawn over it and the machinery that keeps both current: a
//! request coalescer for missing history, an indicator runtime and the
//! instruction generator. [`FetchLoop`] drives historical fetches from a
//! tokio task.

pub mod chart;
pub mod fetch;
pub mod queue;
pub mod settings;
pub mod workspace;

use plotline_compute::{IndicatorError, PoolError};
use plotline_core::ChartId;
use plotline_data::DataError;
use thiserror::Error;

pub use chart::{Chart, Dimensions, Size};
pub use fetch::{FetchLoop, SharedWorkspace};
pub use queue::{IndicatorQueue, QueueEntry};
pub use settings::{ChartSettings, IndicatorSettings};
pub use workspace::Workspace;

/// Workspace errors.
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("Unknown chart: {0}")]
    UnknownChart(ChartId),
    #[error(transparent)]
    Indicator(#[from] IndicatorError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("Failed to start indicator workers: {0}")]
    Workers(#[from] PoolError),
    #[error("Invalid settings: {0}")]
    Settings(#[from] serde_json::Error),
}
