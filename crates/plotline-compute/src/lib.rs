//! Indicator computation for plotline.
//!
//! Indicators are drawn bar by bar into a [`ComputedSet`] through the
//! [`Plotter`] primitives. The [`IndicatorRuntime`] runs them inline or on a
//! [`WorkerPool`].

pub mod globals;
pub mod indicator;
pub mod library;
pub mod macd;
pub mod plot;
pub mod pool;
pub mod registry;
pub mod runtime;

use plotline_core::ModelKind;
use thiserror::Error;

pub use globals::Globals;
pub use indicator::{Bar, Indicator, PriceSource};
pub use library::{Candlestick, Ema, PriceLine, Sma, Volume, Vwap};
pub use macd::{Macd, MacdConfig};
pub use plot::{decimal_places, ComputedSet, PlotOp, Plotter, MAX_DECIMAL_PLACES};
pub use pool::{PoolError, TaskHandle, WorkerPool};
pub use registry::IndicatorRegistry;
pub use runtime::{run_job, ComputeJob, ComputeMode, ComputeOutput, IndicatorRuntime};

/// Indicator errors.
#[derive(Error, Debug)]
pub enum IndicatorError {
    #[error("{0}")]
    Failed(String),
    #[error("indicator panicked: {0}")]
    Panicked(String),
    #[error("unknown indicator: {0}")]
    Unknown(String),
    #[error("indicator {indicator} cannot run on {source_model:?} data")]
    Incompatible {
        indicator: String,
        source_model: ModelKind,
    },
    #[error(transparent)]
    Worker(#[from] PoolError),
}
