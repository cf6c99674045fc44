//! Core types for the plotline chart engine.
//!
//! This crate provides the fundamental data structures shared by every
//! other crate in the workspace:
//! - `Candle` - OHLCV value record
//! - `Timeframe` - Bar width and timestamp alignment
//! - `SparseSeries` - Timestamp-keyed series with pending markers
//! - `Color`, `TimeRange`, `VisibleRange`, `ScaleType` and id newtypes

pub mod candle;
pub mod color;
pub mod ids;
pub mod range;
pub mod series;
pub mod timeframe;

pub use candle::{Candle, ModelKind, OHLCV};
pub use color::Color;
pub use ids::{ChartId, InstanceId};
pub use range::{ScaleType, TimeRange, VisibleRange};
pub use series::{Slot, SparseSeries};
pub use timeframe::{Timeframe, Timestamp};
