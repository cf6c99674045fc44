//! Core indicator traits and types.

use plotline_core::{Candle, ModelKind, Timestamp};

use crate::globals::Globals;
use crate::plot::Plotter;
use crate::IndicatorError;

/// Which price to use for indicator calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriceSource {
    Open,
    High,
    Low,
    #[default]
    Close,
    /// (High + Low) / 2
    HL2,
    /// (High + Low + Close) / 3
    HLC3,
    /// (Open + High + Low + Close) / 4
    OHLC4,
}

impl PriceSource {
    /// Extract the price from a candle based on this source.
    pub fn extract(&self, candle: &Candle) -> f64 {
        match self {
            PriceSource::Open => candle.open,
            PriceSource::High => candle.high,
            PriceSource::Low => candle.low,
            PriceSource::Close => candle.close,
            PriceSource::HL2 => (candle.high + candle.low) / 2.0,
            PriceSource::HLC3 => (candle.high + candle.low + candle.close) / 3.0,
            PriceSource::OHLC4 => (candle.open + candle.high + candle.low + candle.close) / 4.0,
        }
    }
}

/// One data point handed to [`Indicator::draw`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub time: Timestamp,
    pub candle: Candle,
}

impl Bar {
    pub fn new(time: Timestamp, candle: Candle) -> Self {
        Self { time, candle }
    }
}

/// Trait for indicator definitions.
///
/// `draw` is called once per bar in ascending time order. It emits plot ops
/// through the plotter and may keep state between bars in `globals`.
pub trait Indicator: Send + Sync {
    /// Stable identifier, used in persisted settings.
    fn id(&self) -> &str;

    /// Human-readable name of the indicator.
    fn name(&self) -> &str;

    /// Data models this indicator reads. The first entry gates which sources
    /// it can be added to.
    fn dependencies(&self) -> &[ModelKind];

    /// Whether every recompute must replay the whole history, e.g. for
    /// cumulative or windowed indicators.
    fn requires_full_history(&self) -> bool {
        false
    }

    fn draw(&self, bar: &Bar, plot: &mut Plotter<'_>, globals: &mut Globals) -> Result<(), IndicatorError>;

    /// Whether this indicator can run on a source providing `model` data.
    fn applies_to(&self, model: ModelKind) -> bool {
        self.dependencies().first().map_or(true, |dep| dep.accepts(model))
    }
}
