//! Candle data structures for OHLCV data.

use serde::{Deserialize, Serialize};

/// OHLCV value record stored per timestamp.
///
/// Scalar ("value" model) series store the same number in all four price
/// fields, see [`Candle::flat`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl Candle {
    pub fn new(open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// A candle carrying a single scalar value.
    pub fn flat(value: f64) -> Self {
        Self::new(value, value, value, value, 0.0)
    }

    /// Whether all fields are finite and the range is not inverted.
    pub fn is_valid(&self) -> bool {
        self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite()
            && self.high >= self.low
            && self.volume >= 0.0
    }

    /// Whether the bar closed at or above its open.
    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }
}

/// Trait for types that provide OHLCV data.
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    /// (High + Low + Close) / 3
    fn typical_price(&self) -> f64 {
        (self.high() + self.low() + self.close()) / 3.0
    }
}

impl OHLCV for Candle {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }
}

/// Kind of value record a data source provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Open/high/low/close(/volume) bars.
    Ohlc,
    /// A single number per timestamp.
    Value,
}

impl ModelKind {
    /// Whether an indicator depending on `self` can run on a source of `source` kind.
    ///
    /// A `Value` dependency is satisfied by any source, since OHLC bars expose
    /// a value through their close.
    pub fn accepts(&self, source: ModelKind) -> bool {
        match self {
            ModelKind::Value => true,
            ModelKind::Ohlc => source == ModelKind::Ohlc,
        }
    }
}
