//! Built-in indicators.

use plotline_core::{Color, ModelKind};

use crate::globals::Globals;
use crate::indicator::{Bar, Indicator, PriceSource};
use crate::plot::Plotter;
use crate::IndicatorError;

const OHLC: &[ModelKind] = &[ModelKind::Ohlc];
const VALUE: &[ModelKind] = &[ModelKind::Value];

/// OHLC candles, colored by direction, with the last close on the axis.
#[derive(Debug, Clone)]
pub struct Candlestick {
    pub up_color: Color,
    pub down_color: Color,
}

impl Default for Candlestick {
    fn default() -> Self {
        Self {
            up_color: Color::GREEN,
            down_color: Color::RED,
        }
    }
}

impl Indicator for Candlestick {
    fn id(&self) -> &str {
        "candlestick"
    }

    fn name(&self) -> &str {
        "Candlestick"
    }

    fn dependencies(&self) -> &[ModelKind] {
        OHLC
    }

    fn draw(&self, bar: &Bar, plot: &mut Plotter<'_>, _globals: &mut Globals) -> Result<(), IndicatorError> {
        let c = &bar.candle;
        let color = if c.is_bullish() {
            self.up_color
        } else {
            self.down_color
        };
        plot.plot_candle_labeled(c.open, c.high, c.low, c.close, color, color);
        Ok(())
    }
}

/// The close price as a line.
#[derive(Debug, Clone)]
pub struct PriceLine {
    pub color: Color,
    pub line_width: f64,
}

impl Default for PriceLine {
    fn default() -> Self {
        Self {
            color: Color::BLUE,
            line_width: 1.5,
        }
    }
}

impl Indicator for PriceLine {
    fn id(&self) -> &str {
        "line"
    }

    fn name(&self) -> &str {
        "Line"
    }

    fn dependencies(&self) -> &[ModelKind] {
        VALUE
    }

    fn draw(&self, bar: &Bar, plot: &mut Plotter<'_>, _globals: &mut Globals) -> Result<(), IndicatorError> {
        plot.plot_line_labeled(bar.candle.close, self.color, self.line_width);
        Ok(())
    }
}

/// Simple moving average.
#[derive(Debug, Clone)]
pub struct Sma {
    pub period: usize,
    pub source: PriceSource,
    pub color: Color,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            source: PriceSource::Close,
            color: Color::ORANGE,
        }
    }
}

impl Indicator for Sma {
    fn id(&self) -> &str {
        "sma"
    }

    fn name(&self) -> &str {
        "Simple Moving Average"
    }

    fn dependencies(&self) -> &[ModelKind] {
        VALUE
    }

    fn requires_full_history(&self) -> bool {
        true
    }

    fn draw(&self, bar: &Bar, plot: &mut Plotter<'_>, globals: &mut Globals) -> Result<(), IndicatorError> {
        let window = globals.push("sma", self.source.extract(&bar.candle), self.period);
        if window.len() == self.period {
            let mean = window.iter().sum::<f64>() / self.period as f64;
            plot.plot_line_labeled(mean, self.color, 1.0);
        }
        Ok(())
    }
}

/// Exponential moving average, seeded with the SMA of the first `period` bars.
#[derive(Debug, Clone)]
pub struct Ema {
    pub period: usize,
    pub source: PriceSource,
    pub color: Color,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            source: PriceSource::Close,
            color: Color::PURPLE,
        }
    }
}

/// Advance an EMA stored in `globals` under `key`. Returns the value once seeded.
pub(crate) fn ema_step(globals: &mut Globals, key: &str, value: f64, period: usize) -> Option<f64> {
    let count_key = format!("{key}.n");
    let n = globals.accumulate(&count_key, 1.0) as usize;
    if n <= period {
        let sum = globals.accumulate(&format!("{key}.seed"), value);
        if n < period {
            return None;
        }
        let seed = sum / period as f64;
        globals.set(key, seed);
        return Some(seed);
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let prev = globals.get_or(key, value);
    let ema = alpha * value + (1.0 - alpha) * prev;
    globals.set(key, ema);
    Some(ema)
}

impl Indicator for Ema {
    fn id(&self) -> &str {
        "ema"
    }

    fn name(&self) -> &str {
        "Exponential Moving Average"
    }

    fn dependencies(&self) -> &[ModelKind] {
        VALUE
    }

    fn requires_full_history(&self) -> bool {
        true
    }

    fn draw(&self, bar: &Bar, plot: &mut Plotter<'_>, globals: &mut Globals) -> Result<(), IndicatorError> {
        if let Some(ema) = ema_step(globals, "ema", self.source.extract(&bar.candle), self.period) {
            plot.plot_line_labeled(ema, self.color, 1.0);
        }
        Ok(())
    }
}

/// Volume-weighted average price, cumulative over the whole history.
#[derive(Debug, Clone)]
pub struct Vwap {
    pub color: Color,
}

impl Default for Vwap {
    fn default() -> Self {
        Self {
            color: Color::rgb(0x00, 0xbc, 0xd4),
        }
    }
}

impl Indicator for Vwap {
    fn id(&self) -> &str {
        "vwap"
    }

    fn name(&self) -> &str {
        "VWAP"
    }

    fn dependencies(&self) -> &[ModelKind] {
        OHLC
    }

    fn requires_full_history(&self) -> bool {
        true
    }

    fn draw(&self, bar: &Bar, plot: &mut Plotter<'_>, globals: &mut Globals) -> Result<(), IndicatorError> {
        let c = &bar.candle;
        let pv = globals.accumulate("pv", PriceSource::HLC3.extract(c) * c.volume);
        let v = globals.accumulate("v", c.volume);
        if v > 0.0 {
            plot.plot_line_labeled(pv / v, self.color, 1.0);
        }
        Ok(())
    }
}

/// Volume bars colored by candle direction.
#[derive(Debug, Clone)]
pub struct Volume {
    pub up_color: Color,
    pub down_color: Color,
}

impl Default for Volume {
    fn default() -> Self {
        Self {
            up_color: Color::GREEN.with_alpha(0x80),
            down_color: Color::RED.with_alpha(0x80),
        }
    }
}

impl Indicator for Volume {
    fn id(&self) -> &str {
        "volume"
    }

    fn name(&self) -> &str {
        "Volume"
    }

    fn dependencies(&self) -> &[ModelKind] {
        OHLC
    }

    fn draw(&self, bar: &Bar, plot: &mut Plotter<'_>, _globals: &mut Globals) -> Result<(), IndicatorError> {
        let c = &bar.candle;
        let color = if c.is_bullish() {
            self.up_color
        } else {
            self.down_color
        };
        plot.plot_box(0.0, c.volume, 0.0, c.volume, 0.8, color);
        Ok(())
    }
}
