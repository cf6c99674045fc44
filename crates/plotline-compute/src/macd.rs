//! MACD (Moving Average Convergence Divergence) indicator.

use plotline_core::{Color, ModelKind};

use crate::globals::Globals;
use crate::indicator::{Bar, Indicator, PriceSource};
use crate::library::ema_step;
use crate::plot::Plotter;
use crate::IndicatorError;

/// MACD indicator configuration.
#[derive(Debug, Clone)]
pub struct MacdConfig {
    /// Fast EMA period (default: 12).
    pub fast_period: usize,
    /// Slow EMA period (default: 26).
    pub slow_period: usize,
    /// Signal line EMA period (default: 9).
    pub signal_period: usize,
    /// Price source for calculation.
    pub price_source: PriceSource,
    pub macd_color: Color,
    pub signal_color: Color,
    pub histogram_pos_color: Color,
    pub histogram_neg_color: Color,
}

impl Default for MacdConfig {
    fn default() -> Self {
        Self {
            fast_period: 12,
            slow_period: 26,
            signal_period: 9,
            price_source: PriceSource::Close,
            macd_color: Color::rgb(0x33, 0x99, 0xff),
            signal_color: Color::rgb(0xff, 0x80, 0x33),
            histogram_pos_color: Color::rgb(0x33, 0xcc, 0x66),
            histogram_neg_color: Color::rgb(0xcc, 0x33, 0x33),
        }
    }
}

/// MACD indicator.
///
/// Emits the MACD line (fast EMA - slow EMA), the signal line (EMA of the
/// MACD line) and the histogram (MACD - signal) as boxes around zero.
#[derive(Debug, Clone, Default)]
pub struct Macd {
    config: MacdConfig,
}

impl Macd {
    pub fn new(config: MacdConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &MacdConfig {
        &self.config
    }

    /// Bars needed before the histogram appears.
    pub fn min_periods(&self) -> usize {
        self.config.slow_period + self.config.signal_period - 1
    }
}

impl Indicator for Macd {
    fn id(&self) -> &str {
        "macd"
    }

    fn name(&self) -> &str {
        "MACD"
    }

    fn dependencies(&self) -> &[ModelKind] {
        &[ModelKind::Value]
    }

    fn requires_full_history(&self) -> bool {
        true
    }

    fn draw(&self, bar: &Bar, plot: &mut Plotter<'_>, globals: &mut Globals) -> Result<(), IndicatorError> {
        let cfg = &self.config;
        let price = cfg.price_source.extract(&bar.candle);
        let fast = ema_step(globals, "fast", price, cfg.fast_period);
        let slow = ema_step(globals, "slow", price, cfg.slow_period);
        let (Some(fast), Some(slow)) = (fast, slow) else {
            return Ok(());
        };
        let macd = fast - slow;
        plot.plot_line_labeled(macd, cfg.macd_color, 1.0);
        if let Some(signal) = ema_step(globals, "signal", macd, cfg.signal_period) {
            plot.plot_line(signal, cfg.signal_color, 1.0);
            let hist = macd - signal;
            let color = if hist >= 0.0 {
                cfg.histogram_pos_color
            } else {
                cfg.histogram_neg_color
            };
            plot.plot_box(0.0, hist, hist.min(0.0), hist.max(0.0), 0.6, color);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plot::ComputedSet;
    use plotline_core::Candle;

    fn run(macd: &Macd, closes: &[f64]) -> ComputedSet {
        let mut set = ComputedSet::new();
        let mut globals = Globals::new();
        for (i, &close) in closes.iter().enumerate() {
            let bar = Bar::new(i as i64, Candle::new(close, close + 1.0, close - 1.0, close, 100.0));
            macd.draw(&bar, &mut Plotter::new(bar.time, &mut set), &mut globals)
                .unwrap();
        }
        set
    }

    #[test]
    fn test_macd_basic() {
        let closes: Vec<f64> = (1..=50).map(|i| 100.0 + f64::from(i)).collect();
        let set = run(&Macd::default(), &closes);

        // MACD line starts at index 25 (slow_period - 1)
        assert!(set.ops_at(24).is_none());
        assert_eq!(set.ops_at(25).map(<[_]>::len), Some(1));

        // Signal and histogram start at index 33
        assert_eq!(set.ops_at(32).map(<[_]>::len), Some(1));
        assert_eq!(set.ops_at(33).map(<[_]>::len), Some(3));
    }

    #[test]
    fn test_macd_min_periods() {
        assert_eq!(Macd::default().min_periods(), 34); // 26 + 9 - 1
    }

    #[test]
    fn test_macd_rising_series_is_positive() {
        let closes: Vec<f64> = (1..=40).map(|i| 100.0 + f64::from(i)).collect();
        let set = run(&Macd::default(), &closes);
        let (_, ops) = set.iter().last().unwrap();
        assert!(ops[0].series()[0] > 0.0);
    }
}
