//! Mapping between domain space (time, price) and screen pixels.

use plotline_core::{Timeframe, Timestamp, VisibleRange};

/// A visible range drawn into a `width` x `height` pixel area.
///
/// Price grows upward on screen, so larger prices map to smaller y.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub range: VisibleRange,
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(range: VisibleRange, width: f64, height: f64) -> Self {
        Self {
            range,
            width,
            height,
        }
    }

    /// Screen x of a timestamp.
    pub fn x(&self, ts: Timestamp) -> f64 {
        let span = self.range.span();
        if span == 0 {
            return 0.0;
        }
        (ts - self.range.start) as f64 / span as f64 * self.width
    }

    /// Screen y of a price.
    pub fn y(&self, price: f64) -> f64 {
        let span = self.range.price_span();
        if span == 0.0 || !span.is_finite() {
            return self.height / 2.0;
        }
        (1.0 - (price - self.range.y_min) / span) * self.height
    }

    /// Timestamp under screen x, snapped to the nearest bar boundary.
    pub fn time_at(&self, x: f64, timeframe: Timeframe) -> Timestamp {
        let raw = if self.width == 0.0 {
            self.range.start as f64
        } else {
            self.range.start as f64 + x / self.width * self.range.span() as f64
        };
        let tf = timeframe.millis() as f64;
        ((raw / tf).round() * tf) as Timestamp
    }

    /// Price under screen y, rounded to `decimals` places.
    pub fn price_at(&self, y: f64, decimals: u32) -> f64 {
        let raw = if self.height == 0.0 {
            self.range.y_min
        } else {
            self.range.y_min + (1.0 - y / self.height) * self.range.price_span()
        };
        let factor = 10f64.powi(decimals.min(plotline_compute::MAX_DECIMAL_PLACES) as i32);
        (raw * factor).round() / factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> Viewport {
        Viewport::new(VisibleRange::new(0, 600_000, 100.0, 200.0), 600.0, 400.0)
    }

    #[test]
    fn test_forward_mapping() {
        let vp = viewport();
        assert_eq!(vp.x(0), 0.0);
        assert_eq!(vp.x(300_000), 300.0);
        assert_eq!(vp.y(200.0), 0.0);
        assert_eq!(vp.y(100.0), 400.0);
        assert_eq!(vp.y(150.0), 200.0);
    }

    #[test]
    fn test_inverse_mapping() {
        let vp = viewport();
        assert_eq!(vp.time_at(95.0, Timeframe::MIN1), 120_000);
        assert_eq!(vp.time_at(85.0, Timeframe::MIN1), 60_000);
        assert_eq!(vp.price_at(200.0, 2), 150.0);
        assert_eq!(vp.price_at(1.0, 2), 199.75);
    }

    #[test]
    fn test_degenerate_spans() {
        let vp = Viewport::new(VisibleRange::new(5, 5, 1.0, 1.0), 100.0, 50.0);
        assert_eq!(vp.x(5), 0.0);
        assert_eq!(vp.y(1.0), 25.0);
    }
}
