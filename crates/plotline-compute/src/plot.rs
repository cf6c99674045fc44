//! Plot operations and the per-instance computed set.

use std::collections::BTreeMap;

use plotline_core::{Color, TimeRange, Timestamp};

/// Maximum decimal places tracked for axis labels.
pub const MAX_DECIMAL_PLACES: u32 = 8;

/// One domain-space drawing operation emitted by an indicator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlotOp {
    /// A point on a polyline; consecutive points at adjacent timestamps are joined.
    Line {
        value: f64,
        color: Color,
        line_width: f64,
        ylabel: bool,
    },
    /// A filled box from `open` to `close`; `width` is a fraction of one bar.
    Box {
        open: f64,
        close: f64,
        low: f64,
        high: f64,
        width: f64,
        color: Color,
    },
    /// A candle body plus wick.
    Candle {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        color: Color,
        wick_color: Color,
        ylabel: bool,
    },
}

impl PlotOp {
    /// Price values carried by this op, in a fixed per-kind order:
    /// line `[value]`, box `[open, close, low, high]`, candle `[open, high, low, close]`.
    pub fn series(&self) -> Vec<f64> {
        match *self {
            PlotOp::Line { value, .. } => vec![value],
            PlotOp::Box {
                open,
                close,
                low,
                high,
                ..
            } => vec![open, close, low, high],
            PlotOp::Candle {
                open,
                high,
                low,
                close,
                ..
            } => vec![open, high, low, close],
        }
    }

    /// Apply `f(index, value)` to every price value, keeping everything else.
    pub fn map_values<F: FnMut(usize, f64) -> f64>(&self, mut f: F) -> PlotOp {
        match *self {
            PlotOp::Line {
                value,
                color,
                line_width,
                ylabel,
            } => PlotOp::Line {
                value: f(0, value),
                color,
                line_width,
                ylabel,
            },
            PlotOp::Box {
                open,
                close,
                low,
                high,
                width,
                color,
            } => PlotOp::Box {
                open: f(0, open),
                close: f(1, close),
                low: f(2, low),
                high: f(3, high),
                width,
                color,
            },
            PlotOp::Candle {
                open,
                high,
                low,
                close,
                color,
                wick_color,
                ylabel,
            } => PlotOp::Candle {
                open: f(0, open),
                high: f(1, high),
                low: f(2, low),
                close: f(3, close),
                color,
                wick_color,
                ylabel,
            },
        }
    }

    /// The value to show on the price axis, if this op asked for a label.
    pub fn label_value(&self) -> Option<f64> {
        match *self {
            PlotOp::Line {
                value, ylabel: true, ..
            } => Some(value),
            PlotOp::Candle {
                close, ylabel: true, ..
            } => Some(close),
            _ => None,
        }
    }

    /// Primary color of the op.
    pub fn color(&self) -> Color {
        match *self {
            PlotOp::Line { color, .. } | PlotOp::Box { color, .. } | PlotOp::Candle { color, .. } => {
                color
            }
        }
    }

    pub fn is_finite(&self) -> bool {
        let finite_width = match *self {
            PlotOp::Box { width, .. } => width.is_finite(),
            PlotOp::Line { line_width, .. } => line_width.is_finite(),
            PlotOp::Candle { .. } => true,
        };
        finite_width && self.series().iter().all(|v| v.is_finite())
    }
}

/// Decimal digits needed to print `value`, capped at [`MAX_DECIMAL_PLACES`].
pub fn decimal_places(value: f64) -> u32 {
    if !value.is_finite() {
        return 0;
    }
    let text = format!("{:.*}", MAX_DECIMAL_PLACES as usize, value.abs());
    match text.split_once('.') {
        Some((_, frac)) => frac.trim_end_matches('0').len() as u32,
        None => 0,
    }
}

/// Plot ops of one indicator instance, keyed by timestamp, with running bounds.
///
/// `min <= v <= max` holds for every value of every op in the set.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedSet {
    data: BTreeMap<Timestamp, Vec<PlotOp>>,
    min: f64,
    max: f64,
    decimal_places: u32,
}

impl ComputedSet {
    pub fn new() -> Self {
        Self {
            data: BTreeMap::new(),
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            decimal_places: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of timestamps with ops.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Smallest value in the set, `+inf` when empty.
    #[must_use]
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Largest value in the set, `-inf` when empty.
    #[must_use]
    pub fn max(&self) -> f64 {
        self.max
    }

    #[must_use]
    pub fn decimal_places(&self) -> u32 {
        self.decimal_places
    }

    pub fn ops_at(&self, ts: Timestamp) -> Option<&[PlotOp]> {
        self.data.get(&ts).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, &[PlotOp])> + '_ {
        self.data.iter().map(|(ts, ops)| (*ts, ops.as_slice()))
    }

    pub fn range(&self, range: TimeRange) -> impl Iterator<Item = (Timestamp, &[PlotOp])> + '_ {
        self.data
            .range(range.start..=range.end)
            .map(|(ts, ops)| (*ts, ops.as_slice()))
    }

    /// Append an op at `ts`. Ops with non-finite values are dropped.
    pub fn push(&mut self, ts: Timestamp, op: PlotOp) -> bool {
        if !op.is_finite() {
            return false;
        }
        for v in op.series() {
            self.min = self.min.min(v);
            self.max = self.max.max(v);
            self.decimal_places = self.decimal_places.max(decimal_places(v));
        }
        self.data.entry(ts).or_default().push(op);
        true
    }

    /// Remove every op at `ts`.
    pub fn clear_at(&mut self, ts: Timestamp) {
        self.data.remove(&ts);
    }

    /// Recompute `min`/`max` from the ops present.
    ///
    /// Decimal places only ever grow, so labels keep a stable width.
    pub fn recompute_bounds(&mut self) {
        let (min, max) = self
            .data
            .values()
            .flatten()
            .flat_map(PlotOp::series)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        self.min = min;
        self.max = max;
    }
}

impl Default for ComputedSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Plotting primitives handed to an indicator for one bar.
///
/// Every op lands at the timestamp of the bar being drawn.
pub struct Plotter<'a> {
    time: Timestamp,
    set: &'a mut ComputedSet,
}

impl<'a> Plotter<'a> {
    pub fn new(time: Timestamp, set: &'a mut ComputedSet) -> Self {
        Self { time, set }
    }

    /// Timestamp of the current bar.
    #[must_use]
    pub fn time(&self) -> Timestamp {
        self.time
    }

    pub fn plot_line(&mut self, value: f64, color: Color, line_width: f64) {
        self.push(PlotOp::Line {
            value,
            color,
            line_width,
            ylabel: false,
        });
    }

    /// Like [`Plotter::plot_line`], and label the latest value on the price axis.
    pub fn plot_line_labeled(&mut self, value: f64, color: Color, line_width: f64) {
        self.push(PlotOp::Line {
            value,
            color,
            line_width,
            ylabel: true,
        });
    }

    pub fn plot_box(&mut self, open: f64, close: f64, low: f64, high: f64, width: f64, color: Color) {
        self.push(PlotOp::Box {
            open,
            close,
            low,
            high,
            width,
            color,
        });
    }

    pub fn plot_candle(&mut self, open: f64, high: f64, low: f64, close: f64, color: Color, wick_color: Color) {
        self.push(PlotOp::Candle {
            open,
            high,
            low,
            close,
            color,
            wick_color,
            ylabel: false,
        });
    }

    /// Like [`Plotter::plot_candle`], and label the latest close on the price axis.
    pub fn plot_candle_labeled(
        &mut self,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        color: Color,
        wick_color: Color,
    ) {
        self.push(PlotOp::Candle {
            open,
            high,
            low,
            close,
            color,
            wick_color,
            ylabel: true,
        });
    }

    fn push(&mut self, op: PlotOp) {
        if !self.set.push(self.time, op) {
            log::trace!("Skipping non-finite plot op at {}", self.time);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_places() {
        assert_eq!(decimal_places(10.0), 0);
        assert_eq!(decimal_places(1.25), 2);
        assert_eq!(decimal_places(-0.5), 1);
        assert_eq!(decimal_places(0.123456789123), 8);
        assert_eq!(decimal_places(f64::NAN), 0);
    }

    #[test]
    fn test_plotter_tracks_bounds_and_precision() {
        let mut set = ComputedSet::new();
        {
            let mut plot = Plotter::new(60_000, &mut set);
            plot.plot_line(10.5, Color::BLUE, 1.0);
            plot.plot_candle(9.0, 12.25, 8.0, 11.0, Color::GREEN, Color::GREEN);
        }
        assert_eq!(set.min(), 8.0);
        assert_eq!(set.max(), 12.25);
        assert_eq!(set.decimal_places(), 2);
        assert_eq!(set.ops_at(60_000).map(<[_]>::len), Some(2));
    }

    #[test]
    fn test_non_finite_ops_are_dropped() {
        let mut set = ComputedSet::new();
        Plotter::new(0, &mut set).plot_line(f64::NAN, Color::BLUE, 1.0);
        assert!(set.is_empty());
        assert_eq!(set.min(), f64::INFINITY);
    }

    #[test]
    fn test_recompute_bounds_after_clear() {
        let mut set = ComputedSet::new();
        Plotter::new(0, &mut set).plot_line(1.0, Color::BLUE, 1.0);
        Plotter::new(1, &mut set).plot_line(100.0, Color::BLUE, 1.0);
        set.clear_at(1);
        set.recompute_bounds();
        assert_eq!((set.min(), set.max()), (1.0, 1.0));
    }

    #[test]
    fn test_series_order_and_label() {
        let candle = PlotOp::Candle {
            open: 1.0,
            high: 4.0,
            low: 0.5,
            close: 3.0,
            color: Color::GREEN,
            wick_color: Color::GREEN,
            ylabel: true,
        };
        assert_eq!(candle.series(), vec![1.0, 4.0, 0.5, 3.0]);
        assert_eq!(candle.label_value(), Some(3.0));
        let doubled = candle.map_values(|_, v| v * 2.0);
        assert_eq!(doubled.series(), vec![2.0, 8.0, 1.0, 6.0]);
    }
}
