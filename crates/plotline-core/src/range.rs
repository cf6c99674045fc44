//! Time and price windows, plus the price-axis scale mode.

use serde::{Deserialize, Serialize};

use crate::timeframe::{Timeframe, Timestamp};

/// An inclusive `[start, end]` span of timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeRange {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// A range covering one timestamp.
    pub fn single(ts: Timestamp) -> Self {
        Self { start: ts, end: ts }
    }

    pub fn contains(&self, ts: Timestamp) -> bool {
        ts >= self.start && ts <= self.end
    }

    /// Whether the two ranges share a timestamp or touch at a bar boundary.
    pub fn overlaps_or_adjoins(&self, other: &TimeRange, timeframe: Timeframe) -> bool {
        let step = timeframe.millis();
        self.start <= other.end.saturating_add(step) && other.start <= self.end.saturating_add(step)
    }

    /// Smallest range covering both.
    pub fn union(&self, other: &TimeRange) -> TimeRange {
        TimeRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Number of aligned points in the range.
    pub fn points(&self, timeframe: Timeframe) -> usize {
        timeframe.count_in(self.start, self.end)
    }
}

/// The displayed window in domain units: milliseconds on x, price on y.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisibleRange {
    pub start: Timestamp,
    pub end: Timestamp,
    pub y_min: f64,
    pub y_max: f64,
}

impl VisibleRange {
    pub fn new(start: Timestamp, end: Timestamp, y_min: f64, y_max: f64) -> Self {
        Self {
            start,
            end,
            y_min,
            y_max,
        }
    }

    pub fn time(&self) -> TimeRange {
        TimeRange::new(self.start, self.end)
    }

    /// Visible duration in milliseconds.
    pub fn span(&self) -> i64 {
        self.end - self.start
    }

    pub fn price_span(&self) -> f64 {
        self.y_max - self.y_min
    }
}

impl Default for VisibleRange {
    fn default() -> Self {
        Self {
            start: 0,
            end: 0,
            y_min: 0.0,
            y_max: 1.0,
        }
    }
}

/// How series values are transformed before mapping to screen space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleType {
    /// Values as-is.
    #[default]
    Default,
    /// Percent change from the first visible value.
    Percent,
    /// Position within the set's overall min/max, `0..=100`.
    Normalized,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjoining_ranges() {
        let tf = Timeframe::MIN1;
        let a = TimeRange::new(0, 60_000);
        let b = TimeRange::new(120_000, 180_000);
        let c = TimeRange::new(240_000, 300_000);
        assert!(a.overlaps_or_adjoins(&b, tf));
        assert!(!a.overlaps_or_adjoins(&c, tf));
        assert_eq!(a.union(&b), TimeRange::new(0, 180_000));
        assert_eq!(a.union(&b).points(tf), 4);
    }

    #[test]
    fn test_scale_type_serde() {
        assert_eq!(
            serde_json::to_string(&ScaleType::Percent).unwrap(),
            "\"percent\""
        );
        assert_eq!(ScaleType::default(), ScaleType::Default);
    }
}
