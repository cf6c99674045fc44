//! Timeframe type and timestamp alignment.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

pub const SECOND_MS: i64 = 1_000;
pub const MINUTE_MS: i64 = 60 * SECOND_MS;
pub const HOUR_MS: i64 = 60 * MINUTE_MS;
pub const DAY_MS: i64 = 24 * HOUR_MS;
pub const WEEK_MS: i64 = 7 * DAY_MS;

/// Fixed bar width of a series, in milliseconds.
///
/// Every timestamp stored for a series is a multiple of its timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timeframe(i64);

impl Timeframe {
    pub const MIN1: Timeframe = Timeframe(MINUTE_MS);
    pub const MIN5: Timeframe = Timeframe(5 * MINUTE_MS);
    pub const MIN15: Timeframe = Timeframe(15 * MINUTE_MS);
    pub const MIN30: Timeframe = Timeframe(30 * MINUTE_MS);
    pub const HOUR1: Timeframe = Timeframe(HOUR_MS);
    pub const HOUR4: Timeframe = Timeframe(4 * HOUR_MS);
    pub const DAY1: Timeframe = Timeframe(DAY_MS);
    pub const WEEK1: Timeframe = Timeframe(WEEK_MS);

    /// Create a timeframe from a duration in milliseconds.
    ///
    /// Returns `None` for non-positive durations.
    #[must_use]
    pub const fn from_millis(ms: i64) -> Option<Self> {
        if ms > 0 {
            Some(Self(ms))
        } else {
            None
        }
    }

    /// Duration of one bar in milliseconds.
    #[must_use]
    pub const fn millis(&self) -> i64 {
        self.0
    }

    /// Returns all standard timeframes in ascending order.
    pub fn all() -> &'static [Timeframe] {
        &[
            Timeframe::MIN1,
            Timeframe::MIN5,
            Timeframe::MIN15,
            Timeframe::MIN30,
            Timeframe::HOUR1,
            Timeframe::HOUR4,
            Timeframe::DAY1,
            Timeframe::WEEK1,
        ]
    }

    /// Short label such as `1m`, `4h` or `1d`.
    pub fn label(&self) -> String {
        let ms = self.0;
        if ms % WEEK_MS == 0 {
            format!("{}w", ms / WEEK_MS)
        } else if ms % DAY_MS == 0 {
            format!("{}d", ms / DAY_MS)
        } else if ms % HOUR_MS == 0 {
            format!("{}h", ms / HOUR_MS)
        } else if ms % MINUTE_MS == 0 {
            format!("{}m", ms / MINUTE_MS)
        } else if ms % SECOND_MS == 0 {
            format!("{}s", ms / SECOND_MS)
        } else {
            format!("{ms}ms")
        }
    }

    /// Parse a label produced by [`Timeframe::label`], e.g. `15m` or `1d`.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        let split = label.find(|c: char| !c.is_ascii_digit())?;
        let (count, unit) = label.split_at(split);
        let count: i64 = count.parse().ok()?;
        let unit_ms = match unit {
            "ms" => 1,
            "s" => SECOND_MS,
            "m" => MINUTE_MS,
            "h" => HOUR_MS,
            "d" => DAY_MS,
            "w" => WEEK_MS,
            _ => return None,
        };
        Self::from_millis(count.checked_mul(unit_ms)?)
    }

    /// Align a timestamp down to the start of its bar.
    #[must_use]
    pub fn align(&self, ts: Timestamp) -> Timestamp {
        ts.div_euclid(self.0) * self.0
    }

    /// Align a timestamp up to the next bar boundary (identity if aligned).
    #[must_use]
    pub fn align_up(&self, ts: Timestamp) -> Timestamp {
        let down = self.align(ts);
        if down == ts {
            ts
        } else {
            down + self.0
        }
    }

    /// Whether `ts` sits exactly on a bar boundary.
    #[must_use]
    pub fn is_aligned(&self, ts: Timestamp) -> bool {
        ts.rem_euclid(self.0) == 0
    }

    /// Iterate every aligned timestamp in `[start, end]`, ascending.
    pub fn timestamps_in(&self, start: Timestamp, end: Timestamp) -> AlignedTimestamps {
        AlignedTimestamps {
            next: self.align_up(start),
            end,
            step: self.0,
        }
    }

    /// Number of aligned timestamps in `[start, end]`.
    #[must_use]
    pub fn count_in(&self, start: Timestamp, end: Timestamp) -> usize {
        let first = self.align_up(start);
        if first > end {
            0
        } else {
            ((end - first) / self.0 + 1) as usize
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Iterator returned by [`Timeframe::timestamps_in`].
#[derive(Debug, Clone)]
pub struct AlignedTimestamps {
    next: Timestamp,
    end: Timestamp,
    step: i64,
}

impl Iterator for AlignedTimestamps {
    type Item = Timestamp;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next > self.end {
            return None;
        }
        let current = self.next;
        self.next = current.saturating_add(self.step);
        if self.next == current {
            // Saturated at i64::MAX; stop after yielding it once.
            self.end = current - 1;
        }
        Some(current)
    }
}
