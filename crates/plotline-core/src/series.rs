//! Sparse timestamp-keyed series with pending markers.

use std::collections::BTreeMap;

use crate::candle::Candle;
use crate::range::TimeRange;
use crate::timeframe::{Timeframe, Timestamp};

/// State of one timestamp that has been seen by the series.
///
/// A timestamp with no slot at all is *absent*: it was never requested.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Slot {
    /// Requested from the upstream source, not yet returned.
    Pending,
    /// Value is known.
    Ready(Candle),
}

impl Slot {
    pub fn candle(&self) -> Option<&Candle> {
        match self {
            Slot::Ready(c) => Some(c),
            Slot::Pending => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Slot::Pending)
    }
}

/// A time series keyed by aligned timestamps.
///
/// Every key is a multiple of the series timeframe. Values are ordered by
/// timestamp, so range scans are ascending.
#[derive(Debug, Clone)]
pub struct SparseSeries {
    timeframe: Timeframe,
    slots: BTreeMap<Timestamp, Slot>,
}

impl SparseSeries {
    pub fn new(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            slots: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Number of slots, pending ones included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, ts: Timestamp) -> Option<&Slot> {
        self.slots.get(&ts)
    }

    /// The ready value at `ts`, if any.
    pub fn candle(&self, ts: Timestamp) -> Option<&Candle> {
        self.slots.get(&ts).and_then(Slot::candle)
    }

    pub fn pending_count(&self) -> usize {
        self.slots.values().filter(|s| s.is_pending()).count()
    }

    /// Latest timestamp holding a ready value.
    pub fn last_ready(&self) -> Option<Timestamp> {
        self.slots
            .iter()
            .rev()
            .find(|(_, s)| !s.is_pending())
            .map(|(ts, _)| *ts)
    }

    /// Earliest timestamp holding a ready value.
    pub fn first_ready(&self) -> Option<Timestamp> {
        self.slots
            .iter()
            .find(|(_, s)| !s.is_pending())
            .map(|(ts, _)| *ts)
    }

    /// Ready values with timestamps in `range`, ascending.
    pub fn ready_in(&self, range: TimeRange) -> impl Iterator<Item = (Timestamp, &Candle)> + '_ {
        self.slots
            .range(range.start..=range.end)
            .filter_map(|(ts, s)| s.candle().map(|c| (*ts, c)))
    }

    /// All ready values, ascending.
    pub fn ready(&self) -> impl Iterator<Item = (Timestamp, &Candle)> + '_ {
        self.slots
            .iter()
            .filter_map(|(ts, s)| s.candle().map(|c| (*ts, c)))
    }

    /// Mark every absent aligned timestamp in `range` as pending.
    ///
    /// Present values and existing pending markers are left alone. Returns
    /// the number of newly marked timestamps.
    pub fn mark_pending(&mut self, range: TimeRange) -> usize {
        let mut marked = 0;
        for ts in self.timeframe.timestamps_in(range.start, range.end) {
            if let std::collections::btree_map::Entry::Vacant(e) = self.slots.entry(ts) {
                e.insert(Slot::Pending);
                marked += 1;
            }
        }
        marked
    }

    /// Return still-pending timestamps in `range` to absent.
    ///
    /// Returns the number of reverted timestamps.
    pub fn revert_pending(&mut self, range: TimeRange) -> usize {
        let pending: Vec<Timestamp> = self
            .slots
            .range(range.start..=range.end)
            .filter(|(_, s)| s.is_pending())
            .map(|(ts, _)| *ts)
            .collect();
        for ts in &pending {
            self.slots.remove(ts);
        }
        pending.len()
    }

    /// Merge a batch of values, last write wins per timestamp.
    ///
    /// Unaligned timestamps are aligned down to their bar. Returns the
    /// timestamps whose slot changed, ascending and deduplicated.
    pub fn apply<I>(&mut self, batch: I) -> Vec<Timestamp>
    where
        I: IntoIterator<Item = (Timestamp, Candle)>,
    {
        let mut changed = Vec::new();
        for (ts, candle) in batch {
            let ts = self.timeframe.align(ts);
            let new = Slot::Ready(candle);
            if self.slots.insert(ts, new) != Some(new) {
                changed.push(ts);
            }
        }
        changed.sort_unstable();
        changed.dedup();
        changed
    }

    /// Maximal runs of absent aligned timestamps in `range`.
    ///
    /// Timestamps after `now` are never requestable and end the scan. Both
    /// pending and ready slots split runs.
    pub fn missing_runs(&self, range: TimeRange, now: Timestamp) -> Vec<TimeRange> {
        let end = range.end.min(now);
        let mut runs = Vec::new();
        let mut current: Option<TimeRange> = None;
        for ts in self.timeframe.timestamps_in(range.start, end) {
            if self.slots.contains_key(&ts) {
                if let Some(run) = current.take() {
                    runs.push(run);
                }
            } else {
                match current.as_mut() {
                    Some(run) => run.end = ts,
                    None => current = Some(TimeRange::single(ts)),
                }
            }
        }
        runs.extend(current);
        runs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TF: Timeframe = Timeframe::MIN1;
    const M: i64 = 60_000;

    fn series_with(ts: &[Timestamp]) -> SparseSeries {
        let mut s = SparseSeries::new(TF);
        s.apply(ts.iter().map(|&t| (t, Candle::flat(t as f64))));
        s
    }

    #[test]
    fn test_missing_runs_splits_on_present() {
        let s = series_with(&[0, 3 * M]);
        let runs = s.missing_runs(TimeRange::new(0, 5 * M), 10 * M);
        assert_eq!(
            runs,
            vec![TimeRange::new(M, 2 * M), TimeRange::new(4 * M, 5 * M)]
        );
    }

    #[test]
    fn test_missing_runs_excludes_future() {
        let s = series_with(&[0]);
        let runs = s.missing_runs(TimeRange::new(0, 10 * M), 2 * M + 5);
        assert_eq!(runs, vec![TimeRange::new(M, 2 * M)]);
    }

    #[test]
    fn test_pending_splits_runs_and_is_not_rerequested() {
        let mut s = SparseSeries::new(TF);
        assert_eq!(s.mark_pending(TimeRange::new(M, 2 * M)), 2);
        let runs = s.missing_runs(TimeRange::new(0, 3 * M), 10 * M);
        assert_eq!(runs, vec![TimeRange::single(0), TimeRange::single(3 * M)]);
    }

    #[test]
    fn test_mark_pending_keeps_present_values() {
        let mut s = series_with(&[M]);
        assert_eq!(s.mark_pending(TimeRange::new(0, 2 * M)), 2);
        assert_eq!(s.candle(M), Some(&Candle::flat(M as f64)));
        assert_eq!(s.pending_count(), 2);
    }

    #[test]
    fn test_apply_last_write_wins_and_reports_changes() {
        let mut s = series_with(&[0, M]);
        let changed = s.apply(vec![
            (M, Candle::flat(1.0)),
            (M, Candle::flat(2.0)),
            (0, Candle::flat(0.0)),
        ]);
        assert_eq!(s.candle(M), Some(&Candle::flat(2.0)));
        // Timestamp 0 already held 0.0.
        assert_eq!(changed, vec![M]);
    }

    #[test]
    fn test_apply_aligns_timestamps() {
        let mut s = SparseSeries::new(TF);
        let changed = s.apply(vec![(M + 123, Candle::flat(1.0))]);
        assert_eq!(changed, vec![M]);
        assert!(s.candle(M).is_some());
    }

    #[test]
    fn test_revert_pending_only_touches_pending() {
        let mut s = series_with(&[M]);
        s.mark_pending(TimeRange::new(0, 3 * M));
        assert_eq!(s.revert_pending(TimeRange::new(0, 2 * M)), 2);
        assert!(s.get(0).is_none());
        assert!(s.candle(M).is_some());
        assert_eq!(s.get(3 * M), Some(&Slot::Pending));
    }

    #[test]
    fn test_ready_bounds() {
        let mut s = series_with(&[M, 2 * M]);
        s.mark_pending(TimeRange::single(5 * M));
        assert_eq!(s.first_ready(), Some(M));
        assert_eq!(s.last_ready(), Some(2 * M));
        assert_eq!(s.ready_in(TimeRange::new(0, 10 * M)).count(), 2);
    }
}
