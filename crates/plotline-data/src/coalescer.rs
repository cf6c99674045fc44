//! Batches gap requests into bounded fetch windows.

use std::collections::{BTreeMap, HashMap};

use plotline_config::{FetchConfig, PendingPolicy};
use plotline_core::{TimeRange, Timeframe, Timestamp};

use crate::dataset::DatasetId;
use crate::source::{FetchRequest, FetchResponse};
use crate::store::{DatasetUpdate, TimeSeriesStore};

/// Split `range` into windows of at most `max_points` aligned timestamps,
/// newest window first.
pub fn split_windows(range: TimeRange, timeframe: Timeframe, max_points: usize) -> Vec<TimeRange> {
    let step = timeframe.millis();
    let max_points = max_points.max(1) as i64;
    let first = timeframe.align_up(range.start);
    let mut end = timeframe.align(range.end);
    let mut windows = Vec::new();
    while end >= first {
        let start = (end - (max_points - 1) * step).max(first);
        windows.push(TimeRange::new(start, end));
        end = start - step;
    }
    windows
}

/// Requests taken in one tick, ready to dispatch through a single fetch call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchBatch {
    /// Sorted by window end, newest first.
    pub requests: Vec<FetchRequest>,
}

impl FetchBatch {
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Requested windows grouped by dataset.
    pub fn windows(&self) -> BTreeMap<DatasetId, Vec<TimeRange>> {
        let mut out: BTreeMap<DatasetId, Vec<TimeRange>> = BTreeMap::new();
        for req in &self.requests {
            out.entry(req.dataset_id()).or_default().push(req.range());
        }
        out
    }
}

/// What a resolved batch did to the store.
#[derive(Debug, Default)]
pub struct FetchReport {
    /// Non-empty merges, in dataset order.
    pub updates: Vec<DatasetUpdate>,
    /// Datasets whose fetch failed or was not answered.
    pub failed: Vec<DatasetId>,
    /// Pending timestamps returned to absent.
    pub reverted: usize,
    /// Transport error message, if the whole call failed.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct Backoff {
    failures: u32,
    until: Timestamp,
}

/// Accumulates missing runs between ticks and turns them into fetch batches.
///
/// Runs arriving while a batch is in flight land in a fresh accumulator, so
/// in-flight windows are never requested twice: they are already pending.
pub struct RequestCoalescer {
    config: FetchConfig,
    pending: HashMap<DatasetId, Vec<TimeRange>>,
    backoff: HashMap<DatasetId, Backoff>,
}

impl RequestCoalescer {
    pub fn new(config: FetchConfig) -> Self {
        Self {
            config,
            pending: HashMap::new(),
            backoff: HashMap::new(),
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Whether nothing is waiting for the next tick.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether `id` is currently backing off after a failure.
    pub fn in_backoff(&self, id: &DatasetId, now: Timestamp) -> bool {
        self.backoff.get(id).is_some_and(|b| now < b.until)
    }

    /// Queue missing runs for `id`, merging with runs already queued.
    ///
    /// Returns `false` if the dataset is backing off and the runs were dropped.
    pub fn enqueue(&mut self, id: &DatasetId, runs: &[TimeRange], now: Timestamp) -> bool {
        if runs.is_empty() {
            return true;
        }
        if self.in_backoff(id, now) {
            log::debug!("Dataset {} in backoff, dropping {} runs", id, runs.len());
            return false;
        }
        let queued = self.pending.entry(id.clone()).or_default();
        queued.extend_from_slice(runs);
        *queued = merge_runs(std::mem::take(queued), id.timeframe);
        true
    }

    /// Snapshot and clear the accumulator, mark every queued timestamp pending,
    /// and split the runs into fetch windows.
    ///
    /// Runs for datasets removed since they were queued are discarded.
    pub fn take_batch(&mut self, store: &mut TimeSeriesStore) -> FetchBatch {
        let snapshot = std::mem::take(&mut self.pending);
        let mut requests = Vec::new();
        for (id, runs) in snapshot {
            let Some(model) = store.dataset(&id).map(|d| d.model()) else {
                log::debug!("take_batch: dataset {} removed, skipping", id);
                continue;
            };
            for run in runs {
                store.mark_pending(&id, run);
                for window in split_windows(run, id.timeframe, self.config.window_points) {
                    requests.push(FetchRequest {
                        source: id.source.clone(),
                        name: id.name.clone(),
                        data_models: vec![model],
                        timeframe: id.timeframe,
                        start: window.start,
                        end: window.end,
                    });
                }
            }
        }
        requests.sort_by(|a, b| {
            b.end
                .cmp(&a.end)
                .then_with(|| a.dataset_id().cmp(&b.dataset_id()))
                .then_with(|| b.start.cmp(&a.start))
        });
        if !requests.is_empty() {
            log::debug!("Dispatching fetch batch of {} windows", requests.len());
        }
        FetchBatch { requests }
    }

    /// Apply the outcome of a fetch call for `batch`.
    ///
    /// Successful responses are merged into the store. Datasets that failed or
    /// were left unanswered are handled per the pending policy.
    pub fn resolve(
        &mut self,
        store: &mut TimeSeriesStore,
        batch: &FetchBatch,
        outcome: anyhow::Result<Vec<FetchResponse>>,
    ) -> FetchReport {
        let windows = batch.windows();
        let mut report = FetchReport::default();
        let now = store.now();

        let responses = match outcome {
            Ok(responses) => responses,
            Err(e) => {
                log::error!("Historical fetch failed for {} windows: {:#}", batch.len(), e);
                report.error = Some(format!("{e:#}"));
                for (id, ranges) in &windows {
                    report.reverted += self.fail(store, id, ranges, now);
                    report.failed.push(id.clone());
                }
                return report;
            }
        };

        let mut merged: BTreeMap<DatasetId, Vec<(Timestamp, plotline_core::Candle)>> =
            BTreeMap::new();
        for response in responses {
            if !windows.contains_key(&response.dataset) {
                log::warn!("Ignoring unrequested response for {}", response.dataset);
                continue;
            }
            merged
                .entry(response.dataset)
                .or_default()
                .extend(response.points);
        }

        for (id, ranges) in &windows {
            match merged.remove(id) {
                Some(points) => {
                    self.backoff.remove(id);
                    if let Some(update) = store.update_dataset(id, points) {
                        if !update.is_empty() {
                            report.updates.push(update);
                        }
                    }
                }
                None => {
                    log::warn!("Fetch response omitted dataset {}", id);
                    report.reverted += self.fail(store, id, ranges, now);
                    report.failed.push(id.clone());
                }
            }
        }
        report
    }

    fn fail(
        &mut self,
        store: &mut TimeSeriesStore,
        id: &DatasetId,
        ranges: &[TimeRange],
        now: Timestamp,
    ) -> usize {
        if self.config.pending_policy == PendingPolicy::Keep {
            return 0;
        }
        let reverted = ranges
            .iter()
            .map(|range| store.revert_pending(id, *range))
            .sum();
        let failures = self.backoff.get(id).map_or(0, |b| b.failures) + 1;
        let delay = self.config.backoff(failures).as_millis() as i64;
        self.backoff.insert(
            id.clone(),
            Backoff {
                failures,
                until: now.saturating_add(delay),
            },
        );
        log::info!(
            "Dataset {} backing off {}ms after {} failure(s)",
            id,
            delay,
            failures
        );
        reverted
    }
}

/// Sort runs and merge overlapping or adjacent ones.
fn merge_runs(mut runs: Vec<TimeRange>, timeframe: Timeframe) -> Vec<TimeRange> {
    runs.sort();
    let mut merged: Vec<TimeRange> = Vec::with_capacity(runs.len());
    for run in runs {
        match merged.last_mut() {
            Some(last) if last.overlaps_or_adjoins(&run, timeframe) => *last = last.union(&run),
            _ => merged.push(run),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use plotline_core::{Candle, ModelKind};
    use std::sync::Arc;

    use crate::store::ManualClock;

    const M: i64 = 60_000;

    fn setup(policy: PendingPolicy) -> (TimeSeriesStore, RequestCoalescer, DatasetId) {
        let clock = Arc::new(ManualClock::new(10_000 * M));
        let mut store = TimeSeriesStore::with_clock(clock);
        let id = store.add_or_get_dataset("S", "N", Timeframe::MIN1, ModelKind::Ohlc);
        let config = FetchConfig {
            pending_policy: policy,
            ..FetchConfig::default()
        };
        (store, RequestCoalescer::new(config), id)
    }

    #[test]
    fn test_split_windows_newest_first() {
        let windows = split_windows(TimeRange::new(0, 9 * M), Timeframe::MIN1, 4);
        assert_eq!(
            windows,
            vec![
                TimeRange::new(6 * M, 9 * M),
                TimeRange::new(2 * M, 5 * M),
                TimeRange::new(0, M),
            ]
        );
        let total: usize = windows.iter().map(|w| w.points(Timeframe::MIN1)).sum();
        assert_eq!(total, 10);
    }

    #[test]
    fn test_split_windows_single_point() {
        let windows = split_windows(TimeRange::single(5 * M), Timeframe::MIN1, 300);
        assert_eq!(windows, vec![TimeRange::single(5 * M)]);
    }

    #[test]
    fn test_merge_runs() {
        let runs = merge_runs(
            vec![
                TimeRange::new(5 * M, 6 * M),
                TimeRange::new(0, M),
                TimeRange::new(2 * M, 3 * M),
            ],
            Timeframe::MIN1,
        );
        assert_eq!(runs, vec![TimeRange::new(0, 3 * M), TimeRange::new(5 * M, 6 * M)]);
    }

    #[test]
    fn test_take_batch_marks_pending_and_clears() {
        let (mut store, mut co, id) = setup(PendingPolicy::Revert);
        let runs = store.request_range(&id, 0, 599 * M);
        co.enqueue(&id, &runs, store.now());
        let batch = co.take_batch(&mut store);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.requests[0].end, 599 * M);
        assert_eq!(batch.requests[1].end, 299 * M);
        assert!(co.is_idle());
        assert_eq!(store.series(&id).unwrap().pending_count(), 600);
        assert!(store.request_range(&id, 0, 599 * M).is_empty());
        assert!(co.take_batch(&mut store).is_empty());
    }

    #[test]
    fn test_batch_sorted_across_datasets() {
        let (mut store, mut co, a) = setup(PendingPolicy::Revert);
        let b = store.add_or_get_dataset("S", "M", Timeframe::MIN1, ModelKind::Value);
        let now = store.now();
        co.enqueue(&a, &[TimeRange::new(0, 10 * M)], now);
        co.enqueue(&b, &[TimeRange::new(0, 20 * M)], now);
        let batch = co.take_batch(&mut store);
        let ends: Vec<_> = batch.requests.iter().map(|r| r.end).collect();
        assert_eq!(ends, vec![20 * M, 10 * M]);
        assert_eq!(batch.requests[0].data_models, vec![ModelKind::Value]);
    }

    #[test]
    fn test_resolve_merges_responses() {
        let (mut store, mut co, id) = setup(PendingPolicy::Revert);
        co.enqueue(&id, &[TimeRange::new(0, 2 * M)], store.now());
        let batch = co.take_batch(&mut store);
        let mut response = FetchResponse::new(id.clone());
        for ts in [0, M, 2 * M] {
            response.points.insert(ts, Candle::flat(1.0));
        }
        let report = co.resolve(&mut store, &batch, Ok(vec![response]));
        assert_eq!(report.updates.len(), 1);
        assert_eq!(report.updates[0].changed, vec![0, M, 2 * M]);
        assert_eq!(store.series(&id).unwrap().pending_count(), 0);
    }

    #[test]
    fn test_failure_reverts_and_backs_off() {
        let (mut store, mut co, id) = setup(PendingPolicy::Revert);
        let now = store.now();
        co.enqueue(&id, &[TimeRange::new(0, 2 * M)], now);
        let batch = co.take_batch(&mut store);
        let report = co.resolve(&mut store, &batch, Err(anyhow::anyhow!("offline")));
        assert_eq!(report.reverted, 3);
        assert_eq!(report.failed, vec![id.clone()]);
        assert!(report.error.is_some());
        assert_eq!(store.request_range(&id, 0, 2 * M).len(), 1);
        assert!(co.in_backoff(&id, now));
        assert!(!co.enqueue(&id, &[TimeRange::new(0, 2 * M)], now));
        assert!(co.enqueue(&id, &[TimeRange::new(0, 2 * M)], now + 1_000));
    }

    #[test]
    fn test_keep_policy_leaves_pending() {
        let (mut store, mut co, id) = setup(PendingPolicy::Keep);
        co.enqueue(&id, &[TimeRange::new(0, 2 * M)], store.now());
        let batch = co.take_batch(&mut store);
        let report = co.resolve(&mut store, &batch, Ok(Vec::new()));
        assert_eq!(report.reverted, 0);
        assert_eq!(store.series(&id).unwrap().pending_count(), 3);
        assert!(store.request_range(&id, 0, 2 * M).is_empty());
    }

    #[test]
    fn test_resolve_after_dataset_removed_is_noop() {
        let (mut store, mut co, id) = setup(PendingPolicy::Revert);
        store
            .add_subscriber(&id, plotline_core::ChartId(0), plotline_core::InstanceId(0))
            .unwrap();
        co.enqueue(&id, &[TimeRange::new(0, M)], store.now());
        let batch = co.take_batch(&mut store);
        store.remove_subscriber(&id, plotline_core::ChartId(0), plotline_core::InstanceId(0));
        let mut response = FetchResponse::new(id.clone());
        response.points.insert(0, Candle::flat(1.0));
        let report = co.resolve(&mut store, &batch, Ok(vec![response]));
        assert!(report.updates.is_empty());
        assert!(!store.contains(&id));
    }
}
