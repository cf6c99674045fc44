//! The time-series cache: datasets, gap detection and merging.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use plotline_core::{
    Candle, ChartId, InstanceId, ModelKind, SparseSeries, TimeRange, Timeframe, Timestamp,
};

use crate::dataset::{Dataset, DatasetId};
use crate::validation::validate_point;
use crate::DataError;

/// Source of the current time, in milliseconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as Timestamp)
            .unwrap_or(0)
    }
}

/// A settable clock for tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn new(now: Timestamp) -> Self {
        Self(AtomicI64::new(now))
    }

    pub fn set(&self, now: Timestamp) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: i64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of a merge, naming who must recompute.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetUpdate {
    pub dataset: DatasetId,
    /// Timestamps whose value changed, ascending.
    pub changed: Vec<Timestamp>,
    pub subscribers: Vec<(ChartId, InstanceId)>,
}

impl DatasetUpdate {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }
}

/// Owns every dataset in a workspace.
///
/// Datasets are created on first reference and dropped when their last
/// subscriber leaves. Operations naming a dataset that no longer exists are
/// no-ops, because fetch completions routinely race with removals.
pub struct TimeSeriesStore {
    datasets: HashMap<DatasetId, Dataset>,
    clock: Arc<dyn Clock>,
}

impl TimeSeriesStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            datasets: HashMap::new(),
            clock,
        }
    }

    /// Current time according to the store's clock.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn contains(&self, id: &DatasetId) -> bool {
        self.datasets.contains_key(id)
    }

    pub fn dataset(&self, id: &DatasetId) -> Option<&Dataset> {
        self.datasets.get(id)
    }

    pub fn series(&self, id: &DatasetId) -> Option<&SparseSeries> {
        self.datasets.get(id).map(Dataset::series)
    }

    /// Ids of all live datasets, sorted.
    pub fn dataset_ids(&self) -> Vec<DatasetId> {
        let mut ids: Vec<_> = self.datasets.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Return the dataset for `(source, name, timeframe)`, creating it if needed.
    ///
    /// An existing dataset keeps its original model kind.
    pub fn add_or_get_dataset(
        &mut self,
        source: &str,
        name: &str,
        timeframe: Timeframe,
        model: ModelKind,
    ) -> DatasetId {
        let id = DatasetId::new(source, name, timeframe);
        self.datasets.entry(id.clone()).or_insert_with(|| {
            log::debug!("Creating dataset {}", id);
            Dataset::new(id.clone(), model)
        });
        id
    }

    pub fn add_subscriber(
        &mut self,
        id: &DatasetId,
        chart: ChartId,
        instance: InstanceId,
    ) -> Result<(), DataError> {
        let dataset = self
            .datasets
            .get_mut(id)
            .ok_or_else(|| DataError::UnknownDataset(id.clone()))?;
        dataset.subscribe(chart, instance);
        Ok(())
    }

    /// Remove a subscriber. Returns `true` if this deleted the dataset.
    pub fn remove_subscriber(&mut self, id: &DatasetId, chart: ChartId, instance: InstanceId) -> bool {
        let Some(dataset) = self.datasets.get_mut(id) else {
            log::debug!("remove_subscriber: dataset {} already gone", id);
            return false;
        };
        dataset.unsubscribe(chart, instance);
        if dataset.subscriber_count() == 0 {
            self.datasets.remove(id);
            log::debug!("Dropped dataset {} (no subscribers)", id);
            true
        } else {
            false
        }
    }

    /// Maximal runs of absent aligned timestamps in `[start, end]`.
    ///
    /// Never includes a present or pending timestamp, nor one after now.
    pub fn request_range(&self, id: &DatasetId, start: Timestamp, end: Timestamp) -> Vec<TimeRange> {
        match self.datasets.get(id) {
            Some(dataset) => dataset
                .series()
                .missing_runs(TimeRange::new(start, end), self.now()),
            None => {
                log::debug!("request_range: unknown dataset {}", id);
                Vec::new()
            }
        }
    }

    /// Merge a batch of points, last write wins per timestamp.
    ///
    /// Invalid points are dropped with a warning. Returns `None` if the
    /// dataset no longer exists; the batch is discarded and nothing is
    /// recreated.
    pub fn update_dataset<I>(&mut self, id: &DatasetId, points: I) -> Option<DatasetUpdate>
    where
        I: IntoIterator<Item = (Timestamp, Candle)>,
    {
        let Some(dataset) = self.datasets.get_mut(id) else {
            log::debug!("Discarding update for removed dataset {}", id);
            return None;
        };
        let model = dataset.model();
        let mut rejected = 0usize;
        let valid: Vec<(Timestamp, Candle)> = points
            .into_iter()
            .filter(|(_, candle)| {
                let ok = validate_point(model, candle);
                if !ok {
                    rejected += 1;
                }
                ok
            })
            .collect();
        if rejected > 0 {
            log::warn!("Dropped {} invalid points for {}", rejected, id);
        }
        let changed = dataset.series_mut().apply(valid);
        Some(DatasetUpdate {
            dataset: id.clone(),
            changed,
            subscribers: dataset.subscribers(),
        })
    }

    /// Mark absent timestamps in `range` as pending. Returns how many were marked.
    pub fn mark_pending(&mut self, id: &DatasetId, range: TimeRange) -> usize {
        self.datasets
            .get_mut(id)
            .map_or(0, |d| d.series_mut().mark_pending(range))
    }

    /// Return still-pending timestamps in `range` to absent.
    pub fn revert_pending(&mut self, id: &DatasetId, range: TimeRange) -> usize {
        self.datasets
            .get_mut(id)
            .map_or(0, |d| d.series_mut().revert_pending(range))
    }
}

impl Default for TimeSeriesStore {
    fn default() -> Self {
        Self::new()
    }
}
