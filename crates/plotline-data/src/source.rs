//! Historical-data fetch contract.

use std::collections::BTreeMap;
use std::future::Future;

use plotline_core::{Candle, ModelKind, TimeRange, Timeframe, Timestamp};

use crate::dataset::DatasetId;

/// One window of aligned timestamps to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub source: String,
    pub name: String,
    pub data_models: Vec<ModelKind>,
    pub timeframe: Timeframe,
    pub start: Timestamp,
    pub end: Timestamp,
}

impl FetchRequest {
    pub fn dataset_id(&self) -> DatasetId {
        DatasetId::new(self.source.clone(), self.name.clone(), self.timeframe)
    }

    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start, self.end)
    }
}

/// Points returned for one dataset.
///
/// A source may answer with one response per request, one per dataset, or
/// omit datasets entirely; points need not be ordered.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub dataset: DatasetId,
    pub points: BTreeMap<Timestamp, Candle>,
}

impl FetchResponse {
    pub fn new(dataset: DatasetId) -> Self {
        Self {
            dataset,
            points: BTreeMap::new(),
        }
    }
}

/// Trait for types that can load historical points.
///
/// This trait uses `anyhow::Result` for flexible error handling; any error
/// fails the whole batch.
pub trait HistoricalSource: Send + Sync {
    fn fetch(
        &self,
        requests: Vec<FetchRequest>,
    ) -> impl Future<Output = anyhow::Result<Vec<FetchResponse>>> + Send;
}
