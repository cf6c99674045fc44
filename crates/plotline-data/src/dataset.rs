//! Dataset identity and subscriber bookkeeping.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use plotline_core::{ChartId, InstanceId, ModelKind, SparseSeries, Timeframe};

use crate::DataError;

/// Identifies one `(source, name, timeframe)` series.
///
/// Renders as `source:name:timeframe_ms`, e.g. `BINANCE:BTCUSDT:60000`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatasetId {
    pub source: String,
    pub name: String,
    pub timeframe: Timeframe,
}

impl DatasetId {
    pub fn new(source: impl Into<String>, name: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
            timeframe,
        }
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.name, self.timeframe.millis())
    }
}

impl FromStr for DatasetId {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DataError::InvalidDatasetId(s.to_string());
        let (rest, tf) = s.rsplit_once(':').ok_or_else(invalid)?;
        let (source, name) = rest.split_once(':').ok_or_else(invalid)?;
        let ms: i64 = tf.parse().map_err(|_| invalid())?;
        let timeframe = Timeframe::from_millis(ms).ok_or_else(invalid)?;
        if source.is_empty() || name.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(source, name, timeframe))
    }
}

/// A cached series plus the indicator instances reading it.
#[derive(Debug, Clone)]
pub struct Dataset {
    id: DatasetId,
    model: ModelKind,
    series: SparseSeries,
    subscribers: BTreeMap<ChartId, BTreeSet<InstanceId>>,
}

impl Dataset {
    pub(crate) fn new(id: DatasetId, model: ModelKind) -> Self {
        let series = SparseSeries::new(id.timeframe);
        Self {
            id,
            model,
            series,
            subscribers: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &DatasetId {
        &self.id
    }

    #[must_use]
    pub fn model(&self) -> ModelKind {
        self.model
    }

    #[must_use]
    pub fn timeframe(&self) -> Timeframe {
        self.id.timeframe
    }

    pub fn series(&self) -> &SparseSeries {
        &self.series
    }

    pub(crate) fn series_mut(&mut self) -> &mut SparseSeries {
        &mut self.series
    }

    pub(crate) fn subscribe(&mut self, chart: ChartId, instance: InstanceId) -> bool {
        self.subscribers.entry(chart).or_default().insert(instance)
    }

    pub(crate) fn unsubscribe(&mut self, chart: ChartId, instance: InstanceId) -> bool {
        let Some(instances) = self.subscribers.get_mut(&chart) else {
            return false;
        };
        let removed = instances.remove(&instance);
        if instances.is_empty() {
            self.subscribers.remove(&chart);
        }
        removed
    }

    /// Total number of subscribing instances.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.values().map(BTreeSet::len).sum()
    }

    /// Every `(chart, instance)` pair, ordered by chart then instance.
    pub fn subscribers(&self) -> Vec<(ChartId, InstanceId)> {
        self.subscribers
            .iter()
            .flat_map(|(chart, instances)| instances.iter().map(move |i| (*chart, *i)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_id_display_and_parse() {
        let id = DatasetId::new("BINANCE", "BTCUSDT", Timeframe::MIN1);
        assert_eq!(id.to_string(), "BINANCE:BTCUSDT:60000");
        assert_eq!("BINANCE:BTCUSDT:60000".parse::<DatasetId>().unwrap(), id);
    }

    #[test]
    fn test_dataset_id_name_may_contain_colon() {
        let id: DatasetId = "FX:EUR:USD:3600000".parse().unwrap();
        assert_eq!(id.source, "FX");
        assert_eq!(id.name, "EUR:USD");
        assert_eq!(id.timeframe, Timeframe::HOUR1);
    }

    #[test]
    fn test_dataset_id_rejects_malformed() {
        assert!("BTCUSDT".parse::<DatasetId>().is_err());
        assert!("A:B:zero".parse::<DatasetId>().is_err());
        assert!("A:B:0".parse::<DatasetId>().is_err());
        assert!(":B:60000".parse::<DatasetId>().is_err());
    }

    #[test]
    fn test_subscribers() {
        let mut ds = Dataset::new(
            DatasetId::new("S", "N", Timeframe::MIN1),
            ModelKind::Ohlc,
        );
        assert!(ds.subscribe(ChartId(1), InstanceId(2)));
        assert!(!ds.subscribe(ChartId(1), InstanceId(2)));
        ds.subscribe(ChartId(0), InstanceId(5));
        assert_eq!(ds.subscriber_count(), 2);
        assert_eq!(
            ds.subscribers(),
            vec![(ChartId(0), InstanceId(5)), (ChartId(1), InstanceId(2))]
        );
        assert!(ds.unsubscribe(ChartId(1), InstanceId(2)));
        assert!(!ds.unsubscribe(ChartId(1), InstanceId(2)));
        assert_eq!(ds.subscriber_count(), 1);
    }
}
