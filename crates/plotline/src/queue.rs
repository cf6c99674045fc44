//! Per-chart indicator queue.
//!
//! The queue owns every indicator instance on a chart together with its
//! rendering order. Each id in the order list has exactly one entry and
//! every entry appears exactly once in the order.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use plotline_compute::Indicator;
use plotline_core::InstanceId;
use plotline_data::DatasetId;
use serde_json::{Map, Value};

/// One queued indicator instance.
#[derive(Clone)]
pub struct QueueEntry {
    pub id: InstanceId,
    pub indicator: Arc<dyn Indicator>,
    pub dataset: DatasetId,
    pub visible: bool,
    /// Unrecognised settings fields, kept so they survive a save.
    pub extra: Map<String, Value>,
}

impl fmt::Debug for QueueEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueEntry")
            .field("id", &self.id)
            .field("indicator", &self.indicator.id())
            .field("dataset", &self.dataset)
            .field("visible", &self.visible)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct IndicatorQueue {
    entries: HashMap<InstanceId, QueueEntry>,
    order: Vec<InstanceId>,
}

impl IndicatorQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn get(&self, id: InstanceId) -> Option<&QueueEntry> {
        self.entries.get(&id)
    }

    /// Rendering order, back to front.
    pub fn order(&self) -> &[InstanceId] {
        &self.order
    }

    /// Entries in rendering order.
    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> + '_ {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    /// Visible entries in rendering order.
    pub fn visible(&self) -> impl Iterator<Item = &QueueEntry> + '_ {
        self.iter().filter(|e| e.visible)
    }

    /// Add an instance at `index` in the rendering order, or at the end.
    ///
    /// Indexes past the end append. Returns `false` if `id` is already queued.
    pub fn insert(
        &mut self,
        id: InstanceId,
        indicator: Arc<dyn Indicator>,
        dataset: DatasetId,
        index: Option<usize>,
    ) -> bool {
        if self.entries.contains_key(&id) {
            return false;
        }
        let entry = QueueEntry {
            id,
            indicator,
            dataset,
            visible: true,
            extra: Map::new(),
        };
        self.entries.insert(id, entry);
        let at = index.unwrap_or(self.order.len()).min(self.order.len());
        self.order.insert(at, id);
        true
    }

    /// Remove an instance from both the entries and the order.
    pub fn remove(&mut self, id: InstanceId) -> Option<QueueEntry> {
        let entry = self.entries.remove(&id)?;
        self.order.retain(|other| *other != id);
        Some(entry)
    }

    pub fn set_visible(&mut self, id: InstanceId, visible: bool) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) => {
                entry.visible = visible;
                true
            }
            None => false,
        }
    }

    /// Flip visibility, returning the new state.
    pub fn toggle(&mut self, id: InstanceId) -> Option<bool> {
        let entry = self.entries.get_mut(&id)?;
        entry.visible = !entry.visible;
        Some(entry.visible)
    }

    /// Move an instance to `index` in the rendering order.
    pub fn move_to(&mut self, id: InstanceId, index: usize) -> bool {
        let Some(from) = self.order.iter().position(|other| *other == id) else {
            return false;
        };
        self.order.remove(from);
        let at = index.min(self.order.len());
        self.order.insert(at, id);
        true
    }

    pub(crate) fn entry_mut(&mut self, id: InstanceId) -> Option<&mut QueueEntry> {
        self.entries.get_mut(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plotline_compute::{Candlestick, PriceLine};
    use plotline_core::Timeframe;

    fn dataset() -> DatasetId {
        DatasetId::new("TEST", "AAA", Timeframe::MIN1)
    }

    fn push(queue: &mut IndicatorQueue, id: u64, indicator: Arc<dyn Indicator>, index: Option<usize>) -> InstanceId {
        let id = InstanceId(id);
        assert!(queue.insert(id, indicator, dataset(), index));
        id
    }

    fn assert_bijection(queue: &IndicatorQueue) {
        assert_eq!(queue.order().len(), queue.entries.len());
        for id in queue.order() {
            assert!(queue.contains(*id));
        }
        let mut ids = queue.order().to_vec();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), queue.len());
    }

    #[test]
    fn test_insert_at_index() {
        let mut queue = IndicatorQueue::new();
        let a = push(&mut queue, 1, Arc::new(Candlestick::default()), None);
        let b = push(&mut queue, 2, Arc::new(PriceLine::default()), None);
        let c = push(&mut queue, 3, Arc::new(PriceLine::default()), Some(0));
        let d = push(&mut queue, 4, Arc::new(PriceLine::default()), Some(99));
        assert_eq!(queue.order(), &[c, a, b, d]);
        assert!(!queue.insert(a, Arc::new(PriceLine::default()), dataset(), None));
        assert_bijection(&queue);
    }

    #[test]
    fn test_remove_keeps_bijection() {
        let mut queue = IndicatorQueue::new();
        let a = push(&mut queue, 1, Arc::new(Candlestick::default()), None);
        let b = push(&mut queue, 2, Arc::new(PriceLine::default()), None);
        assert!(queue.remove(a).is_some());
        assert!(queue.remove(a).is_none());
        assert_eq!(queue.order(), &[b]);
        assert_bijection(&queue);
    }

    #[test]
    fn test_toggle_and_move() {
        let mut queue = IndicatorQueue::new();
        let a = push(&mut queue, 1, Arc::new(Candlestick::default()), None);
        let b = push(&mut queue, 2, Arc::new(PriceLine::default()), None);
        assert_eq!(queue.toggle(a), Some(false));
        assert_eq!(queue.visible().map(|e| e.id).collect::<Vec<_>>(), vec![b]);
        assert_eq!(queue.toggle(InstanceId(42)), None);

        assert!(queue.move_to(b, 0));
        assert_eq!(queue.order(), &[b, a]);
        assert!(!queue.move_to(InstanceId(42), 0));
        assert_bijection(&queue);
    }
}
