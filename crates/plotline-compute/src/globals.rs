//! Per-instance scratch state that persists across bars.

use std::collections::{HashMap, VecDeque};

/// Named values and rolling buffers an indicator keeps between bars.
///
/// Lives for one full computation. A full rebuild starts from an empty
/// `Globals`; an incremental update continues with the previous one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Globals {
    values: HashMap<String, f64>,
    buffers: HashMap<String, VecDeque<f64>>,
}

impl Globals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.buffers.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn get_or(&self, name: &str, default: f64) -> f64 {
        self.get(name).unwrap_or(default)
    }

    pub fn set(&mut self, name: &str, value: f64) {
        self.values.insert(name.to_string(), value);
    }

    /// Add `delta` to a value (starting from zero) and return the new total.
    pub fn accumulate(&mut self, name: &str, delta: f64) -> f64 {
        let v = self.values.entry(name.to_string()).or_insert(0.0);
        *v += delta;
        *v
    }

    /// Push onto a rolling buffer holding at most `capacity` values.
    pub fn push(&mut self, name: &str, value: f64, capacity: usize) -> &VecDeque<f64> {
        let buf = self.buffers.entry(name.to_string()).or_default();
        buf.push_back(value);
        while buf.len() > capacity.max(1) {
            buf.pop_front();
        }
        buf
    }

    pub fn buffer(&self, name: &str) -> Option<&VecDeque<f64>> {
        self.buffers.get(name)
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.buffers.clear();
    }
}
