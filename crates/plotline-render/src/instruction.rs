//! Screen-space draw instructions.

use std::collections::BTreeMap;

use plotline_core::{Color, InstanceId, Timestamp};
use serde::Serialize;

/// One screen-space primitive for the renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Instruction {
    Line {
        x: f64,
        y: f64,
        x2: f64,
        y2: f64,
        color: Color,
        line_width: f64,
    },
    Box {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        color: Color,
    },
    /// A hairline, used for candle wicks.
    SingleLine {
        x: f64,
        y: f64,
        x2: f64,
        y2: f64,
        color: Color,
    },
    Text {
        x: f64,
        y: f64,
        text: String,
        color: Color,
        font: String,
    },
}

/// Synthetic key of an axis-label instruction, assigned in generation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct AxisLabelId(pub u32);

/// Complete output of one generation pass. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstructionSet {
    /// Smallest transformed value in the visible window, `+inf` if none.
    pub min: f64,
    /// Largest transformed value in the visible window, `-inf` if none.
    pub max: f64,
    /// Widest axis label text, in pixels.
    pub max_text_width: f64,
    /// Rendering order of instances.
    pub order: Vec<InstanceId>,
    pub main: BTreeMap<InstanceId, BTreeMap<Timestamp, Vec<Instruction>>>,
    pub axis: BTreeMap<AxisLabelId, Instruction>,
}

impl InstructionSet {
    pub fn empty() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            max_text_width: 0.0,
            order: Vec::new(),
            main: BTreeMap::new(),
            axis: BTreeMap::new(),
        }
    }

    /// `(min, max)` if any value was visible.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        (self.min.is_finite() && self.max.is_finite()).then_some((self.min, self.max))
    }

    /// Total main-area instructions.
    pub fn main_len(&self) -> usize {
        self.main
            .values()
            .flat_map(BTreeMap::values)
            .map(Vec::len)
            .sum()
    }

    /// Main instructions in rendering order: instance order, then time.
    pub fn iter_main(&self) -> impl Iterator<Item = (InstanceId, Timestamp, &Instruction)> + '_ {
        self.order.iter().flat_map(move |id| {
            self.main.get(id).into_iter().flat_map(move |by_time| {
                by_time
                    .iter()
                    .flat_map(move |(ts, list)| list.iter().map(move |ins| (*id, *ts, ins)))
            })
        })
    }
}

impl Default for InstructionSet {
    fn default() -> Self {
        Self::empty()
    }
}
