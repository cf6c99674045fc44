//! Turns computed sets into screen-space instruction sets.
//!
//! Generation is a pure function of its input: the same sets, range, scale
//! and geometry always yield an identical [`InstructionSet`].

use std::collections::BTreeMap;

use plotline_compute::{ComputedSet, PlotOp};
use plotline_core::{Color, InstanceId, ScaleType, TimeRange, Timeframe, Timestamp, VisibleRange};
use rayon::prelude::*;

use crate::axis::{format_label, MonospaceMetrics, TextMetrics, LABEL_FONT, LABEL_HEIGHT, LABEL_PADDING};
use crate::instruction::{AxisLabelId, Instruction, InstructionSet};
use crate::scale::{apply_scale, Window};
use crate::viewport::Viewport;

/// Candle body width as a fraction of one bar.
pub const CANDLE_BODY_RATIO: f64 = 0.9;

/// Inputs of one generation pass.
#[derive(Debug, Clone)]
pub struct GeneratorInput<'a> {
    /// Visible instances in rendering order.
    pub sets: Vec<(InstanceId, &'a ComputedSet)>,
    pub range: VisibleRange,
    pub scale: ScaleType,
    pub timeframe: Timeframe,
    pub pixels_per_element: f64,
    /// Main area size in pixels.
    pub width: f64,
    pub height: f64,
}

/// Per-instance output before axis ids are assigned.
struct InstanceOutput {
    instructions: BTreeMap<Timestamp, Vec<Instruction>>,
    bounds: Option<(f64, f64)>,
    labels: Vec<(f64, Color)>,
    decimal_places: u32,
}

/// Builds instruction sets. Holds the text metrics used for axis labels.
pub struct InstructionGenerator {
    metrics: Box<dyn TextMetrics>,
    font: String,
}

impl InstructionGenerator {
    pub fn new(metrics: Box<dyn TextMetrics>) -> Self {
        Self {
            metrics,
            font: LABEL_FONT.to_string(),
        }
    }

    pub fn with_font(mut self, font: impl Into<String>) -> Self {
        self.font = font.into();
        self
    }

    /// Generate the full instruction set for `input`.
    pub fn generate(&self, input: &GeneratorInput<'_>) -> InstructionSet {
        let viewport = Viewport::new(input.range, input.width, input.height);

        let outputs: Vec<InstanceOutput> = input
            .sets
            .par_iter()
            .map(|(_, set)| generate_instance(set, input, &viewport))
            .collect();

        let mut result = InstructionSet::empty();
        let mut next_label = 0u32;
        for ((id, _), output) in input.sets.iter().zip(outputs) {
            result.order.push(*id);
            if let Some((lo, hi)) = output.bounds {
                result.min = result.min.min(lo);
                result.max = result.max.max(hi);
            }
            for (value, background) in output.labels {
                let text = format_label(value, input.scale, output.decimal_places);
                let text_width = self.metrics.text_width(&text, &self.font);
                result.max_text_width = result.max_text_width.max(text_width);
                let y = viewport.y(value);
                result.axis.insert(
                    AxisLabelId(next_label),
                    Instruction::Box {
                        x: 0.0,
                        y: y - LABEL_HEIGHT / 2.0,
                        w: text_width + LABEL_PADDING,
                        h: LABEL_HEIGHT,
                        color: background,
                    },
                );
                result.axis.insert(
                    AxisLabelId(next_label + 1),
                    Instruction::Text {
                        x: LABEL_PADDING / 2.0,
                        y,
                        text,
                        color: background.contrasting_text(),
                        font: self.font.clone(),
                    },
                );
                next_label += 2;
            }
            result.main.insert(*id, output.instructions);
        }
        result
    }
}

impl Default for InstructionGenerator {
    fn default() -> Self {
        Self::new(Box::new(MonospaceMetrics::default()))
    }
}

fn generate_instance(set: &ComputedSet, input: &GeneratorInput<'_>, viewport: &Viewport) -> InstanceOutput {
    let range = input.range;
    let step = input.timeframe.millis();
    let visible = TimeRange::new(range.start, range.end);

    // One bar of margin either side so lines run off the edges.
    let padded = TimeRange::new(range.start.saturating_sub(step), range.end.saturating_add(step));
    let mut window: Window = set.range(padded).map(|(ts, ops)| (ts, ops.to_vec())).collect();
    let baseline = window.range(visible.start..=visible.end).next().map(|(ts, _)| *ts);
    apply_scale(&mut window, set, input.scale, baseline);

    let mut bounds: Option<(f64, f64)> = None;
    for v in window
        .range(visible.start..=visible.end)
        .flat_map(|(_, ops)| ops.iter())
        .flat_map(PlotOp::series)
    {
        bounds = Some(match bounds {
            Some((lo, hi)) => (lo.min(v), hi.max(v)),
            None => (v, v),
        });
    }

    let mut instructions: BTreeMap<Timestamp, Vec<Instruction>> = BTreeMap::new();
    for (ts, ops) in &window {
        let x = viewport.x(*ts);
        let next = window.get(&(ts + step));
        let mut out = Vec::with_capacity(ops.len() * 2);
        for (j, op) in ops.iter().enumerate() {
            expand(op, x, viewport, input.pixels_per_element, next.and_then(|n| n.get(j)), ts + step, &mut out);
        }
        if !out.is_empty() {
            instructions.insert(*ts, out);
        }
    }

    let labels = window
        .range(visible.start..=visible.end)
        .next_back()
        .map(|(_, ops)| {
            ops.iter()
                .filter_map(|op| op.label_value().map(|v| (v, op.color())))
                .collect()
        })
        .unwrap_or_default();

    InstanceOutput {
        instructions,
        bounds,
        labels,
        decimal_places: set.decimal_places(),
    }
}

/// Expand one plot op into screen primitives.
///
/// A line joins to the op at the same index on the next bar only if that op
/// is also a line; otherwise the line breaks.
fn expand(
    op: &PlotOp,
    x: f64,
    viewport: &Viewport,
    ppe: f64,
    next: Option<&PlotOp>,
    next_ts: Timestamp,
    out: &mut Vec<Instruction>,
) {
    match *op {
        PlotOp::Line {
            value,
            color,
            line_width,
            ..
        } => {
            if let Some(PlotOp::Line { value: next_value, .. }) = next {
                out.push(Instruction::Line {
                    x,
                    y: viewport.y(value),
                    x2: viewport.x(next_ts),
                    y2: viewport.y(*next_value),
                    color,
                    line_width,
                });
            }
        }
        PlotOp::Box {
            open,
            close,
            width,
            color,
            ..
        } => {
            let w = ppe * width;
            out.push(body(x, w, viewport.y(open), viewport.y(close), color));
        }
        PlotOp::Candle {
            open,
            high,
            low,
            close,
            color,
            wick_color,
            ..
        } => {
            let w = ppe * CANDLE_BODY_RATIO;
            out.push(body(x, w, viewport.y(open), viewport.y(close), color));
            out.push(Instruction::SingleLine {
                x,
                y: viewport.y(high),
                x2: x,
                y2: viewport.y(low),
                color: wick_color,
            });
        }
    }
}

/// A box centered on `x` spanning two screen ys.
fn body(x: f64, w: f64, y_a: f64, y_b: f64, color: Color) -> Instruction {
    Instruction::Box {
        x: x - w / 2.0,
        y: y_a.min(y_b),
        w,
        h: (y_a - y_b).abs(),
        color,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plotline_compute::Plotter;

    const M: i64 = 60_000;

    fn line_set(values: &[(Timestamp, f64)], labeled: bool) -> ComputedSet {
        let mut set = ComputedSet::new();
        for (ts, v) in values {
            let mut plot = Plotter::new(*ts, &mut set);
            if labeled {
                plot.plot_line_labeled(*v, Color::BLUE, 1.0);
            } else {
                plot.plot_line(*v, Color::BLUE, 1.0);
            }
        }
        set
    }

    fn input<'a>(sets: Vec<(InstanceId, &'a ComputedSet)>, scale: ScaleType, y: (f64, f64)) -> GeneratorInput<'a> {
        GeneratorInput {
            sets,
            range: VisibleRange::new(0, 4 * M, y.0, y.1),
            scale,
            timeframe: Timeframe::MIN1,
            pixels_per_element: 10.0,
            width: 400.0,
            height: 200.0,
        }
    }

    #[test]
    fn test_line_breaks_on_gap() {
        let set = line_set(&[(0, 1.0), (M, 2.0), (3 * M, 3.0), (4 * M, 4.0)], false);
        let out = InstructionGenerator::default().generate(&input(
            vec![(InstanceId(1), &set)],
            ScaleType::Default,
            (0.0, 4.0),
        ));
        let main = &out.main[&InstanceId(1)];
        assert_eq!(main.keys().copied().collect::<Vec<_>>(), vec![0, 3 * M]);
        assert_eq!(
            main[&0][0],
            Instruction::Line {
                x: 0.0,
                y: 150.0,
                x2: 100.0,
                y2: 100.0,
                color: Color::BLUE,
                line_width: 1.0,
            }
        );
    }

    #[test]
    fn test_candle_expands_to_body_and_wick() {
        let mut set = ComputedSet::new();
        Plotter::new(2 * M, &mut set).plot_candle(2.0, 4.0, 0.0, 3.0, Color::GREEN, Color::WHITE);
        let out = InstructionGenerator::default().generate(&input(
            vec![(InstanceId(1), &set)],
            ScaleType::Default,
            (0.0, 4.0),
        ));
        let ins = &out.main[&InstanceId(1)][&(2 * M)];
        assert_eq!(ins.len(), 2);
        assert_eq!(
            ins[0],
            Instruction::Box {
                x: 195.5,
                y: 50.0,
                w: 9.0,
                h: 50.0,
                color: Color::GREEN
            }
        );
        assert_eq!(
            ins[1],
            Instruction::SingleLine {
                x: 200.0,
                y: 0.0,
                x2: 200.0,
                y2: 200.0,
                color: Color::WHITE
            }
        );
        assert_eq!(out.bounds(), Some((0.0, 4.0)));
    }

    #[test]
    fn test_box_width_scales_with_ppe() {
        let mut set = ComputedSet::new();
        Plotter::new(M, &mut set).plot_box(0.0, 2.0, 0.0, 2.0, 0.5, Color::RED);
        let out = InstructionGenerator::default().generate(&input(
            vec![(InstanceId(1), &set)],
            ScaleType::Default,
            (0.0, 4.0),
        ));
        match &out.main[&InstanceId(1)][&M][0] {
            Instruction::Box { w, h, .. } => {
                assert_eq!(*w, 5.0);
                assert_eq!(*h, 100.0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_axis_label_for_latest_visible_only() {
        let set = line_set(&[(0, 1.0), (M, 2.5), (9 * M, 7.0)], true);
        let out = InstructionGenerator::default().generate(&input(
            vec![(InstanceId(1), &set)],
            ScaleType::Default,
            (0.0, 4.0),
        ));
        assert_eq!(out.axis.len(), 2);
        match &out.axis[&AxisLabelId(1)] {
            Instruction::Text { text, color, y, .. } => {
                assert_eq!(text, "2.5");
                assert_eq!(*color, Color::WHITE);
                assert_eq!(*y, 75.0);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(out.max_text_width, 18.0);
        match &out.axis[&AxisLabelId(0)] {
            Instruction::Box { y, w, h, .. } => {
                assert_eq!((*y, *w, *h), (65.0, 30.0, 20.0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_percent_mode_values() {
        let set = line_set(&[(0, 10.0), (M, 12.0), (2 * M, 9.0)], true);
        let out = InstructionGenerator::default().generate(&input(
            vec![(InstanceId(1), &set)],
            ScaleType::Percent,
            (-10.0, 20.0),
        ));
        let (lo, hi) = out.bounds().unwrap();
        assert!((lo + 10.0).abs() < 1e-9);
        assert!((hi - 20.0).abs() < 1e-9);
        match &out.axis[&AxisLabelId(1)] {
            Instruction::Text { text, .. } => assert_eq!(text, "-10.00%"),
            other => panic!("unexpected {other:?}"),
        }
    }

    /// A candle set, a zero-based box set and a line set over 0..=4M.
    fn mixed_sets() -> [ComputedSet; 3] {
        let (mut candles, mut boxes, mut lines) = (ComputedSet::new(), ComputedSet::new(), ComputedSet::new());
        for i in 0..5 {
            let ts = i * M;
            let f = i as f64;
            Plotter::new(ts, &mut candles).plot_candle_labeled(
                10.0 + f,
                12.0 + f * 1.5,
                9.0 + f * 0.5,
                11.0 + f,
                Color::GREEN,
                Color::GREEN,
            );
            Plotter::new(ts, &mut boxes).plot_box(0.0, 100.0 + 10.0 * f, 0.0, 100.0 + 10.0 * f, 0.8, Color::GRAY);
            Plotter::new(ts, &mut lines).plot_line_labeled(20.0 - f, Color::BLUE, 1.0);
        }
        [candles, boxes, lines]
    }

    /// Screen ys touched by an instruction.
    fn ys(ins: &Instruction) -> Vec<f64> {
        match ins {
            Instruction::Line { y, y2, .. } | Instruction::SingleLine { y, y2, .. } => vec![*y, *y2],
            Instruction::Box { y, h, .. } => vec![*y, y + h],
            Instruction::Text { y, .. } => vec![*y],
        }
    }

    #[test]
    fn test_percent_mixed_kinds_start_at_zero() {
        let sets = mixed_sets();
        let ids = [InstanceId(1), InstanceId(2), InstanceId(3)];
        let out = InstructionGenerator::default().generate(&input(
            ids.iter().copied().zip(sets.iter()).collect(),
            ScaleType::Percent,
            (-50.0, 50.0),
        ));
        // y of 0% on a 200px area spanning -50..50.
        let zero_y = 100.0;
        for id in ids {
            let by_time = &out.main[&id];
            assert_eq!(by_time.len(), if id == InstanceId(3) { 4 } else { 5 });
            for ins in &by_time[&0] {
                let anchored = match ins {
                    // A line starts at the first bar and ends at the next.
                    Instruction::Line { y, .. } => vec![*y],
                    other => ys(other),
                };
                for y in anchored {
                    assert!((y - zero_y).abs() < 1e-9, "{id}: {ins:?}");
                }
            }
        }
        let (lo, hi) = out.bounds().unwrap();
        assert!(lo < 0.0 && hi > 0.0);
        // The zero-floored box grows 40%: top at y(40), bottom still at y(0).
        match &out.main[&InstanceId(2)][&(4 * M)][0] {
            Instruction::Box { y, h, .. } => {
                assert!((y - 20.0).abs() < 1e-9);
                assert!((h - 80.0).abs() < 1e-9);
            }
            other => panic!("expected a box, got {other:?}"),
        }
    }

    #[test]
    fn test_normalized_mixed_kinds_stay_in_range() {
        let sets = mixed_sets();
        let out = InstructionGenerator::default().generate(&input(
            (1..).map(InstanceId).zip(sets.iter()).collect(),
            ScaleType::Normalized,
            (0.0, 100.0),
        ));
        assert_eq!(out.bounds(), Some((0.0, 100.0)));
        assert_eq!(out.main_len(), 5 * 2 + 5 + 4);
        for (_, _, ins) in out.iter_main() {
            for y in ys(ins) {
                assert!((-1e-9..=200.0 + 1e-9).contains(&y), "{ins:?}");
            }
        }
    }

    #[test]
    fn test_empty_input() {
        let out = InstructionGenerator::default().generate(&input(Vec::new(), ScaleType::Default, (0.0, 1.0)));
        assert!(out.bounds().is_none());
        assert!(out.main.is_empty());
        assert_eq!(out.max_text_width, 0.0);
    }

    #[test]
    fn test_order_follows_input() {
        let a = line_set(&[(0, 1.0)], false);
        let b = line_set(&[(0, 2.0)], false);
        let out = InstructionGenerator::default().generate(&input(
            vec![(InstanceId(5), &a), (InstanceId(2), &b)],
            ScaleType::Default,
            (0.0, 4.0),
        ));
        assert_eq!(out.order, vec![InstanceId(5), InstanceId(2)]);
    }
}
