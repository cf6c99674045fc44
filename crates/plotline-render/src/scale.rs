//! Scale-mode transforms applied to a copy of the visible ops.

use std::collections::BTreeMap;

use plotline_compute::{ComputedSet, PlotOp};
use plotline_core::{ScaleType, Timestamp};

/// Ops of one set inside a window, copied out of the stored set.
pub type Window = BTreeMap<Timestamp, Vec<PlotOp>>;

/// Transform `window` in place for `scale`.
///
/// `baseline` is the timestamp whose ops anchor percent mode (the first
/// visible timestamp with data). Each series index is measured against the
/// same index of the baseline op; an index whose baseline is zero reads 0.
/// Ops with no baseline op of the same kind are dropped. Normalized mode
/// uses the whole set's bounds, so results stay in `0..=100`.
pub fn apply_scale(window: &mut Window, set: &ComputedSet, scale: ScaleType, baseline: Option<Timestamp>) {
    match scale {
        ScaleType::Default => {}
        ScaleType::Percent => {
            let base: Vec<PlotOp> = baseline
                .and_then(|ts| window.get(&ts))
                .cloned()
                .unwrap_or_default();
            for ops in window.values_mut() {
                *ops = ops
                    .iter()
                    .enumerate()
                    .filter_map(|(j, op)| percent_op(op, base.get(j)))
                    .collect();
            }
            window.retain(|_, ops| !ops.is_empty());
        }
        ScaleType::Normalized => {
            let (min, max) = (set.min(), set.max());
            let span = max - min;
            for ops in window.values_mut() {
                for op in ops.iter_mut() {
                    *op = op.map_values(|_, v| {
                        if span > 0.0 && span.is_finite() {
                            ((v - min) / span * 100.0).clamp(0.0, 100.0)
                        } else {
                            0.0
                        }
                    });
                }
            }
        }
    }
}

fn percent_op(op: &PlotOp, base: Option<&PlotOp>) -> Option<PlotOp> {
    let base = base?;
    if std::mem::discriminant(op) != std::mem::discriminant(base) {
        return None;
    }
    let base_values = base.series();
    Some(op.map_values(|k, v| match base_values.get(k) {
        Some(&v0) if v0 != 0.0 => (v - v0) / v0 * 100.0,
        _ => 0.0,
    }))
}
