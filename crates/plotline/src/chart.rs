//! Chart view state and per-instance computed data.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use plotline_compute::{ComputeJob, ComputeOutput, ComputedSet, Globals};
use plotline_config::ChartConfig;
use plotline_core::{
    ChartId, InstanceId, ModelKind, ScaleType, TimeRange, Timeframe, Timestamp, VisibleRange,
};
use plotline_data::{DatasetId, DatasetUpdate, TimeSeriesStore};
use plotline_render::{axis_width_for, GeneratorInput, InstructionGenerator, InstructionSet};
use serde_json::{Map, Value};

use crate::queue::IndicatorQueue;

/// Fraction of pixels-per-element added or removed per zoom step.
pub const ZOOM_STEP: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Pixel sizes of the plot area and the two axis strips.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Dimensions {
    pub main: Size,
    pub x_axis: Size,
    pub y_axis: Size,
}

impl Dimensions {
    /// Split a `width` x `height` chart into plot area, price axis on the
    /// right and time axis along the bottom.
    pub fn layout(width: f64, height: f64, y_axis_width: f64, x_axis_height: f64) -> Self {
        let main = Size::new((width - y_axis_width).max(0.0), (height - x_axis_height).max(0.0));
        Self {
            main,
            x_axis: Size::new(main.width, x_axis_height),
            y_axis: Size::new(y_axis_width, main.height),
        }
    }

    pub fn width(&self) -> f64 {
        self.main.width + self.y_axis.width
    }

    pub fn height(&self) -> f64 {
        self.main.height + self.x_axis.height
    }
}

/// One chart: a dataset, the indicators drawn over it and the latest
/// instruction set.
pub struct Chart {
    id: ChartId,
    dataset: DatasetId,
    model: ModelKind,
    config: ChartConfig,
    queue: IndicatorQueue,
    sets: HashMap<InstanceId, ComputedSet>,
    globals: HashMap<InstanceId, Globals>,
    range: VisibleRange,
    scale: ScaleType,
    pixels_per_element: f64,
    dimensions: Dimensions,
    autoscale: bool,
    instructions: Arc<InstructionSet>,
    settings_extra: Map<String, Value>,
}

impl Chart {
    pub fn new(
        id: ChartId,
        dataset: DatasetId,
        model: ModelKind,
        config: ChartConfig,
        width: f64,
        height: f64,
    ) -> Self {
        let dimensions = Dimensions::layout(width, height, config.y_axis_width, config.x_axis_height);
        Self {
            id,
            dataset,
            model,
            queue: IndicatorQueue::new(),
            sets: HashMap::new(),
            globals: HashMap::new(),
            range: VisibleRange::default(),
            scale: config.scale,
            pixels_per_element: config.pixels_per_element,
            dimensions,
            autoscale: true,
            instructions: Arc::new(InstructionSet::empty()),
            settings_extra: Map::new(),
            config,
        }
    }

    pub fn id(&self) -> ChartId {
        self.id
    }

    /// The dataset new indicators attach to.
    pub fn dataset(&self) -> &DatasetId {
        &self.dataset
    }

    pub fn model(&self) -> ModelKind {
        self.model
    }

    pub fn timeframe(&self) -> Timeframe {
        self.dataset.timeframe
    }

    pub fn queue(&self) -> &IndicatorQueue {
        &self.queue
    }

    pub(crate) fn queue_mut(&mut self) -> &mut IndicatorQueue {
        &mut self.queue
    }

    pub fn range(&self) -> VisibleRange {
        self.range
    }

    pub fn scale(&self) -> ScaleType {
        self.scale
    }

    pub fn pixels_per_element(&self) -> f64 {
        self.pixels_per_element
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn computed_set(&self, instance: InstanceId) -> Option<&ComputedSet> {
        self.sets.get(&instance)
    }

    /// Most recently generated instructions.
    pub fn instructions(&self) -> Arc<InstructionSet> {
        Arc::clone(&self.instructions)
    }

    pub fn autoscale(&self) -> bool {
        self.autoscale
    }

    pub fn set_autoscale(&mut self, enabled: bool) {
        self.autoscale = enabled;
    }

    pub(crate) fn settings_extra(&self) -> &Map<String, Value> {
        &self.settings_extra
    }

    pub(crate) fn set_settings_extra(&mut self, extra: Map<String, Value>) {
        self.settings_extra = extra;
    }

    /// Every dataset referenced by a queued instance.
    pub fn datasets(&self) -> BTreeSet<DatasetId> {
        self.queue.iter().map(|e| e.dataset.clone()).collect()
    }

    /// Whole elements that fit in the plot area at the current zoom.
    pub fn elements_visible(&self) -> i64 {
        ((self.dimensions.main.width / self.pixels_per_element).floor() as i64).max(1)
    }

    /// Place the right edge a few elements past `anchor` and fill the width
    /// with history.
    pub fn reset_range(&mut self, anchor: Timestamp) {
        let step = self.timeframe().millis();
        let anchor = self.timeframe().align(anchor);
        self.range.end = anchor.saturating_add(self.config.right_margin_elements * step);
        self.fit_to_width();
    }

    /// Replace the visible range. Price bounds are overwritten on the next
    /// render while autoscale is on.
    pub fn set_range(&mut self, mut range: VisibleRange) {
        if range.start > range.end {
            std::mem::swap(&mut range.start, &mut range.end);
        }
        self.range = range;
    }

    /// Scroll by a pixel delta. Positive `dx` drags the content right,
    /// revealing earlier data.
    pub fn pan(&mut self, dx: f64) -> bool {
        let ms_per_pixel = self.timeframe().millis() as f64 / self.pixels_per_element;
        let shift = (dx * ms_per_pixel).round() as i64;
        if shift == 0 {
            return false;
        }
        self.range.start = self.range.start.saturating_sub(shift);
        self.range.end = self.range.end.saturating_sub(shift);
        true
    }

    /// Zoom one step, keeping the right edge fixed.
    pub fn zoom(&mut self, zoom_in: bool) -> bool {
        let factor = if zoom_in { 1.0 + ZOOM_STEP } else { 1.0 - ZOOM_STEP };
        let ppe = (self.pixels_per_element * factor)
            .min(self.config.max_pixels_per_element)
            .max(self.config.min_pixels_per_element);
        if ppe == self.pixels_per_element {
            return false;
        }
        self.pixels_per_element = ppe;
        self.fit_to_width();
        true
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.dimensions =
            Dimensions::layout(width, height, self.dimensions.y_axis.width, self.config.x_axis_height);
        self.fit_to_width();
    }

    pub fn set_scale(&mut self, scale: ScaleType) -> bool {
        let changed = self.scale != scale;
        self.scale = scale;
        changed
    }

    fn fit_to_width(&mut self) {
        let span = self.elements_visible() * self.timeframe().millis();
        self.range.start = self.range.end.saturating_sub(span);
    }

    /// Visible time range plus one element either side, so lines leaving the
    /// plot edges have a neighbour to join.
    pub fn compute_range(&self) -> TimeRange {
        let step = self.timeframe().millis();
        TimeRange::new(
            self.range.start.saturating_sub(step),
            self.range.end.saturating_add(step),
        )
    }

    /// Full rebuild jobs for visible instances, optionally limited to `only`.
    pub fn full_jobs(&self, store: &TimeSeriesStore, only: Option<&[InstanceId]>) -> Vec<ComputeJob> {
        let window = self.compute_range();
        self.queue
            .visible()
            .filter(|entry| only.map_or(true, |ids| ids.contains(&entry.id)))
            .filter_map(|entry| {
                let Some(series) = store.series(&entry.dataset) else {
                    log::debug!("{}: dataset {} not loaded", self.id, entry.dataset);
                    return None;
                };
                Some(ComputeJob::full(
                    entry.id,
                    Arc::clone(&entry.indicator),
                    series,
                    window,
                ))
            })
            .collect()
    }

    /// Jobs patching the instances this update reaches.
    ///
    /// Instances whose drawing cannot change are skipped: a windowed
    /// indicator ignores timestamps outside the compute range, a full-history
    /// one ignores timestamps after it.
    pub fn incremental_jobs(&self, store: &TimeSeriesStore, update: &DatasetUpdate) -> Vec<ComputeJob> {
        let Some(series) = store.series(&update.dataset) else {
            return Vec::new();
        };
        let window = self.compute_range();
        self.queue
            .visible()
            .filter(|entry| update.subscribers.contains(&(self.id, entry.id)))
            .filter(|entry| {
                if entry.indicator.requires_full_history() {
                    update.changed.iter().any(|ts| *ts <= window.end)
                } else {
                    update.changed.iter().any(|ts| window.contains(*ts))
                }
            })
            .map(|entry| {
                let previous = self.sets.get(&entry.id).cloned().unwrap_or_else(ComputedSet::new);
                let globals = self.globals.get(&entry.id).cloned().unwrap_or_default();
                ComputeJob::incremental(
                    entry.id,
                    Arc::clone(&entry.indicator),
                    series,
                    window,
                    &update.changed,
                    previous,
                    globals,
                )
            })
            .collect()
    }

    /// Store job results. A failed job leaves the previous set in place, and
    /// results for instances no longer queued are dropped.
    pub fn apply_outputs(&mut self, outputs: Vec<ComputeOutput>) -> usize {
        let mut applied = 0;
        for output in outputs {
            if !self.queue.contains(output.instance) {
                log::debug!("{}: dropping result for removed {}", self.id, output.instance);
                continue;
            }
            match output.result {
                Ok((set, globals)) => {
                    self.sets.insert(output.instance, set);
                    self.globals.insert(output.instance, globals);
                    applied += 1;
                }
                Err(e) => {
                    log::warn!("{}: keeping last good set for {}: {}", self.id, output.instance, e);
                }
            }
        }
        applied
    }

    pub(crate) fn forget(&mut self, instance: InstanceId) {
        self.sets.remove(&instance);
        self.globals.remove(&instance);
    }

    /// Regenerate instructions, then settle autoscale and the price-axis
    /// width. Each adjustment regenerates at most once.
    pub fn render(&mut self, generator: &InstructionGenerator) -> Arc<InstructionSet> {
        let mut instructions = self.generate(generator);

        if self.autoscale {
            if let Some((min, max)) = instructions.bounds() {
                let (y_min, y_max) = self.autoscaled(min, max);
                if y_min != self.range.y_min || y_max != self.range.y_max {
                    self.range.y_min = y_min;
                    self.range.y_max = y_max;
                    instructions = self.generate(generator);
                }
            }
        }

        if let Some(width) = axis_width_for(
            instructions.max_text_width,
            self.dimensions.y_axis.width,
            self.config.axis_min_width,
            self.config.axis_label_padding,
        ) {
            log::debug!("{}: price axis {} -> {}px", self.id, self.dimensions.y_axis.width, width);
            self.dimensions = Dimensions::layout(
                self.dimensions.width(),
                self.dimensions.height(),
                width,
                self.dimensions.x_axis.height,
            );
            // Keep the zoom level: the range follows the new main width.
            self.fit_to_width();
            instructions = self.generate(generator);
        }

        self.instructions = Arc::new(instructions);
        self.instructions()
    }

    fn generate(&self, generator: &InstructionGenerator) -> InstructionSet {
        let sets = self
            .queue
            .visible()
            .filter_map(|entry| self.sets.get(&entry.id).map(|set| (entry.id, set)))
            .collect();
        generator.generate(&GeneratorInput {
            sets,
            range: self.range,
            scale: self.scale,
            timeframe: self.timeframe(),
            pixels_per_element: self.pixels_per_element,
            width: self.dimensions.main.width,
            height: self.dimensions.main.height,
        })
    }

    fn autoscaled(&self, min: f64, max: f64) -> (f64, f64) {
        let span = max - min;
        let pad = if span > 0.0 {
            span * self.config.autoscale_margin
        } else {
            min.abs().max(1.0) * self.config.autoscale_margin
        };
        (min - pad, max + pad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plotline_core::timeframe::MINUTE_MS;

    fn chart() -> Chart {
        let dataset = DatasetId::new("TEST", "AAA", Timeframe::MIN1);
        Chart::new(ChartId(0), dataset, ModelKind::Ohlc, ChartConfig::default(), 550.0, 320.0)
    }

    #[test]
    fn test_layout() {
        let chart = chart();
        let dims = chart.dimensions();
        assert_eq!(dims.main, Size::new(500.0, 300.0));
        assert_eq!(dims.y_axis, Size::new(50.0, 300.0));
        assert_eq!(dims.x_axis, Size::new(500.0, 20.0));
        assert_eq!(dims.width(), 550.0);
    }

    #[test]
    fn test_reset_range_has_right_margin() {
        let mut chart = chart();
        chart.reset_range(100 * MINUTE_MS + 30_000);
        let range = chart.range();
        assert_eq!(range.end, 105 * MINUTE_MS);
        // 500px at 10px per element.
        assert_eq!(range.span(), 50 * MINUTE_MS);
    }

    #[test]
    fn test_pan_moves_by_pixels() {
        let mut chart = chart();
        chart.reset_range(100 * MINUTE_MS);
        let before = chart.range();
        assert!(chart.pan(20.0));
        assert_eq!(chart.range().end, before.end - 2 * MINUTE_MS);
        assert_eq!(chart.range().span(), before.span());
        assert!(!chart.pan(0.0));
    }

    #[test]
    fn test_zoom_is_clamped() {
        let mut chart = chart();
        chart.reset_range(100 * MINUTE_MS);
        let end = chart.range().end;
        assert!(chart.zoom(true));
        assert!((chart.pixels_per_element() - 12.0).abs() < 1e-9);
        assert_eq!(chart.range().end, end);
        assert_eq!(chart.elements_visible(), 41);

        for _ in 0..100 {
            chart.zoom(false);
        }
        assert_eq!(chart.pixels_per_element(), 1.0);
        assert!(!chart.zoom(false));
    }

    #[test]
    fn test_autoscale_margin() {
        let chart = chart();
        let (lo, hi) = chart.autoscaled(100.0, 200.0);
        assert!((lo - 95.0).abs() < 1e-9);
        assert!((hi - 205.0).abs() < 1e-9);
        let (lo, hi) = chart.autoscaled(50.0, 50.0);
        assert!(lo < 50.0 && hi > 50.0);
    }

    #[test]
    fn test_empty_render_keeps_range() {
        let mut chart = chart();
        chart.reset_range(100 * MINUTE_MS);
        let before = chart.range();
        let instructions = chart.render(&InstructionGenerator::default());
        assert_eq!(instructions.main_len(), 0);
        assert_eq!(chart.range(), before);
    }
}
