//! Pipeline glue: charts, the shared series store, fetch coalescing and
//! indicator computation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::Result as AnyResult;
use plotline_compute::{IndicatorRegistry, IndicatorRuntime};
use plotline_config::Config;
use plotline_core::{
    Candle, ChartId, InstanceId, ModelKind, ScaleType, Timeframe, Timestamp, VisibleRange,
};
use plotline_data::{
    Clock, DatasetId, DatasetUpdate, FetchBatch, FetchReport, FetchResponse, RequestCoalescer,
    SystemClock, TimeSeriesStore,
};
use plotline_render::{InstructionGenerator, InstructionSet};

use crate::chart::Chart;
use crate::settings::{ChartSettings, IndicatorSettings};
use crate::WorkspaceError;

/// Owns every chart and the data they share.
///
/// All mutation goes through `&mut self`; callers sharing a workspace across
/// tasks wrap it in a lock (see [`crate::fetch::SharedWorkspace`]).
pub struct Workspace {
    config: Config,
    store: TimeSeriesStore,
    charts: BTreeMap<ChartId, Chart>,
    registry: IndicatorRegistry,
    coalescer: RequestCoalescer,
    runtime: IndicatorRuntime,
    generator: InstructionGenerator,
    next_chart: u64,
    next_instance: u64,
}

impl Workspace {
    pub fn new(config: Config) -> Result<Self, WorkspaceError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Self, WorkspaceError> {
        let runtime = IndicatorRuntime::with_pool(config.workers.resolved_pool_size())?;
        log::info!(
            "Workspace ready ({} indicator worker(s), fetch tick {}ms)",
            runtime.pool_size(),
            config.fetch.tick_ms
        );
        Ok(Self {
            store: TimeSeriesStore::with_clock(clock),
            charts: BTreeMap::new(),
            registry: IndicatorRegistry::with_config(&config.indicators),
            coalescer: RequestCoalescer::new(config.fetch.clone()),
            runtime,
            generator: InstructionGenerator::default(),
            next_chart: 0,
            next_instance: 0,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &TimeSeriesStore {
        &self.store
    }

    pub fn registry(&self) -> &IndicatorRegistry {
        &self.registry
    }

    /// Register custom indicators here before adding them to charts.
    pub fn registry_mut(&mut self) -> &mut IndicatorRegistry {
        &mut self.registry
    }

    pub fn coalescer(&self) -> &RequestCoalescer {
        &self.coalescer
    }

    pub fn worker_count(&self) -> usize {
        self.runtime.pool_size()
    }

    pub fn chart(&self, id: ChartId) -> Option<&Chart> {
        self.charts.get(&id)
    }

    pub fn chart_ids(&self) -> Vec<ChartId> {
        self.charts.keys().copied().collect()
    }

    /// Latest instructions for a chart.
    pub fn snapshot(&self, id: ChartId) -> Option<Arc<InstructionSet>> {
        self.charts.get(&id).map(Chart::instructions)
    }

    // ---- charts ----

    pub fn create_chart(
        &mut self,
        source: &str,
        name: &str,
        timeframe: Timeframe,
        model: ModelKind,
        width: f64,
        height: f64,
    ) -> ChartId {
        let id = ChartId(self.next_chart);
        self.next_chart += 1;
        let dataset = DatasetId::new(source, name, timeframe);
        let anchor = self
            .store
            .series(&dataset)
            .and_then(|s| s.last_ready())
            .unwrap_or_else(|| self.store.now());
        let mut chart = Chart::new(id, dataset, model, self.config.chart.clone(), width, height);
        chart.reset_range(anchor);
        log::info!("Created {} for {}", id, chart.dataset());
        self.charts.insert(id, chart);
        id
    }

    /// Remove a chart and release its dataset subscriptions.
    pub fn remove_chart(&mut self, id: ChartId) -> bool {
        let Some(chart) = self.charts.remove(&id) else {
            log::debug!("remove_chart: {} already gone", id);
            return false;
        };
        for entry in chart.queue().iter() {
            self.store.remove_subscriber(&entry.dataset, id, entry.id);
        }
        log::info!("Removed {}", id);
        true
    }

    /// Add the configured default indicators that fit the chart's data.
    pub fn add_default_indicators(&mut self, chart: ChartId) -> Result<Vec<InstanceId>, WorkspaceError> {
        let model = self
            .charts
            .get(&chart)
            .map(Chart::model)
            .ok_or(WorkspaceError::UnknownChart(chart))?;
        let defaults = self.config.indicators.default_indicators.clone();
        let mut added = Vec::new();
        for id in defaults {
            match self.registry.resolve(&id, model) {
                Ok(_) => added.push(self.insert_instance(chart, &id, None)?),
                Err(e) => log::warn!("Skipping default indicator {}: {}", id, e),
            }
        }
        self.refresh(chart);
        Ok(added)
    }

    // ---- indicators ----

    /// Queue an indicator on a chart at `index` (or on top) and compute it.
    pub fn add_indicator(
        &mut self,
        chart: ChartId,
        indicator: &str,
        index: Option<usize>,
    ) -> Result<InstanceId, WorkspaceError> {
        let instance = self.insert_instance(chart, indicator, index)?;
        self.recompute(chart, Some(&[instance]));
        self.request_visible(chart);
        self.render(chart);
        Ok(instance)
    }

    fn insert_instance(
        &mut self,
        chart_id: ChartId,
        indicator: &str,
        index: Option<usize>,
    ) -> Result<InstanceId, WorkspaceError> {
        let chart = self
            .charts
            .get_mut(&chart_id)
            .ok_or(WorkspaceError::UnknownChart(chart_id))?;
        let definition = self.registry.resolve(indicator, chart.model())?;
        let target = chart.dataset().clone();
        let dataset =
            self.store
                .add_or_get_dataset(&target.source, &target.name, target.timeframe, chart.model());
        let instance = InstanceId(self.next_instance);
        self.next_instance += 1;
        self.store.add_subscriber(&dataset, chart_id, instance)?;
        chart.queue_mut().insert(instance, definition, dataset, index);
        log::info!("{}: added {} as {}", chart_id, indicator, instance);
        Ok(instance)
    }

    /// Remove an instance. Unknown charts or instances are a no-op.
    pub fn remove_indicator(&mut self, chart: ChartId, instance: InstanceId) -> bool {
        if !self.detach_instance(chart, instance) {
            return false;
        }
        self.render(chart);
        true
    }

    fn detach_instance(&mut self, chart_id: ChartId, instance: InstanceId) -> bool {
        let Some(chart) = self.charts.get_mut(&chart_id) else {
            log::debug!("remove_indicator: {} already gone", chart_id);
            return false;
        };
        let Some(entry) = chart.queue_mut().remove(instance) else {
            log::debug!("remove_indicator: {} not queued on {}", instance, chart_id);
            return false;
        };
        chart.forget(instance);
        self.store.remove_subscriber(&entry.dataset, chart_id, instance);
        true
    }

    /// Flip an instance's visibility, returning the new state.
    pub fn toggle_indicator(&mut self, chart: ChartId, instance: InstanceId) -> Option<bool> {
        let visible = self.charts.get_mut(&chart)?.queue_mut().toggle(instance)?;
        if visible {
            self.recompute(chart, Some(&[instance]));
        }
        self.render(chart);
        Some(visible)
    }

    /// Move an instance within the rendering order.
    pub fn move_indicator(&mut self, chart: ChartId, instance: InstanceId, index: usize) -> bool {
        let moved = self
            .charts
            .get_mut(&chart)
            .is_some_and(|c| c.queue_mut().move_to(instance, index));
        if moved {
            self.render(chart);
        }
        moved
    }

    // ---- view ----

    pub fn set_visible_range(&mut self, chart: ChartId, range: VisibleRange) -> bool {
        self.with_view(chart, |c| {
            c.set_range(range);
            true
        })
    }

    /// Jump so `anchor` sits at the right edge, past the usual margin.
    pub fn scroll_to(&mut self, chart: ChartId, anchor: Timestamp) -> bool {
        self.with_view(chart, |c| {
            c.reset_range(anchor);
            true
        })
    }

    pub fn pan(&mut self, chart: ChartId, dx: f64) -> bool {
        self.with_view(chart, |c| c.pan(dx))
    }

    pub fn zoom(&mut self, chart: ChartId, zoom_in: bool) -> bool {
        self.with_view(chart, |c| c.zoom(zoom_in))
    }

    pub fn resize(&mut self, chart: ChartId, width: f64, height: f64) -> bool {
        self.with_view(chart, |c| {
            c.resize(width, height);
            true
        })
    }

    /// Change the scale mode. Computed sets hold raw values, so only the
    /// instructions are regenerated.
    pub fn set_scale(&mut self, chart: ChartId, scale: ScaleType) -> bool {
        let changed = self
            .charts
            .get_mut(&chart)
            .is_some_and(|c| c.set_scale(scale));
        if changed {
            self.render(chart);
        }
        changed
    }

    fn with_view<F>(&mut self, chart: ChartId, change: F) -> bool
    where
        F: FnOnce(&mut Chart) -> bool,
    {
        let Some(c) = self.charts.get_mut(&chart) else {
            log::debug!("view change for unknown {}", chart);
            return false;
        };
        if !change(c) {
            return false;
        }
        self.refresh(chart);
        true
    }

    // ---- data ----

    /// Merge points into a dataset and patch every subscribing chart.
    ///
    /// Returns the number of charts redrawn. Updates for removed datasets
    /// are dropped.
    pub fn apply_dataset_update<I>(&mut self, dataset: &DatasetId, points: I) -> usize
    where
        I: IntoIterator<Item = (Timestamp, Candle)>,
    {
        match self.store.update_dataset(dataset, points) {
            Some(update) => self.dispatch_update(&update),
            None => 0,
        }
    }

    fn dispatch_update(&mut self, update: &DatasetUpdate) -> usize {
        if update.is_empty() {
            return 0;
        }
        let charts: BTreeSet<ChartId> = update.subscribers.iter().map(|(c, _)| *c).collect();
        let mut redrawn = 0;
        for chart_id in charts {
            let Some(chart) = self.charts.get_mut(&chart_id) else {
                log::debug!("update for {}: {} is gone", update.dataset, chart_id);
                continue;
            };
            let jobs = chart.incremental_jobs(&self.store, update);
            if jobs.is_empty() {
                continue;
            }
            let outputs = self.runtime.run_all(jobs);
            chart.apply_outputs(outputs);
            self.render(chart_id);
            redrawn += 1;
        }
        redrawn
    }

    /// Snapshot the queued fetch work, marking it pending.
    pub fn take_fetch_batch(&mut self) -> FetchBatch {
        self.coalescer.take_batch(&mut self.store)
    }

    /// Apply a fetch outcome for `batch` and redraw affected charts.
    pub fn resolve_fetch(
        &mut self,
        batch: &FetchBatch,
        outcome: AnyResult<Vec<FetchResponse>>,
    ) -> FetchReport {
        let report = self.coalescer.resolve(&mut self.store, batch, outcome);
        for update in &report.updates {
            self.dispatch_update(update);
        }
        report
    }

    // ---- settings ----

    /// Current settings for a chart, including fields carried from the last
    /// [`Workspace::load_settings`].
    pub fn settings(&self, chart: ChartId) -> Option<ChartSettings> {
        let chart = self.charts.get(&chart)?;
        let indicators = chart
            .queue()
            .iter()
            .map(|entry| IndicatorSettings {
                id: entry.indicator.id().to_string(),
                visible: entry.visible,
                extra: entry.extra.clone(),
            })
            .collect();
        Some(ChartSettings {
            indicators,
            extra: chart.settings_extra().clone(),
        })
    }

    /// Replace a chart's indicators with those listed in `settings`.
    ///
    /// Unknown or incompatible indicator ids are skipped with a warning.
    pub fn load_settings(
        &mut self,
        chart_id: ChartId,
        settings: ChartSettings,
    ) -> Result<Vec<InstanceId>, WorkspaceError> {
        let existing = self
            .charts
            .get(&chart_id)
            .map(|c| c.queue().order().to_vec())
            .ok_or(WorkspaceError::UnknownChart(chart_id))?;
        for instance in existing {
            self.detach_instance(chart_id, instance);
        }

        let mut added = Vec::new();
        for item in settings.indicators {
            let instance = match self.insert_instance(chart_id, &item.id, None) {
                Ok(instance) => instance,
                Err(WorkspaceError::Indicator(e)) => {
                    log::warn!("{}: skipping saved indicator {}: {}", chart_id, item.id, e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            if let Some(entry) = self
                .charts
                .get_mut(&chart_id)
                .and_then(|c| c.queue_mut().entry_mut(instance))
            {
                entry.visible = item.visible;
                entry.extra = item.extra;
            }
            added.push(instance);
        }
        if let Some(chart) = self.charts.get_mut(&chart_id) {
            chart.set_settings_extra(settings.extra);
        }
        self.refresh(chart_id);
        Ok(added)
    }

    // ---- pipeline steps ----

    /// Full recompute, fetch the visible gaps, redraw.
    fn refresh(&mut self, chart: ChartId) {
        self.recompute(chart, None);
        self.request_visible(chart);
        self.render(chart);
    }

    fn recompute(&mut self, chart_id: ChartId, only: Option<&[InstanceId]>) {
        let Some(chart) = self.charts.get_mut(&chart_id) else {
            return;
        };
        let jobs = chart.full_jobs(&self.store, only);
        if jobs.is_empty() {
            return;
        }
        let outputs = self.runtime.run_all(jobs);
        chart.apply_outputs(outputs);
    }

    fn request_visible(&mut self, chart_id: ChartId) {
        let Some(chart) = self.charts.get(&chart_id) else {
            return;
        };
        let window = chart.compute_range();
        let now = self.store.now();
        for dataset in chart.datasets() {
            let runs = self.store.request_range(&dataset, window.start, window.end);
            if !runs.is_empty() {
                self.coalescer.enqueue(&dataset, &runs, now);
            }
        }
    }

    /// Redraw a chart. If the price axis changed width the chart refits its
    /// time range, so the new window is recomputed and drawn again.
    fn render(&mut self, chart_id: ChartId) {
        let Some(chart) = self.charts.get_mut(&chart_id) else {
            return;
        };
        let before = chart.range().time();
        chart.render(&self.generator);
        if chart.range().time() == before {
            return;
        }
        log::debug!("{}: range refit to {:?}", chart_id, chart.range().time());
        self.recompute(chart_id, None);
        self.request_visible(chart_id);
        if let Some(chart) = self.charts.get_mut(&chart_id) {
            chart.render(&self.generator);
        }
    }
}
