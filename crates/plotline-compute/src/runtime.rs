//! Runs indicators over series data, inline or on the worker pool.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use plotline_core::{InstanceId, SparseSeries, TimeRange, Timestamp};

use crate::globals::Globals;
use crate::indicator::{Bar, Indicator};
use crate::plot::{ComputedSet, Plotter};
use crate::pool::{PoolError, WorkerPool};
use crate::IndicatorError;

/// Whether a job rebuilds the set or patches changed timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputeMode {
    Full,
    Incremental,
}

/// Everything needed to compute one instance's set, owned so it can move to
/// a worker thread.
pub struct ComputeJob {
    pub instance: InstanceId,
    pub indicator: Arc<dyn Indicator>,
    /// Bars to draw, ascending.
    pub bars: Vec<Bar>,
    pub mode: ComputeMode,
    /// Set being patched; empty for a full rebuild.
    pub previous: ComputedSet,
    /// Scratch state carried into an incremental run.
    pub globals: Globals,
}

impl ComputeJob {
    /// A full rebuild over `range`.
    ///
    /// Full-history indicators replay every ready point up to `range.end`.
    pub fn full(
        instance: InstanceId,
        indicator: Arc<dyn Indicator>,
        series: &SparseSeries,
        range: TimeRange,
    ) -> Self {
        let start = if indicator.requires_full_history() {
            series.first_ready().unwrap_or(range.start).min(range.start)
        } else {
            range.start
        };
        let bars = series
            .ready_in(TimeRange::new(start, range.end))
            .map(|(ts, c)| Bar::new(ts, *c))
            .collect();
        Self {
            instance,
            indicator,
            bars,
            mode: ComputeMode::Full,
            previous: ComputedSet::new(),
            globals: Globals::new(),
        }
    }

    /// Redraw only `changed` timestamps inside `range`, continuing from
    /// `previous` and `globals`.
    ///
    /// Falls back to [`ComputeJob::full`] for full-history indicators.
    pub fn incremental(
        instance: InstanceId,
        indicator: Arc<dyn Indicator>,
        series: &SparseSeries,
        range: TimeRange,
        changed: &[Timestamp],
        previous: ComputedSet,
        globals: Globals,
    ) -> Self {
        if indicator.requires_full_history() {
            return Self::full(instance, indicator, series, range);
        }
        let bars = changed
            .iter()
            .filter(|ts| range.contains(**ts))
            .filter_map(|ts| series.candle(*ts).map(|c| Bar::new(*ts, *c)))
            .collect();
        Self {
            instance,
            indicator,
            bars,
            mode: ComputeMode::Incremental,
            previous,
            globals,
        }
    }
}

/// Result of one job. On error the caller keeps its previous set.
pub struct ComputeOutput {
    pub instance: InstanceId,
    pub result: Result<(ComputedSet, Globals), IndicatorError>,
}

/// Execute a job on the current thread.
///
/// Errors and panics from the indicator are contained here and reported in
/// the output.
pub fn run_job(job: ComputeJob) -> ComputeOutput {
    let ComputeJob {
        instance,
        indicator,
        bars,
        mode,
        previous,
        globals,
    } = job;

    let (mut set, mut globals) = match mode {
        ComputeMode::Full => (ComputedSet::new(), Globals::new()),
        ComputeMode::Incremental => {
            let mut set = previous;
            for bar in &bars {
                set.clear_at(bar.time);
            }
            (set, globals)
        }
    };

    let outcome = catch_unwind(AssertUnwindSafe(|| -> Result<(), IndicatorError> {
        for bar in &bars {
            let mut plot = Plotter::new(bar.time, &mut set);
            indicator.draw(bar, &mut plot, &mut globals)?;
        }
        Ok(())
    }));

    let result = match outcome {
        Ok(Ok(())) => {
            if mode == ComputeMode::Incremental {
                set.recompute_bounds();
            }
            Ok((set, globals))
        }
        Ok(Err(e)) => Err(e),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(IndicatorError::Panicked(message))
        }
    };
    if let Err(e) = &result {
        log::warn!("Indicator {} ({}) failed: {}", instance, indicator.id(), e);
    }
    ComputeOutput { instance, result }
}

/// Computes indicator sets, spreading jobs over a worker pool when one is
/// configured.
pub struct IndicatorRuntime {
    pool: Option<WorkerPool<ComputeJob, ComputeOutput>>,
}

impl IndicatorRuntime {
    /// A runtime that computes everything inline.
    pub fn synchronous() -> Self {
        Self { pool: None }
    }

    /// A runtime backed by `pool_size` worker threads; 0 is synchronous.
    pub fn with_pool(pool_size: usize) -> Result<Self, PoolError> {
        if pool_size == 0 {
            return Ok(Self::synchronous());
        }
        Ok(Self {
            pool: Some(WorkerPool::new(pool_size, run_job)?),
        })
    }

    /// Number of worker units, 0 when synchronous.
    pub fn pool_size(&self) -> usize {
        self.pool.as_ref().map_or(0, WorkerPool::size)
    }

    /// Run every job. Outputs come back in job order whatever order the
    /// workers finish in.
    pub fn run_all(&self, jobs: Vec<ComputeJob>) -> Vec<ComputeOutput> {
        let Some(pool) = &self.pool else {
            return jobs.into_iter().map(run_job).collect();
        };
        let handles: Vec<_> = jobs
            .into_iter()
            .map(|job| (job.instance, pool.dispatch(job)))
            .collect();
        handles
            .into_iter()
            .map(|(instance, handle)| match handle.wait() {
                Ok(output) => output,
                Err(e) => {
                    log::error!("Worker failed computing {}: {}", instance, e);
                    ComputeOutput {
                        instance,
                        result: Err(IndicatorError::Worker(e)),
                    }
                }
            })
            .collect()
    }
}

impl Default for IndicatorRuntime {
    fn default() -> Self {
        Self::synchronous()
    }
}
