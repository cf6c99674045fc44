//! Background loop feeding historical data into a shared workspace.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use plotline_data::{FetchReport, HistoricalSource};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::workspace::Workspace;

/// A workspace shared between interactive callers and the fetch loop.
pub type SharedWorkspace = Arc<Mutex<Workspace>>;

/// Periodically drains the workspace's fetch queue through a source.
///
/// The workspace lock is released while the source is awaited, so
/// interaction continues during a fetch. Requests queued meanwhile go into
/// the next batch. Results are merged on tokio's blocking pool, since
/// indicator recomputation waits on the worker pool synchronously.
pub struct FetchLoop<S> {
    workspace: SharedWorkspace,
    source: Arc<S>,
    period: Duration,
    cancel: Arc<AtomicBool>,
}

impl<S> FetchLoop<S>
where
    S: HistoricalSource + 'static,
{
    pub fn new(workspace: SharedWorkspace, source: Arc<S>, period: Duration) -> Self {
        Self {
            workspace,
            source,
            period,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops the loop at its next tick once set.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run one batch. Returns `None` when nothing was queued.
    pub async fn poll_once(&self) -> Option<FetchReport> {
        let batch = {
            let mut workspace = self.workspace.lock().await;
            workspace.take_fetch_batch()
        };
        if batch.is_empty() {
            return None;
        }

        log::debug!("Fetching {} windows", batch.len());
        let outcome = self.source.fetch(batch.requests.clone()).await;

        // Resolving recomputes indicators and may block on worker threads,
        // so it runs off the async executor.
        let workspace = Arc::clone(&self.workspace);
        let resolved = tokio::task::spawn_blocking(move || {
            workspace.blocking_lock().resolve_fetch(&batch, outcome)
        })
        .await;
        match resolved {
            Ok(report) => Some(report),
            Err(e) => {
                log::error!("Fetch resolution task failed: {}", e);
                None
            }
        }
    }

    /// Tick until cancelled. Returns the number of ticks that ran a batch.
    pub async fn run(self) -> usize {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut batches = 0;
        loop {
            interval.tick().await;
            if self.cancel.load(Ordering::Relaxed) {
                break;
            }
            let Some(report) = self.poll_once().await else {
                continue;
            };
            batches += 1;
            match &report.error {
                Some(error) => log::warn!(
                    "Fetch failed, {} dataset(s) reverted ({} points): {}",
                    report.failed.len(),
                    report.reverted,
                    error
                ),
                None => log::debug!(
                    "Fetch merged {} update(s), {} dataset(s) unanswered",
                    report.updates.len(),
                    report.failed.len()
                ),
            }
        }
        log::info!("Fetch loop stopped after {} batch(es)", batches);
        batches
    }

    /// Run on the tokio runtime.
    pub fn spawn(self) -> JoinHandle<usize> {
        tokio::spawn(self.run())
    }
}
