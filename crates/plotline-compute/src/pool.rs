//! Fixed-size pool of compute threads.
//!
//! Tasks are queued FIFO and handed 1:1 to free units. When a unit finishes
//! it resolves the task's handle, marks itself free and immediately pulls
//! the next queued task, so the queue drains greedily.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};

use futures::channel::oneshot;
use thiserror::Error;

/// Worker pool errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("task {task} panicked: {message}")]
    TaskPanicked { task: u64, message: String },
    #[error("worker pool shut down before task completed")]
    Shutdown,
    #[error("failed to spawn worker thread: {0}")]
    SpawnFailed(String),
}

type Handler<T, R> = Arc<dyn Fn(T) -> R + Send + Sync>;
type Reply<R> = oneshot::Sender<Result<R, PoolError>>;

struct Task<T, R> {
    id: u64,
    params: T,
    reply: Reply<R>,
}

struct Unit<T, R> {
    busy: bool,
    tx: Option<Sender<Task<T, R>>>,
}

struct PoolState<T, R> {
    queue: VecDeque<Task<T, R>>,
    units: Vec<Unit<T, R>>,
    next_id: u64,
    completed: u64,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Hand queued tasks to free units in FIFO order.
fn assign<T, R>(state: &mut PoolState<T, R>) {
    for unit in state.units.iter_mut().filter(|u| !u.busy) {
        let Some(tx) = unit.tx.as_ref() else {
            continue;
        };
        let Some(task) = state.queue.pop_front() else {
            return;
        };
        match tx.send(task) {
            Ok(()) => unit.busy = true,
            Err(mpsc::SendError(task)) => {
                let _ = task.reply.send(Err(PoolError::Shutdown));
                unit.tx = None;
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn run_task<T, R>(handler: &Handler<T, R>, id: u64, params: T) -> Result<R, PoolError> {
    catch_unwind(AssertUnwindSafe(|| handler(params))).map_err(|payload| {
        let message = panic_message(payload.as_ref());
        log::error!("Worker task {} panicked: {}", id, message);
        PoolError::TaskPanicked { task: id, message }
    })
}

/// Future resolving to a dispatched task's result.
#[must_use = "a task handle does nothing unless awaited or waited on"]
pub struct TaskHandle<R> {
    id: u64,
    rx: oneshot::Receiver<Result<R, PoolError>>,
}

impl<R> TaskHandle<R> {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Block the current thread until the task completes.
    pub fn wait(self) -> Result<R, PoolError> {
        futures::executor::block_on(self)
    }
}

impl<R> Future for TaskHandle<R> {
    type Output = Result<R, PoolError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or(Err(PoolError::Shutdown)))
    }
}

/// A pool of `size` threads running one handler over dispatched params.
///
/// A pool of size 0 runs every task inline on the dispatching thread, with
/// identical results.
pub struct WorkerPool<T, R> {
    handler: Handler<T, R>,
    state: Arc<Mutex<PoolState<T, R>>>,
    threads: Vec<JoinHandle<()>>,
}

impl<T, R> WorkerPool<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    pub fn new<F>(size: usize, handler: F) -> Result<Self, PoolError>
    where
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        let handler: Handler<T, R> = Arc::new(handler);
        let state = Arc::new(Mutex::new(PoolState {
            queue: VecDeque::new(),
            units: Vec::with_capacity(size),
            next_id: 0,
            completed: 0,
        }));

        let mut pool = Self {
            handler,
            state,
            threads: Vec::with_capacity(size),
        };
        for index in 0..size {
            let (tx, rx) = mpsc::channel();
            let handler = Arc::clone(&pool.handler);
            let state = Arc::clone(&pool.state);
            let handle = thread::Builder::new()
                .name(format!("plotline-worker-{index}"))
                .spawn(move || unit_loop(index, rx, handler, state))
                .map_err(|e| PoolError::SpawnFailed(e.to_string()))?;
            lock(&pool.state).units.push(Unit {
                busy: false,
                tx: Some(tx),
            });
            pool.threads.push(handle);
        }
        log::debug!("Started worker pool with {} units", size);
        Ok(pool)
    }

    /// Number of compute units; 0 means synchronous.
    #[must_use]
    pub fn size(&self) -> usize {
        self.threads.len()
    }

    /// Tasks waiting for a free unit.
    pub fn queued(&self) -> usize {
        lock(&self.state).queue.len()
    }

    /// Units currently running a task.
    pub fn busy(&self) -> usize {
        lock(&self.state).units.iter().filter(|u| u.busy).count()
    }

    /// Tasks finished by pool units since creation.
    pub fn completed(&self) -> u64 {
        lock(&self.state).completed
    }

    /// Queue `params` and return a handle to its result.
    pub fn dispatch(&self, params: T) -> TaskHandle<R> {
        let (reply, rx) = oneshot::channel();
        let mut state = lock(&self.state);
        let id = state.next_id;
        state.next_id += 1;

        if self.threads.is_empty() {
            drop(state);
            let _ = reply.send(run_task(&self.handler, id, params));
            return TaskHandle { id, rx };
        }

        state.queue.push_back(Task { id, params, reply });
        assign(&mut *state);
        TaskHandle { id, rx }
    }
}

fn unit_loop<T, R>(
    index: usize,
    rx: Receiver<Task<T, R>>,
    handler: Handler<T, R>,
    state: Arc<Mutex<PoolState<T, R>>>,
) {
    while let Ok(task) = rx.recv() {
        let result = run_task(&handler, task.id, task.params);
        // The handle may have been dropped; the result is discarded then.
        let _ = task.reply.send(result);
        let mut state = lock(&state);
        state.completed += 1;
        if let Some(unit) = state.units.get_mut(index) {
            unit.busy = false;
        }
        assign(&mut *state);
    }
    log::trace!("Worker unit {} exiting", index);
}

impl<T, R> Drop for WorkerPool<T, R> {
    fn drop(&mut self) {
        {
            let mut state = lock(&self.state);
            for unit in &mut state.units {
                unit.tx = None;
            }
            // Dropping queued tasks cancels their handles.
            state.queue.clear();
        }
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                log::warn!("Worker thread panicked during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_all_tasks_complete_exactly_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let pool = WorkerPool::new(3, move |x: u64| {
            counter.fetch_add(1, Ordering::SeqCst);
            // Uneven durations shuffle completion order.
            thread::sleep(Duration::from_millis((x * 7) % 5));
            x * 2
        })
        .unwrap();

        let handles: Vec<_> = (0..40).map(|i| pool.dispatch(i)).collect();
        let ids: HashSet<u64> = handles.iter().map(TaskHandle::id).collect();
        assert_eq!(ids.len(), 40);
        let results: Vec<u64> = handles.into_iter().map(|h| h.wait().unwrap()).collect();
        assert_eq!(results, (0..40).map(|i| i * 2).collect::<Vec<_>>());
        assert_eq!(runs.load(Ordering::SeqCst), 40);
        assert_eq!(pool.queued(), 0);
    }

    #[test]
    fn test_synchronous_pool_matches() {
        let pool = WorkerPool::new(0, |x: i32| x + 1).unwrap();
        assert_eq!(pool.size(), 0);
        assert_eq!(pool.dispatch(41).wait(), Ok(42));
        assert_eq!(pool.completed(), 0);
    }

    #[test]
    fn test_panicking_task_does_not_kill_unit() {
        let pool = WorkerPool::new(1, |x: i32| {
            if x < 0 {
                panic!("negative input");
            }
            x
        })
        .unwrap();
        let bad = pool.dispatch(-1).wait();
        assert!(matches!(
            bad,
            Err(PoolError::TaskPanicked { ref message, .. }) if message == "negative input"
        ));
        assert_eq!(pool.dispatch(5).wait(), Ok(5));
    }

    #[tokio::test]
    async fn test_handles_are_futures() {
        let pool = WorkerPool::new(2, |s: String| s.len()).unwrap();
        let a = pool.dispatch("abc".to_string());
        let b = pool.dispatch("de".to_string());
        assert_eq!(a.await, Ok(3));
        assert_eq!(b.await, Ok(2));
    }

    #[test]
    fn test_drop_joins_units() {
        let pool = WorkerPool::new(2, |x: u8| x).unwrap();
        let handle = pool.dispatch(1);
        assert_eq!(handle.wait(), Ok(1));
        drop(pool);
    }
}
