//! Sequential job executor keyed on wall-clock deadlines.
//!
//! A single tokio task owns the queue and runs one job at a time, so jobs
//! never race each other. Deadlines are absolute UTC instants checked
//! against the injected [`Clock`]; sleeps are capped so a jump of the wall
//! clock is noticed within [`MAX_SLEEP`].

use crate::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

pub const MAX_SLEEP: std::time::Duration = std::time::Duration::from_secs(60);

pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Work queued on the timer. The timer awaits each job before starting the
/// next one.
pub struct Job(Box<dyn FnOnce() -> JobFuture + Send + 'static>);

impl Job {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() -> JobFuture + Send + 'static,
    {
        Self(Box::new(f))
    }

    pub fn sync<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::new(move || {
            f();
            Box::pin(async {})
        })
    }

    async fn run(self) {
        (self.0)().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerState {
    pub pending: usize,
    pub next_deadline: Option<DateTime<Utc>>,
    pub running: bool,
}

type Queue = BTreeMap<(DateTime<Utc>, u64), Job>;

pub struct Timer {
    queue: Arc<Mutex<Queue>>,
    wake: Arc<Notify>,
    sequence: AtomicU64,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer").field("state", &self.state()).finish()
    }
}

impl Timer {
    /// Start the executor task. Must be called inside a tokio runtime.
    pub fn spawn(clock: Arc<dyn Clock>, cancel: CancellationToken) -> Self {
        let queue: Arc<Mutex<Queue>> = Arc::new(Mutex::new(BTreeMap::new()));
        let wake = Arc::new(Notify::new());
        let cancel = cancel.child_token();

        let handle = tokio::spawn(run_loop(
            queue.clone(),
            wake.clone(),
            clock.clone(),
            cancel.clone(),
        ));

        Self {
            queue,
            wake,
            sequence: AtomicU64::new(0),
            clock,
            cancel,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Queue `job` to run at `at`. Jobs with equal deadlines run in
    /// submission order; past deadlines run as soon as possible.
    pub fn schedule(&self, at: DateTime<Utc>, job: Job) {
        if self.cancel.is_cancelled() {
            debug!(%at, "Timer shut down, dropping job");
            return;
        }
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.queue.lock().insert((at, seq), job);
        self.wake.notify_one();
    }

    pub fn schedule_after(&self, delay: Duration, job: Job) {
        let at = self.clock.now() + delay;
        self.schedule(at, job);
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn state(&self) -> TimerState {
        let queue = self.queue.lock();
        TimerState {
            pending: queue.len(),
            next_deadline: queue.keys().next().map(|(at, _)| *at),
            running: !self.cancel.is_cancelled(),
        }
    }

    /// Stop the executor and drop every queued job.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        let dropped = std::mem::take(&mut *self.queue.lock());
        debug!(dropped = dropped.len(), "Timer shut down");
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_loop(
    queue: Arc<Mutex<Queue>>,
    wake: Arc<Notify>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
) {
    loop {
        let next = queue.lock().keys().next().copied();
        let wait = match next {
            None => None,
            Some((deadline, _)) => {
                let now = clock.now();
                if deadline <= now {
                    let job = queue.lock().pop_first().map(|(_, job)| job);
                    if let Some(job) = job {
                        trace!(%deadline, "Running timer job");
                        job.run().await;
                    }
                    continue;
                }
                Some(
                    (deadline - now)
                        .to_std()
                        .unwrap_or(std::time::Duration::ZERO)
                        .min(MAX_SLEEP),
                )
            }
        };

        match wait {
            None => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = wake.notified() => {}
                }
            }
            Some(wait) => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = wake.notified() => {}
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        }
    }
}
