//! Execution dispatcher: a bounded pool of worker threads that invoke due
//! callbacks, decoupled from the wheel tick threads.
//!
//! Submission is `try_send` from the wheel's perspective: when the queue is
//! saturated the invocation is dropped and logged rather than blocking the
//! tick thread. This is an at-most-once, fire-and-forget contract.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Local};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::DispatcherConfig;
use crate::core::error::DispatchError;
use crate::core::task::Handler;

/// A due callback together with its firing time.
pub(crate) struct Job {
    pub callback: Handler,
    pub fired_at: DateTime<Local>,
}

/// Snapshot of dispatcher activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    /// Jobs accepted into the queue.
    pub submitted: u64,
    /// Jobs whose callback ran to completion.
    pub completed: u64,
    /// Jobs dropped because the queue was full or shut down.
    pub dropped: u64,
    /// Jobs whose callback panicked; the worker survives.
    pub panicked: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    dropped: AtomicU64,
    panicked: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DispatcherStats {
        DispatcherStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }
}

/// Bounded worker thread pool for callback execution.
///
/// Workers block on channel recv; dropping the sender unblocks them for a
/// clean shutdown. Each invocation runs under `catch_unwind`, so a panicking
/// callback is logged and never takes down a worker or a wheel.
pub struct Dispatcher {
    /// Job sender; `None` after shutdown so workers drain and exit.
    job_tx: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
    shutdown: AtomicBool,
}

impl Dispatcher {
    /// Spawn `config.workers` named worker threads sharing a bounded queue.
    #[must_use]
    pub fn new(config: DispatcherConfig) -> Self {
        let config = config.normalized();
        let (job_tx, job_rx) = bounded::<Job>(config.queue_depth);
        let counters = Arc::new(Counters::default());

        let mut workers = Vec::with_capacity(config.workers);
        for worker_id in 0..config.workers {
            workers.push(spawn_worker(worker_id, job_rx.clone(), Arc::clone(&counters)));
        }

        info!(
            workers = config.workers,
            queue_depth = config.queue_depth,
            "dispatcher started"
        );

        Self {
            job_tx: Mutex::new(Some(job_tx)),
            workers: Mutex::new(workers),
            counters,
            shutdown: AtomicBool::new(false),
        }
    }

    /// Enqueue a due callback. Never blocks: a full queue fails fast so a
    /// slow callback population cannot delay the wheel's clock.
    pub(crate) fn submit(&self, job: Job) -> Result<(), DispatchError> {
        let guard = self.job_tx.lock();
        let Some(job_tx) = guard.as_ref() else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(DispatchError::Shutdown);
        };
        match job_tx.try_send(job) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                Err(DispatchError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                Err(DispatchError::Shutdown)
            }
        }
    }

    /// Current activity counters.
    #[must_use]
    pub fn stats(&self) -> DispatcherStats {
        self.counters.snapshot()
    }

    /// Shut down the pool: stop accepting jobs, drain the queue, and join
    /// every worker. Safe to call more than once or concurrently.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        // Dropping the sender unblocks workers once the queue drains.
        *self.job_tx.lock() = None;

        let mut workers = self.workers.lock();
        for worker in workers.drain(..) {
            if worker.join().is_err() {
                warn!("dispatch worker panicked");
            }
        }
        info!("dispatcher shut down");
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Workers are detached rather than joined here; explicit shutdown()
        // is the graceful path.
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            *self.job_tx.lock() = None;
            debug!("dispatcher dropped without explicit shutdown; workers detached");
        }
    }
}

fn spawn_worker(
    worker_id: usize,
    job_rx: Receiver<Job>,
    counters: Arc<Counters>,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name(format!("tw-exec-{worker_id}"))
        .spawn(move || {
            debug!(worker_id, "dispatch worker started");
            while let Ok(job) = job_rx.recv() {
                let Job { callback, fired_at } = job;
                let outcome = catch_unwind(AssertUnwindSafe(|| (callback.as_ref())(fired_at)));
                match outcome {
                    Ok(()) => {
                        counters.completed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(_) => {
                        counters.panicked.fetch_add(1, Ordering::Relaxed);
                        error!(worker_id, "callback panicked");
                    }
                }
            }
            debug!(worker_id, "dispatch worker exiting");
        })
        .expect("failed to spawn dispatch worker thread")
}
