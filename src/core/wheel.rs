//! The core scheduling engine: a fixed-size circular slot array advanced by a
//! periodic tick on a dedicated driver thread.
//!
//! All slot mutation is funneled through the driver via a single-consumer
//! command channel, so scheduling and cancellation calls never contend with
//! the tick critical path and the slot lists need no locking at all.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Local};
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::config::{DispatcherConfig, WheelConfig};
use crate::core::cron::CronSpec;
use crate::core::dispatch::{Dispatcher, Job};
use crate::core::error::SchedulerError;
use crate::core::pool::PoolShared;
use crate::core::task::{Handler, Repeat, Task, TaskHandle, TaskId, TaskSlab};

/// Mutating operations routed to the driver thread.
pub(crate) enum Command {
    Schedule(Box<Task>),
    Cancel(TaskId),
    Shutdown,
}

/// One bucket of the wheel; tasks stay in insertion order.
#[derive(Default)]
struct Slot {
    tasks: Vec<Box<Task>>,
}

/// Compute the slot index and lap count for a delay.
///
/// A delay shorter than one interval still waits one tick, so a task never
/// fires inside the tick that scheduled it. With advance-then-inspect
/// ticking, a task placed here fires exactly `max(1, delay/interval)` ticks
/// later, independent of the slot count.
pub(crate) fn placement(
    delay: Duration,
    interval: Duration,
    pointer: usize,
    slot_count: usize,
) -> (usize, u64) {
    let interval_ms = interval.as_millis().max(1) as u64;
    let delay_ms = delay.as_millis() as u64;
    let ticks = (delay_ms / interval_ms).max(1);
    let pos = ((pointer as u64 + ticks) & (slot_count as u64 - 1)) as usize;
    let round = (ticks - 1) / slot_count as u64;
    (pos, round)
}

/// Slot state owned exclusively by the driver thread.
struct WheelCore {
    wheel_id: usize,
    interval: Duration,
    slot_count: usize,
    pointer: usize,
    slots: Vec<Slot>,
    dispatcher: Arc<Dispatcher>,
    slab: Arc<TaskSlab>,
    next_id: Arc<AtomicU64>,
    /// Owning pool for reschedule routing; empty for standalone wheels.
    pool: Weak<PoolShared>,
}

impl WheelCore {
    fn place(&mut self, mut task: Box<Task>) {
        let (pos, round) = placement(task.delay, self.interval, self.pointer, self.slot_count);
        task.round = round;
        trace!(
            wheel = self.wheel_id,
            task = task.id,
            pos,
            round,
            "task placed"
        );
        self.slots[pos].tasks.push(task);
    }

    fn cancel(&mut self, id: TaskId) {
        for slot in &mut self.slots {
            if let Some(idx) = slot.tasks.iter().position(|t| t.id == id) {
                let task = slot.tasks.remove(idx);
                self.slab.recycle(task);
                debug!(wheel = self.wheel_id, task = id, "task cancelled");
                return;
            }
        }
        trace!(
            wheel = self.wheel_id,
            task = id,
            "cancel matched nothing; task already fired or unknown"
        );
    }

    /// Advance the pointer one slot and inspect only the slot it lands on:
    /// tasks still owing laps are decremented in place, due tasks are
    /// dispatched and, when repeats remain, rescheduled.
    fn tick(&mut self, now: DateTime<Local>) {
        self.pointer = (self.pointer + 1) & (self.slot_count - 1);

        // Collect before firing: a rescheduled task may land back in this
        // same slot and must wait a full lap, not fire in this pass.
        let mut due = Vec::new();
        let slot = &mut self.slots[self.pointer];
        let mut idx = 0;
        while idx < slot.tasks.len() {
            if slot.tasks[idx].round > 0 {
                slot.tasks[idx].round -= 1;
                idx += 1;
            } else {
                due.push(slot.tasks.remove(idx));
            }
        }

        for task in due {
            self.fire(task, now);
        }
    }

    fn fire(&mut self, task: Box<Task>, now: DateTime<Local>) {
        let job = Job {
            callback: task.callback.clone(),
            fired_at: now,
        };
        if let Err(err) = self.dispatcher.submit(job) {
            warn!(
                wheel = self.wheel_id,
                task = task.id,
                %err,
                "callback invocation dropped"
            );
        }
        self.reschedule(task);
    }

    /// Terminal tasks are recycled; repeating tasks re-enter under a fresh id
    /// through the owning pool when there is one, or this wheel otherwise.
    /// Cron delays are recomputed from the calendar each time, so drift never
    /// accumulates from missed ticks.
    fn reschedule(&mut self, mut task: Box<Task>) {
        let finished_id = task.id;

        if task.repeat.is_final() {
            if let Some(pool) = self.pool.upgrade() {
                pool.forget(finished_id);
            }
            self.slab.recycle(task);
            return;
        }

        task.repeat = task.repeat.decremented();
        task.delay = match task.recurrence {
            Some(ref cron) => cron.next_delay(),
            None => task.delay,
        };

        if let Some(pool) = self.pool.upgrade() {
            pool.forget(finished_id);
            pool.resubmit(task);
        } else {
            task.id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
            self.place(task);
        }
    }
}

fn run(mut core: WheelCore, cmd_rx: Receiver<Command>) {
    let ticker = crossbeam_channel::tick(core.interval);
    debug!(wheel = core.wheel_id, "wheel driver started");
    loop {
        select! {
            recv(ticker) -> msg => match msg {
                Ok(_) => core.tick(Local::now()),
                Err(_) => {
                    warn!(wheel = core.wheel_id, "ticker disconnected; stopping driver");
                    break;
                }
            },
            recv(cmd_rx) -> msg => match msg {
                Ok(Command::Schedule(task)) => core.place(task),
                Ok(Command::Cancel(id)) => core.cancel(id),
                Ok(Command::Shutdown) | Err(_) => break,
            },
        }
    }
    debug!(wheel = core.wheel_id, "wheel driver stopped");
}

/// A single time wheel: schedules delayed and calendar-recurring callbacks on
/// a circular slot array driven by one dedicated thread.
///
/// Firing precision is bounded by the tick interval: a task with delay `d`
/// fires no earlier than `d` and no later than `d` plus one interval,
/// ignoring host scheduling jitter. Prefer [`WheelPool`](crate::core::pool::WheelPool)
/// when scheduling from many threads; it spreads contention across wheels.
pub struct Wheel {
    interval: Duration,
    slot_count: usize,
    wheel_id: usize,
    cmd_tx: Sender<Command>,
    next_id: Arc<AtomicU64>,
    slab: Arc<TaskSlab>,
    started: AtomicBool,
    closed: AtomicBool,
    driver: Mutex<Option<JoinHandle<()>>>,
    /// Driver state parked here between construction and `start()`.
    core: Mutex<Option<(WheelCore, Receiver<Command>)>>,
    /// Present when this wheel created its own dispatcher and must shut it
    /// down on close; injected dispatchers are left to their owner.
    owned_dispatcher: Option<Arc<Dispatcher>>,
}

impl Wheel {
    /// Create a standalone wheel with its own default dispatcher.
    ///
    /// `interval` is clamped to at least one millisecond and `slot_count`
    /// rounds up to a power of two (minimum 1).
    #[must_use]
    pub fn new(interval: Duration, slot_count: usize) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(DispatcherConfig::default()));
        Self::assemble(
            WheelConfig {
                interval,
                slot_count,
            },
            dispatcher,
            true,
            Arc::new(AtomicU64::new(0)),
            Weak::new(),
            0,
        )
    }

    /// Create a wheel that shares an externally owned dispatcher.
    #[must_use]
    pub fn with_dispatcher(
        interval: Duration,
        slot_count: usize,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self::assemble(
            WheelConfig {
                interval,
                slot_count,
            },
            dispatcher,
            false,
            Arc::new(AtomicU64::new(0)),
            Weak::new(),
            0,
        )
    }

    pub(crate) fn assemble(
        config: WheelConfig,
        dispatcher: Arc<Dispatcher>,
        owns_dispatcher: bool,
        next_id: Arc<AtomicU64>,
        pool: Weak<PoolShared>,
        wheel_id: usize,
    ) -> Self {
        let config = config.normalized();
        let (cmd_tx, cmd_rx) = unbounded();
        let slab = Arc::new(TaskSlab::new());

        let core = WheelCore {
            wheel_id,
            interval: config.interval,
            slot_count: config.slot_count,
            pointer: 0,
            slots: (0..config.slot_count).map(|_| Slot::default()).collect(),
            dispatcher: Arc::clone(&dispatcher),
            slab: Arc::clone(&slab),
            next_id: Arc::clone(&next_id),
            pool,
        };

        Self {
            interval: config.interval,
            slot_count: config.slot_count,
            wheel_id,
            cmd_tx,
            next_id,
            slab,
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            driver: Mutex::new(None),
            core: Mutex::new(Some((core, cmd_rx))),
            owned_dispatcher: owns_dispatcher.then_some(dispatcher),
        }
    }

    /// Tick interval after normalization.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Slot count after rounding to a power of two.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Spawn the driver thread and begin ticking. Tasks scheduled before
    /// `start()` are placed when the driver comes up. A second call warns
    /// and does nothing.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            warn!(wheel = self.wheel_id, "start called more than once");
            return;
        }
        let Some((core, cmd_rx)) = self.core.lock().take() else {
            return;
        };
        let handle = thread::Builder::new()
            .name(format!("tw-wheel-{}", self.wheel_id))
            .spawn(move || run(core, cmd_rx))
            .expect("failed to spawn wheel driver thread");
        *self.driver.lock() = Some(handle);
        info!(
            wheel = self.wheel_id,
            interval_ms = self.interval.as_millis() as u64,
            slots = self.slot_count,
            "wheel started"
        );
    }

    /// Stop the driver and release its resources. Idempotent: safe to call
    /// more than once or concurrently; the winning caller returns only after
    /// the driver loop has exited. Scheduling operations after `close()`
    /// return [`SchedulerError::Closed`].
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.cmd_tx.send(Command::Shutdown);
        // A wheel that never started still holds its parked driver state.
        self.core.lock().take();
        if let Some(handle) = self.driver.lock().take() {
            if handle.join().is_err() {
                warn!(wheel = self.wheel_id, "wheel driver panicked");
            }
        }
        if let Some(dispatcher) = &self.owned_dispatcher {
            dispatcher.shutdown();
        }
        info!(wheel = self.wheel_id, "wheel closed");
    }

    /// Schedule a delayed task. A zero delay is coerced to one tick interval,
    /// so the task never fires inside the current tick.
    pub fn add_task<F>(
        &self,
        delay: Duration,
        repeat: Repeat,
        callback: F,
    ) -> Result<TaskHandle, SchedulerError>
    where
        F: Fn(DateTime<Local>) + Send + Sync + 'static,
    {
        self.submit(delay, repeat, Arc::new(callback), None)
    }

    /// Schedule a task every day at `hour:minute:second`.
    pub fn add_cron<F>(
        &self,
        hour: u32,
        minute: u32,
        second: u32,
        repeat: Repeat,
        callback: F,
    ) -> Result<TaskHandle, SchedulerError>
    where
        F: Fn(DateTime<Local>) + Send + Sync + 'static,
    {
        self.submit_cron(CronSpec::daily(hour, minute, second)?, repeat, Arc::new(callback))
    }

    /// Schedule a task every week on `weekday` (1-7, Monday through Sunday).
    pub fn add_week_cron<F>(
        &self,
        weekday: u32,
        hour: u32,
        minute: u32,
        second: u32,
        repeat: Repeat,
        callback: F,
    ) -> Result<TaskHandle, SchedulerError>
    where
        F: Fn(DateTime<Local>) + Send + Sync + 'static,
    {
        self.submit_cron(
            CronSpec::weekly(weekday, hour, minute, second)?,
            repeat,
            Arc::new(callback),
        )
    }

    /// Schedule a task every month on `day_of_month` (1-31). Months without
    /// the day are skipped.
    pub fn add_month_cron<F>(
        &self,
        day_of_month: u32,
        hour: u32,
        minute: u32,
        second: u32,
        repeat: Repeat,
        callback: F,
    ) -> Result<TaskHandle, SchedulerError>
    where
        F: Fn(DateTime<Local>) + Send + Sync + 'static,
    {
        self.submit_cron(
            CronSpec::monthly(day_of_month, hour, minute, second)?,
            repeat,
            Arc::new(callback),
        )
    }

    /// Schedule a task every year on `month`/`day_of_month`.
    pub fn add_year_day_cron<F>(
        &self,
        month: u32,
        day_of_month: u32,
        hour: u32,
        minute: u32,
        second: u32,
        repeat: Repeat,
        callback: F,
    ) -> Result<TaskHandle, SchedulerError>
    where
        F: Fn(DateTime<Local>) + Send + Sync + 'static,
    {
        self.submit_cron(
            CronSpec::yearly(month, day_of_month, hour, minute, second)?,
            repeat,
            Arc::new(callback),
        )
    }

    /// Best-effort cancellation. A call racing the firing tick may find the
    /// task already gone (fired, or rescheduled under a new id); both
    /// outcomes are silent.
    pub fn remove(&self, handle: TaskHandle) {
        if self.cmd_tx.send(Command::Cancel(handle.id())).is_err() {
            debug!(
                wheel = self.wheel_id,
                task = handle.id(),
                "remove after close ignored"
            );
        }
    }

    pub(crate) fn submit_cron(
        &self,
        spec: CronSpec,
        repeat: Repeat,
        callback: Handler,
    ) -> Result<TaskHandle, SchedulerError> {
        let delay = spec.next_delay();
        self.submit(delay, repeat, callback, Some(spec))
    }

    pub(crate) fn submit(
        &self,
        delay: Duration,
        repeat: Repeat,
        callback: Handler,
        recurrence: Option<CronSpec>,
    ) -> Result<TaskHandle, SchedulerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SchedulerError::Closed);
        }
        let delay = if delay.is_zero() { self.interval } else { delay };
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let task = self
            .slab
            .acquire(id, delay, repeat.normalized(), callback, recurrence);
        self.cmd_tx
            .send(Command::Schedule(task))
            .map_err(|_| SchedulerError::Closed)?;
        Ok(TaskHandle::new(id))
    }

    /// Route a command from the pool; false when the driver is gone.
    pub(crate) fn send_command(&self, cmd: Command) -> bool {
        self.cmd_tx.send(cmd).is_ok()
    }
}

impl Drop for Wheel {
    fn drop(&mut self) {
        // Signal the driver but do not join; explicit close() is the
        // graceful path.
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.cmd_tx.send(Command::Shutdown);
            debug!(wheel = self.wheel_id, "wheel dropped without explicit close");
        }
    }
}
