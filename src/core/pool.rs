//! Sharded pool of independently ticking wheels.
//!
//! New tasks are spread round-robin across `pool_size` wheels to bound
//! per-wheel slot-list length and command-channel contention. A registry from
//! task id to owning-wheel index routes cancellations without scanning every
//! wheel. All wheels share one dispatcher and one id generator, so ids are
//! unique pool-wide and the registry cannot alias tasks on different wheels.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::{DispatcherConfig, PoolConfig, WheelConfig};
use crate::core::dispatch::{Dispatcher, DispatcherStats};
use crate::core::error::SchedulerError;
use crate::core::task::{Repeat, Task, TaskHandle, TaskId};
use crate::core::wheel::{Command, Wheel};
use crate::util::pow2::ceil_pow2;

/// State shared between the pool handle and the wheel driver threads.
pub(crate) struct PoolShared {
    wheels: Vec<Wheel>,
    mask: u64,
    cursor: AtomicU64,
    registry: RwLock<HashMap<TaskId, usize>>,
    next_id: Arc<AtomicU64>,
}

impl PoolShared {
    fn next_wheel(&self) -> usize {
        (self.cursor.fetch_add(1, Ordering::Relaxed) & self.mask) as usize
    }

    fn register(&self, id: TaskId, wheel: usize) {
        self.registry.write().insert(id, wheel);
    }

    /// Prune a finished or cancelled task from the registry. Stale entries
    /// are harmless either way; a routed cancel that finds nothing is a
    /// no-op.
    pub(crate) fn forget(&self, id: TaskId) {
        self.registry.write().remove(&id);
    }

    /// Re-enter a repeating task under a fresh id on the next wheel in
    /// round-robin order. Called from wheel driver threads after a firing.
    pub(crate) fn resubmit(&self, mut task: Box<Task>) {
        let wheel = self.next_wheel();
        task.id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let id = task.id;
        self.register(id, wheel);
        if !self.wheels[wheel].send_command(Command::Schedule(task)) {
            // Target wheel already closed mid-shutdown; the task is gone.
            self.forget(id);
            debug!(task = id, wheel, "reschedule dropped; wheel closed");
        }
    }
}

/// A fixed set of independently ticking wheels behind one scheduling API.
///
/// Mirrors the [`Wheel`] surface; every operation forwards to a wheel chosen
/// by an atomic round-robin cursor.
pub struct WheelPool {
    shared: Arc<PoolShared>,
    dispatcher: Arc<Dispatcher>,
    owns_dispatcher: bool,
    closed: AtomicBool,
}

impl WheelPool {
    /// Create `pool_size` wheels (rounded up to a power of two) sharing a
    /// default dispatcher. Wheels tick independently but with the same
    /// interval and slot count.
    #[must_use]
    pub fn new(pool_size: usize, interval: Duration, slot_count: usize) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(DispatcherConfig::default()));
        Self::build(pool_size, interval, slot_count, dispatcher, true)
    }

    /// Create a pool from a configuration object with a default dispatcher.
    #[must_use]
    pub fn from_config(config: &PoolConfig) -> Self {
        let config = config.normalized();
        Self::new(config.pool_size, config.wheel.interval, config.wheel.slot_count)
    }

    /// Create a pool whose wheels share an externally owned dispatcher.
    #[must_use]
    pub fn with_dispatcher(
        pool_size: usize,
        interval: Duration,
        slot_count: usize,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self::build(pool_size, interval, slot_count, dispatcher, false)
    }

    fn build(
        pool_size: usize,
        interval: Duration,
        slot_count: usize,
        dispatcher: Arc<Dispatcher>,
        owns_dispatcher: bool,
    ) -> Self {
        let pool_size = ceil_pow2(pool_size);
        let next_id = Arc::new(AtomicU64::new(0));

        let shared = Arc::new_cyclic(|weak| {
            let wheels = (0..pool_size)
                .map(|wheel_id| {
                    Wheel::assemble(
                        WheelConfig {
                            interval,
                            slot_count,
                        },
                        Arc::clone(&dispatcher),
                        false,
                        Arc::clone(&next_id),
                        weak.clone(),
                        wheel_id,
                    )
                })
                .collect();
            PoolShared {
                wheels,
                mask: pool_size as u64 - 1,
                cursor: AtomicU64::new(0),
                registry: RwLock::new(HashMap::new()),
                next_id,
            }
        });

        info!(pool_size, "wheel pool created");
        Self {
            shared,
            dispatcher,
            owns_dispatcher,
            closed: AtomicBool::new(false),
        }
    }

    /// Number of wheels in the pool.
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.shared.wheels.len()
    }

    /// Dispatcher activity counters.
    #[must_use]
    pub fn dispatcher_stats(&self) -> DispatcherStats {
        self.dispatcher.stats()
    }

    /// Start every wheel's driver thread.
    pub fn start(&self) {
        for wheel in &self.shared.wheels {
            wheel.start();
        }
        info!(pool_size = self.pool_size(), "wheel pool started");
    }

    /// Close every wheel, then shut down an owned dispatcher. Idempotent and
    /// safe under concurrent calls.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for wheel in &self.shared.wheels {
            wheel.close();
        }
        if self.owns_dispatcher {
            self.dispatcher.shutdown();
        }
        info!("wheel pool closed");
    }

    /// Schedule a delayed task on the next wheel in round-robin order.
    pub fn add_task<F>(
        &self,
        delay: Duration,
        repeat: Repeat,
        callback: F,
    ) -> Result<TaskHandle, SchedulerError>
    where
        F: Fn(DateTime<Local>) + Send + Sync + 'static,
    {
        self.route(|wheel| wheel.add_task(delay, repeat, callback))
    }

    /// Schedule a daily task; see [`Wheel::add_cron`].
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
        self.route(|wheel| wheel.add_cron(hour, minute, second, repeat, callback))
    }

    /// Schedule a weekly task; see [`Wheel::add_week_cron`].
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
        self.route(|wheel| wheel.add_week_cron(weekday, hour, minute, second, repeat, callback))
    }

    /// Schedule a monthly task; see [`Wheel::add_month_cron`].
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
        self.route(|wheel| {
            wheel.add_month_cron(day_of_month, hour, minute, second, repeat, callback)
        })
    }

    /// Schedule a yearly task; see [`Wheel::add_year_day_cron`].
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
        self.route(|wheel| {
            wheel.add_year_day_cron(month, day_of_month, hour, minute, second, repeat, callback)
        })
    }

    /// Best-effort cancellation routed through the id registry. Unknown or
    /// already-finished ids are a silent no-op.
    pub fn remove(&self, handle: TaskHandle) {
        let wheel = self.shared.registry.write().remove(&handle.id());
        match wheel {
            Some(wheel) => self.shared.wheels[wheel].remove(handle),
            None => debug!(task = handle.id(), "remove: task unknown or finished"),
        }
    }

    fn route<F>(&self, submit: F) -> Result<TaskHandle, SchedulerError>
    where
        F: FnOnce(&Wheel) -> Result<TaskHandle, SchedulerError>,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(SchedulerError::Closed);
        }
        let wheel = self.shared.next_wheel();
        let handle = submit(&self.shared.wheels[wheel])?;
        self.shared.register(handle.id(), wheel);
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn sequential_adds_land_on_distinct_wheels() {
        let pool = WheelPool::new(4, Duration::from_millis(50), 8);
        for _ in 0..4 {
            pool.add_task(Duration::from_secs(60), Repeat::once(), |_| {})
                .unwrap();
        }
        let registry = pool.shared.registry.read();
        let wheels: HashSet<usize> = registry.values().copied().collect();
        assert_eq!(wheels.len(), 4);
        drop(registry);
        pool.close();
    }

    #[test]
    fn task_ids_are_unique_pool_wide() {
        let pool = WheelPool::new(4, Duration::from_millis(50), 8);
        let mut ids = HashSet::new();
        for _ in 0..16 {
            let handle = pool
                .add_task(Duration::from_secs(60), Repeat::once(), |_| {})
                .unwrap();
            ids.insert(handle.id());
        }
        assert_eq!(ids.len(), 16);
        pool.close();
    }

    #[test]
    fn pool_size_rounds_to_power_of_two() {
        let pool = WheelPool::new(3, Duration::from_millis(50), 8);
        assert_eq!(pool.pool_size(), 4);
        pool.close();
    }

    #[test]
    fn from_config_applies_normalization() {
        let pool = WheelPool::from_config(&PoolConfig {
            pool_size: 3,
            wheel: WheelConfig {
                interval: Duration::from_millis(50),
                slot_count: 60,
            },
        });
        assert_eq!(pool.pool_size(), 4);
        pool.close();
    }
}
