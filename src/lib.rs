//! # Timewheel
//!
//! A sharded time-wheel scheduler for delayed and calendar-recurring
//! callbacks.
//!
//! This library schedules very large numbers of pending callbacks without
//! allocating one OS timer per task. Tasks are hashed onto a circular slot
//! array by their delay; a single driver thread per wheel advances a pointer
//! one slot per tick and dispatches whatever has come due. Pools of wheels
//! spread scheduling load across independent clocks.
//!
//! ## Core Problem Solved
//!
//! Timer-heavy workloads (connection timeouts, cache eviction, periodic
//! jobs) create two pressures a naive timer-per-task design handles badly:
//!
//! - **Volume**: tens of thousands of pending timers are one slot-list entry
//!   each here, not one kernel object each.
//! - **Isolation**: callbacks run on a dedicated dispatcher pool, so a slow
//!   callback population can never stall the scheduling clock.
//!
//! ## Key Features
//!
//! - **O(1) scheduling**: slot index and lap count from two integer ops
//!   (slot counts are powers of two, so modulo is a bitmask)
//! - **Calendar recurrence**: daily/weekly/monthly/yearly crons recomputed
//!   from the calendar on every firing, so drift never accumulates
//! - **Sharding**: `WheelPool` round-robins tasks across independent wheels
//!   and routes cancellations through an id registry
//! - **Lock-free tick path**: all slot mutation flows through each wheel's
//!   own driver thread via a command channel
//! - **At-most-once dispatch**: a saturated dispatcher drops and logs rather
//!   than blocking the tick thread
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use timewheel::core::{Repeat, WheelPool};
//!
//! let pool = WheelPool::new(4, Duration::from_millis(100), 512);
//! pool.start();
//!
//! // Evict a cache entry two seconds from now.
//! let handle = pool.add_task(Duration::from_secs(2), Repeat::once(), |fired_at| {
//!     println!("evicting at {fired_at}");
//! })?;
//!
//! // Run a report every Monday at 05:00.
//! pool.add_week_cron(1, 5, 0, 0, Repeat::Forever, |_| run_report())?;
//!
//! // Changed our mind about the eviction.
//! pool.remove(handle);
//!
//! pool.close();
//! ```

/// Core scheduling engine: wheels, pools, cron computation, and dispatch.
pub mod core;
/// Configuration models for wheels, pools, and the dispatcher.
pub mod config;
/// Shared utilities.
pub mod util;
