//! Core scheduling engine: tasks, wheels, cron computation, dispatch, and
//! the sharded wheel pool.

pub mod cron;
pub mod dispatch;
pub mod error;
pub mod pool;
pub mod task;
pub mod wheel;

pub use cron::CronSpec;
pub use dispatch::{Dispatcher, DispatcherStats};
pub use error::{DispatchError, SchedulerError};
pub use pool::WheelPool;
pub use task::{Handler, Repeat, TaskHandle, TaskId};
pub use wheel::Wheel;
