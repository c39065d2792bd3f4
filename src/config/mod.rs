//! Configuration models for wheels, pools, and the dispatcher.

pub mod scheduler;

pub use scheduler::{DispatcherConfig, PoolConfig, WheelConfig, MIN_INTERVAL};
