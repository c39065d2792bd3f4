//! Wheel, pool, and dispatcher configuration structures.
//!
//! Scheduler configuration is coercive rather than strict: out-of-range
//! values are clamped to the nearest valid value instead of failing the
//! constructor. Slot and pool counts round up to the next power of two so the
//! wheels can replace modulo with a bitmask.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::pow2::ceil_pow2;

/// Shortest tick interval a wheel will accept.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for a single wheel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WheelConfig {
    /// Tick interval; the wheel pointer advances one slot per interval.
    pub interval: Duration,
    /// Number of slots in the circular array.
    pub slot_count: usize,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            slot_count: 512,
        }
    }
}

impl WheelConfig {
    /// Clamp the interval to at least [`MIN_INTERVAL`] and round the slot
    /// count up to a power of two (minimum 1).
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            interval: self.interval.max(MIN_INTERVAL),
            slot_count: ceil_pow2(self.slot_count),
        }
    }
}

/// Configuration for a sharded pool of wheels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of independent wheels; tasks are spread round-robin.
    pub pool_size: usize,
    /// Configuration applied to every wheel in the pool.
    pub wheel: WheelConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: num_cpus::get(),
            wheel: WheelConfig::default(),
        }
    }
}

impl PoolConfig {
    /// Normalize the pool size to a power of two and the wheel config along
    /// with it.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            pool_size: ceil_pow2(self.pool_size),
            wheel: self.wheel.normalized(),
        }
    }

    /// Parse a pool configuration from a JSON string and normalize it.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: PoolConfig =
            serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        Ok(cfg.normalized())
    }
}

/// Configuration for the execution dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Number of worker threads invoking callbacks.
    pub workers: usize,
    /// Capacity of the pending-callback queue; submissions beyond this are
    /// dropped rather than blocking the tick thread.
    pub queue_depth: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            queue_depth: 64 * 1024,
        }
    }
}

impl DispatcherConfig {
    /// Clamp worker count and queue depth to at least one.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            workers: self.workers.max(1),
            queue_depth: self.queue_depth.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wheel_config_coerces_instead_of_failing() {
        let cfg = WheelConfig {
            interval: Duration::ZERO,
            slot_count: 0,
        }
        .normalized();
        assert_eq!(cfg.interval, MIN_INTERVAL);
        assert_eq!(cfg.slot_count, 1);

        let cfg = WheelConfig {
            interval: Duration::from_secs(1),
            slot_count: 60,
        }
        .normalized();
        assert_eq!(cfg.slot_count, 64);
    }

    #[test]
    fn pool_config_rounds_pool_size() {
        let cfg = PoolConfig {
            pool_size: 6,
            wheel: WheelConfig::default(),
        }
        .normalized();
        assert_eq!(cfg.pool_size, 8);
    }

    #[test]
    fn dispatcher_config_minimums() {
        let cfg = DispatcherConfig {
            workers: 0,
            queue_depth: 0,
        }
        .normalized();
        assert_eq!(cfg.workers, 1);
        assert_eq!(cfg.queue_depth, 1);
    }

    #[test]
    fn pool_config_from_json() {
        let cfg = PoolConfig::from_json_str(
            r#"{"pool_size": 3, "wheel": {"interval": {"secs": 1, "nanos": 0}, "slot_count": 100}}"#,
        )
        .unwrap();
        assert_eq!(cfg.pool_size, 4);
        assert_eq!(cfg.wheel.slot_count, 128);

        assert!(PoolConfig::from_json_str("not json").is_err());
    }
}
