//! Time sources for default acquisition timestamps

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

/// Wall-clock source in Unix seconds
pub trait Clock: Send + Sync {
    /// Current time as fractional Unix seconds
    fn now_unix_secs(&self) -> f64;
}

/// System UTC clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_secs(&self) -> f64 {
        to_unix_secs(Utc::now())
    }
}

/// Manually driven clock for simulations and tests
#[derive(Debug, Default)]
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    /// Create a clock frozen at `secs`
    pub fn new(secs: f64) -> Self {
        Self {
            bits: AtomicU64::new(secs.to_bits()),
        }
    }

    /// Jump to `secs`
    pub fn set(&self, secs: f64) {
        self.bits.store(secs.to_bits(), Ordering::Relaxed);
    }

    /// Move forward by `secs`
    pub fn advance(&self, secs: f64) {
        let now = f64::from_bits(self.bits.load(Ordering::Relaxed));
        self.set(now + secs);
    }
}

impl Clock for ManualClock {
    fn now_unix_secs(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// Convert a UTC instant to fractional Unix seconds
pub fn to_unix_secs(t: DateTime<Utc>) -> f64 {
    t.timestamp() as f64 + f64::from(t.timestamp_subsec_nanos()) * 1e-9
}
