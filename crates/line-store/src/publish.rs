//! Single-writer publication of counters
//!
//! A [`Published`] value is written by exactly one thread after the data it
//! describes is in place, and read by any number of threads before they touch
//! that data. The release store / acquire load pairing lives here so call
//! sites cannot get it wrong.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Counter published with release semantics and observed with acquire semantics
#[derive(Debug, Default)]
pub struct Published {
    value: AtomicUsize,
}

impl Published {
    /// Create a counter with an initial value
    pub const fn new(value: usize) -> Self {
        Self {
            value: AtomicUsize::new(value),
        }
    }

    /// Make `value` visible along with every write that happened before this call
    pub fn publish(&self, value: usize) {
        self.value.store(value, Ordering::Release);
    }

    /// Publish `value` only if it moves the counter forward
    ///
    /// Writer-only; the check-then-store is not atomic against other writers.
    pub fn advance_to(&self, value: usize) -> bool {
        if value > self.value.load(Ordering::Relaxed) {
            self.publish(value);
            true
        } else {
            false
        }
    }

    /// Add `delta` and publish the sum
    pub fn add(&self, delta: usize) -> usize {
        self.value.fetch_add(delta, Ordering::Release) + delta
    }

    /// Load the counter; everything written before its publication is visible afterwards
    pub fn observe(&self) -> usize {
        self.value.load(Ordering::Acquire)
    }
}
