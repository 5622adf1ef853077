//! Time anchors for the linear region
//!
//! One `(logical row, timestamp)` anchor is recorded per linear push. Row
//! timestamps are interpolated between neighbouring anchors and extrapolated
//! past the last one with the slope of the final pair.
//!
//! Storage is a fixed directory of lazily allocated chunks. Chunks are never
//! moved once created, so readers searching the log never race with growth.

use crate::arena::try_boxed_slice;
use crate::error::Result;
use crate::publish::Published;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;

/// Anchors per chunk
const CHUNK: usize = 256;

/// A recorded anchor point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    /// Row index relative to the commit point
    pub start_logical: usize,
    /// Acquisition time of that row in Unix seconds
    pub time_sec: f64,
}

#[derive(Default)]
struct AnchorSlot {
    start: AtomicUsize,
    time: AtomicU64,
}

pub(crate) struct AnchorLog {
    chunks: Box<[OnceLock<Box<[AnchorSlot]>>]>,
    len: Published,
    max: usize,
}

impl AnchorLog {
    /// Log able to hold `max` anchors without relocating any of them
    pub fn with_max(max: usize) -> Result<Self> {
        Ok(Self {
            chunks: try_boxed_slice(max.div_ceil(CHUNK), OnceLock::new)?,
            len: Published::new(0),
            max,
        })
    }

    pub fn len(&self) -> usize {
        self.len.observe()
    }

    /// Append an anchor; writer-only. Returns `false` if the log is full.
    pub fn push(&self, start_logical: usize, time_sec: f64) -> bool {
        let index = self.len.observe();
        if index >= self.max {
            return false;
        }
        debug_assert!(index == 0 || self.get(index - 1).is_some_and(|prev| start_logical > prev.start_logical));

        let chunk = self.chunks[index / CHUNK]
            .get_or_init(|| (0..CHUNK).map(|_| AnchorSlot::default()).collect());
        let slot = &chunk[index % CHUNK];
        slot.start.store(start_logical, Ordering::Relaxed);
        slot.time.store(time_sec.to_bits(), Ordering::Relaxed);
        self.len.publish(index + 1);
        true
    }

    /// Replace the timestamp of the newest anchor; writer-only
    pub fn refine_last(&self, time_sec: f64) {
        let last = self.len.observe().checked_sub(1).and_then(|index| self.slot(index));
        if let Some(slot) = last {
            slot.time.store(time_sec.to_bits(), Ordering::Relaxed);
        }
    }

    /// Anchor `index`; `None` unless its chunk has been written
    ///
    /// Only indices below an observed length hold published values.
    pub fn get(&self, index: usize) -> Option<Anchor> {
        self.slot(index).map(|slot| Anchor {
            start_logical: slot.start.load(Ordering::Relaxed),
            time_sec: f64::from_bits(slot.time.load(Ordering::Relaxed)),
        })
    }

    /// Published anchors, oldest first
    pub fn to_vec(&self) -> Vec<Anchor> {
        (0..self.len()).filter_map(|i| self.get(i)).collect()
    }

    /// Timestamp of logical row `row`, or `None` before the first anchor exists
    pub fn time_at(&self, row: usize) -> Option<f64> {
        let n = self.len.observe();
        if n == 0 {
            return None;
        }

        // greatest k with start(k) <= row
        let (mut lo, mut hi) = (0usize, n);
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.get(mid)?.start_logical <= row {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        let Some(k) = lo.checked_sub(1) else {
            return self.get(0).map(|anchor| anchor.time_sec);
        };

        let (prev, next) = if k == n - 1 {
            if n < 2 {
                return self.get(k).map(|anchor| anchor.time_sec);
            }
            (self.get(n - 2)?, self.get(n - 1)?)
        } else {
            (self.get(k)?, self.get(k + 1)?)
        };
        let base = self.get(k)?;

        let drow = next.start_logical.saturating_sub(prev.start_logical);
        if drow == 0 {
            return Some(base.time_sec);
        }
        let slope = (next.time_sec - prev.time_sec) / drow as f64;
        Some(base.time_sec + (row - base.start_logical) as f64 * slope)
    }

    fn slot(&self, index: usize) -> Option<&AnchorSlot> {
        let chunk = self.chunks.get(index / CHUNK)?.get()?;
        Some(&chunk[index % CHUNK])
    }
}
