//! Pre-commit sliding window of the most recent rows
//!
//! Rows and their per-row timestamps live in atomic staging storage guarded by
//! a sequence counter, so readers can take consistent snapshots while the
//! writer slides the window in place. On commit the rows are frozen into the
//! head of the arena.

use crate::arena::try_boxed_slice;
use crate::error::Result;
use std::sync::atomic::{fence, AtomicU64, AtomicU8, AtomicUsize, Ordering};

/// Snapshot attempts before a reader reports the window unavailable
const SNAPSHOT_RETRIES: usize = 64;

/// Timestamp slot value meaning "never stamped"
const UNSET: u64 = u64::MAX;

fn load_time(slot: &AtomicU64) -> Option<f64> {
    match slot.load(Ordering::Relaxed) {
        UNSET => None,
        bits => Some(f64::from_bits(bits)),
    }
}

fn store_time(slot: &AtomicU64, secs: f64) {
    slot.store(secs.to_bits(), Ordering::Relaxed);
}

/// Outcome of a pre-commit window read
pub(crate) enum Snapshot {
    Ready { data: Vec<u8>, top_time: f64 },
    Unavailable,
    Committed,
}

/// Geometry of a strided read out of the warmup rows
#[derive(Debug, Clone, Copy)]
pub(crate) struct SnapshotRequest {
    pub start_row: usize,
    pub height: usize,
    pub x_bytes: usize,
    pub span: usize,
}

pub(crate) struct WarmupWindow {
    rows: Box<[AtomicU8]>,
    times: Box<[AtomicU64]>,
    last_time: AtomicU64,
    seq: AtomicUsize,
    row_bytes: usize,
    capacity: usize,
}

impl WarmupWindow {
    /// Staging for `capacity` rows; `capacity * row_bytes` must not overflow
    pub fn new(capacity: usize, row_bytes: usize) -> Result<Self> {
        Ok(Self {
            rows: try_boxed_slice(capacity * row_bytes, || AtomicU8::new(0))?,
            times: try_boxed_slice(capacity, || AtomicU64::new(UNSET))?,
            last_time: AtomicU64::new(UNSET),
            seq: AtomicUsize::new(0),
            row_bytes,
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recent block timestamp seen during warmup
    pub fn last_time(&self) -> Option<f64> {
        load_time(&self.last_time)
    }

    pub fn set_last_time(&self, secs: f64) {
        store_time(&self.last_time, secs);
    }

    /// Stamp recorded for warmup row `row`
    pub fn row_time(&self, row: usize) -> Option<f64> {
        self.times.get(row).and_then(load_time)
    }

    /// Run a writer-side mutation inside an odd sequence number
    pub fn mutate<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        let seq = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        let out = f(self);
        self.seq.store(seq.wrapping_add(2), Ordering::Release);
        out
    }

    /// Overwrite row `row` and its stamp
    pub fn write_row(&self, row: usize, src: &[u8], secs: f64) {
        let start = row * self.row_bytes;
        for (dst, &byte) in self.rows[start..start + self.row_bytes].iter().zip(src) {
            dst.store(byte, Ordering::Relaxed);
        }
        store_time(&self.times[row], secs);
    }

    /// Move rows `shift..capacity` to `0..capacity - shift`, stamps included
    pub fn slide(&self, shift: usize) {
        let keep = self.capacity - shift;
        let offset = shift * self.row_bytes;
        for i in 0..keep * self.row_bytes {
            let byte = self.rows[i + offset].load(Ordering::Relaxed);
            self.rows[i].store(byte, Ordering::Relaxed);
        }
        for y in 0..keep {
            let bits = self.times[y + shift].load(Ordering::Relaxed);
            self.times[y].store(bits, Ordering::Relaxed);
        }
    }

    /// Copy the first `rows` rows out, packed at `row_bytes` stride
    pub fn copy_rows(&self, rows: usize) -> Vec<u8> {
        self.rows[..rows * self.row_bytes]
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .collect()
    }

    /// Consistent strided copy of stored rows plus the stamp of the first
    ///
    /// `stored` and `committed` are re-read on every attempt; once the store
    /// commits the caller must read from the frozen arena instead.
    pub fn snapshot(
        &self,
        req: SnapshotRequest,
        stored: impl Fn() -> usize,
        committed: impl Fn() -> bool,
        fallback_time: impl Fn() -> f64,
    ) -> Snapshot {
        for _ in 0..SNAPSHOT_RETRIES {
            let before = self.seq.load(Ordering::Acquire);
            if committed() {
                return Snapshot::Committed;
            }
            if before % 2 == 1 {
                std::hint::spin_loop();
                continue;
            }

            let avail = stored().min(self.capacity);
            let end = match req.start_row.checked_add(req.height) {
                Some(end) if end <= avail => end,
                _ => return Snapshot::Unavailable,
            };
            debug_assert!(end > req.start_row);

            let offset = req.start_row * self.row_bytes + req.x_bytes;
            let data: Vec<u8> = self.rows[offset..offset + req.span]
                .iter()
                .map(|b| b.load(Ordering::Relaxed))
                .collect();
            let top_time = self
                .row_time(req.start_row)
                .or_else(|| self.last_time())
                .unwrap_or_else(&fallback_time);

            fence(Ordering::Acquire);
            if self.seq.load(Ordering::Relaxed) == before {
                return Snapshot::Ready { data, top_time };
            }
        }
        Snapshot::Unavailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LineStoreError;

    fn filled(capacity: usize, row_bytes: usize) -> WarmupWindow {
        let window = WarmupWindow::new(capacity, row_bytes).unwrap();
        window.mutate(|w| {
            for row in 0..capacity {
                w.write_row(row, &vec![row as u8; row_bytes], row as f64);
            }
        });
        window
    }

    #[test]
    fn test_slide_moves_rows_and_stamps() {
        let window = filled(4, 2);
        window.mutate(|w| w.slide(1));
        assert_eq!(window.copy_rows(3), vec![1, 1, 2, 2, 3, 3]);
        assert_eq!(window.row_time(0), Some(1.0));
        assert_eq!(window.row_time(2), Some(3.0));
    }

    #[test]
    fn test_snapshot_respects_stored() {
        let window = filled(4, 2);
        let req = SnapshotRequest {
            start_row: 1,
            height: 2,
            x_bytes: 1,
            span: 3,
        };

        match window.snapshot(req, || 4, || false, || 0.0) {
            Snapshot::Ready { data, top_time } => {
                assert_eq!(data, vec![1, 2, 2]);
                assert_eq!(top_time, 1.0);
            }
            _ => panic!("expected snapshot"),
        }
        assert!(matches!(window.snapshot(req, || 2, || false, || 0.0), Snapshot::Unavailable));
        assert!(matches!(window.snapshot(req, || 4, || true, || 0.0), Snapshot::Committed));
    }

    #[test]
    fn test_unstamped_rows_fall_back() {
        let window = WarmupWindow::new(2, 1).unwrap();
        assert_eq!(window.row_time(0), None);
        assert_eq!(window.row_time(5), None);
        window.set_last_time(7.5);
        assert_eq!(window.last_time(), Some(7.5));
    }

    #[test]
    fn test_staging_allocation_failure_is_reported() {
        let err = WarmupWindow::new(isize::MAX as usize, 1).err();
        assert_eq!(err, Some(LineStoreError::Allocation { bytes: isize::MAX as usize }));
    }
}
