//! Line Store Implementation
//!
//! Single writer, many readers. The writer owns a [`LineStore`] and mutates it
//! through `&mut self`; readers hold cloned [`LineReader`] handles (or share
//! `&LineStore`) and never block the writer.

use crate::anchors::{Anchor, AnchorLog};
use crate::arena::Arena;
use crate::clock::{to_unix_secs, Clock, SystemClock};
use crate::config::{LineStoreConfig, PixelType};
use crate::error::{LineStoreError, Result};
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::publish::Published;
use crate::warmup::WarmupWindow;
use crate::window::Window;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a successful push call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushStatus {
    /// Every offered row was stored
    Stored { rows: usize },
    /// Capacity ran out mid-call; the rows that fit are stored and visible
    Truncated { written: usize, dropped: usize },
    /// No capacity left; nothing was written
    Full,
}

impl PushStatus {
    /// `true` only when the full requested row count was written
    pub fn is_complete(&self) -> bool {
        matches!(self, PushStatus::Stored { .. })
    }

    /// Rows written by the call
    pub fn rows_written(&self) -> usize {
        match *self {
            PushStatus::Stored { rows } => rows,
            PushStatus::Truncated { written, .. } => written,
            PushStatus::Full => 0,
        }
    }
}

/// Point-in-time store health snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub capacity_lines: usize,
    pub warmup_lines: usize,
    /// Rows currently readable
    pub stored_lines: usize,
    /// Rows ever accepted, warmup rows that slid out included
    pub head_total: usize,
    pub committed: bool,
    /// Time anchors recorded since commit
    pub anchors: usize,
    /// stored_lines / capacity_lines
    pub fill_ratio: f64,
}

/// State shared between the writer and every reader handle
pub(crate) struct Shared {
    pub(crate) config: LineStoreConfig,
    pub(crate) row_bytes: usize,
    pub(crate) source_row_bytes: usize,
    pub(crate) roi_bytes: usize,
    pub(crate) elem_size: usize,
    pub(crate) arena: Arena,
    pub(crate) warmup: WarmupWindow,
    pub(crate) anchors: AnchorLog,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) committed: AtomicBool,
    pub(crate) commit_base: Published,
    pub(crate) stored_lines: Published,
    pub(crate) head_total: Published,
    lifecycle: Lifecycle,
}

/// Access ticket keeping the buffer alive for the duration of an operation
pub(crate) struct AccessGuard<'a> {
    shared: &'a Shared,
}

impl Drop for AccessGuard<'_> {
    fn drop(&mut self) {
        let shared = self.shared;
        // SAFETY: the lifecycle runs the release closure at most once, after
        // the last ticket is returned
        shared.lifecycle.leave(|| unsafe { shared.arena.release() });
    }
}

impl Shared {
    pub(crate) fn enter(&self) -> Result<AccessGuard<'_>> {
        // SAFETY: see AccessGuard::drop
        if self.lifecycle.try_enter(|| unsafe { self.arena.release() }) {
            Ok(AccessGuard { shared: self })
        } else {
            Err(LineStoreError::Disposed)
        }
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        match self.lifecycle.state() {
            LifecycleState::Active => Ok(()),
            _ => Err(LineStoreError::Disposed),
        }
    }

    pub(crate) fn lifecycle_state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub(crate) fn dispose(&self) -> bool {
        // SAFETY: see AccessGuard::drop
        let first = self.lifecycle.dispose(|| unsafe { self.arena.release() });
        if first {
            info!(
                "Line store disposed: stored={} received={}",
                self.stored_lines.observe(),
                self.head_total.observe()
            );
        }
        first
    }

    pub(crate) fn is_committed(&self) -> bool {
        self.committed.load(Ordering::Acquire)
    }

    /// ROI slice of source row `i`; `src` was length-checked by the caller
    fn source_row<'s>(&self, src: &'s [u8], stride: usize, i: usize) -> &'s [u8] {
        let start = i * stride + self.roi_bytes;
        &src[start..start + self.row_bytes]
    }

    fn fallback_time(&self) -> f64 {
        self.warmup
            .last_time()
            .unwrap_or_else(|| self.clock.now_unix_secs())
    }

    /// Acquisition time of absolute row `row`, which must be stored
    pub(crate) fn row_time_sec(&self, row: usize) -> f64 {
        if !self.is_committed() {
            return self.warmup.row_time(row).unwrap_or_else(|| self.fallback_time());
        }

        let base = self.commit_base.observe();
        if row < base {
            return self.warmup.row_time(row).unwrap_or_else(|| self.fallback_time());
        }
        self.anchors
            .time_at(row - base)
            .unwrap_or_else(|| self.fallback_time())
    }

    pub(crate) fn stats(&self) -> StoreStats {
        let stored_lines = self.stored_lines.observe();
        StoreStats {
            capacity_lines: self.config.capacity_lines,
            warmup_lines: self.config.warmup_lines,
            stored_lines,
            head_total: self.head_total.observe(),
            committed: self.is_committed(),
            anchors: self.anchors.len(),
            fill_ratio: stored_lines as f64 / self.config.capacity_lines as f64,
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if self.lifecycle.take_unreleased() {
            // SAFETY: no handle or ticket remains and the arena was not released
            unsafe { self.arena.release() };
        }
    }
}

/// Writer-private cursor state
#[derive(Debug, Default)]
struct WriterState {
    /// Rows filled in the warmup window (0..=warmup_lines)
    warmup_count: usize,
    /// Next absolute row to write after commit
    write_index: usize,
    /// Rows present at commit; absolute row minus this is the logical row
    commit_base: usize,
}

impl WriterState {
    fn push_warmup(&mut self, shared: &Shared, src: &[u8], rows: usize, stride: usize, t: f64) {
        shared.warmup.mutate(|window| {
            let capacity = window.capacity();
            let mut first = 0;
            let mut remaining = rows;

            if self.warmup_count < capacity {
                let take = remaining.min(capacity - self.warmup_count);
                for i in 0..take {
                    window.write_row(self.warmup_count + i, shared.source_row(src, stride, i), t);
                }
                self.warmup_count += take;
                shared.stored_lines.publish(self.warmup_count);
                first = take;
                remaining -= take;
            }

            if remaining >= capacity {
                // keep only the freshest `capacity` rows of the block
                let tail = first + remaining - capacity;
                debug!("Warmup wrap: {} rows replace the window", capacity);
                for i in 0..capacity {
                    window.write_row(i, shared.source_row(src, stride, tail + i), t);
                }
                shared.stored_lines.publish(capacity);
            } else if remaining > 0 {
                let keep = capacity - remaining;
                debug!("Warmup slide: {} rows in, {} kept", remaining, keep);
                window.slide(remaining);
                for i in 0..remaining {
                    window.write_row(keep + i, shared.source_row(src, stride, first + i), t);
                }
                shared.stored_lines.publish(capacity);
            }

            window.set_last_time(t);
        });
        shared.head_total.add(rows);
    }

    fn push_linear(&mut self, shared: &Shared, src: &[u8], rows: usize, stride: usize, t: f64) -> PushStatus {
        let remain = shared.config.capacity_lines - self.write_index;
        if remain == 0 {
            debug!("Push of {} rows refused: store full", rows);
            return PushStatus::Full;
        }
        let count = rows.min(remain);

        let start_logical = self.write_index - self.commit_base;
        if start_logical == 0 {
            // first linear block starts where the commit anchor already sits
            shared.anchors.refine_last(t);
        } else {
            let recorded = shared.anchors.push(start_logical, t);
            debug_assert!(recorded, "anchor log sized for one anchor per row");
        }

        let row_bytes = shared.row_bytes;
        let dst = self.write_index * row_bytes;
        // SAFETY: rows at and beyond write_index are not yet published, so no
        // reader can be looking at them, and only this writer writes
        unsafe {
            if shared.roi_bytes == 0 && stride == row_bytes {
                shared.arena.write(dst, &src[..count * row_bytes]);
            } else {
                for i in 0..count {
                    shared
                        .arena
                        .write(dst + i * row_bytes, shared.source_row(src, stride, i));
                }
            }
        }

        self.write_index += count;
        shared.head_total.add(count);
        shared.stored_lines.advance_to(self.write_index);

        if count == rows {
            PushStatus::Stored { rows }
        } else {
            warn!(
                "Line store filled mid-block: wrote {} of {} rows",
                count, rows
            );
            PushStatus::Truncated {
                written: count,
                dropped: rows - count,
            }
        }
    }
}

/// Fixed-capacity line buffer for a line-scan sensor
///
/// Rows accumulate in a sliding warmup window until [`commit`](Self::commit),
/// then append linearly until capacity is exhausted.
pub struct LineStore {
    reader: LineReader,
    writer: WriterState,
}

impl LineStore {
    /// Create a store stamping untimed pushes with the system clock
    pub fn new(config: LineStoreConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a store with an explicit time source
    pub fn with_clock(config: LineStoreConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let total_bytes = config.validate()?;
        let elem_size = config.pixel_type.elem_size();
        let row_bytes = config.row_bytes();

        let warmup = WarmupWindow::new(config.warmup_lines, row_bytes)?;
        // commit anchor plus at most one per stored linear row
        let anchors = AnchorLog::with_max(config.capacity_lines + 1)?;
        // last: the arena is only freed through the lifecycle once `Shared` exists
        let arena = Arena::allocate(total_bytes)?;
        info!(
            "Creating line store: source_width={} roi=[{}, +{}) capacity={} warmup={} pixel={:?} ({} bytes)",
            config.source_width,
            config.roi_x,
            config.roi_width,
            config.capacity_lines,
            config.warmup_lines,
            config.pixel_type,
            total_bytes
        );

        let shared = Shared {
            row_bytes,
            source_row_bytes: config.source_row_bytes(),
            roi_bytes: config.roi_x * elem_size,
            elem_size,
            arena,
            warmup,
            anchors,
            clock,
            committed: AtomicBool::new(false),
            commit_base: Published::new(0),
            stored_lines: Published::new(0),
            head_total: Published::new(0),
            lifecycle: Lifecycle::new(),
            config,
        };

        Ok(Self {
            reader: LineReader {
                shared: Arc::new(shared),
            },
            writer: WriterState::default(),
        })
    }

    /// A cloneable read handle for other threads
    pub fn reader(&self) -> LineReader {
        self.reader.clone()
    }

    /// Push `rows` source rows stamped with the current time
    pub fn push_block(&mut self, src: &[u8], rows: usize, src_stride: usize) -> Result<PushStatus> {
        let t = self.reader.shared.clock.now_unix_secs();
        self.push_block_at(src, rows, src_stride, t)
    }

    /// Push `rows` source rows acquired at `acquired` (UTC)
    pub fn push_block_at_utc(
        &mut self,
        src: &[u8],
        rows: usize,
        src_stride: usize,
        acquired: DateTime<Utc>,
    ) -> Result<PushStatus> {
        self.push_block_at(src, rows, src_stride, to_unix_secs(acquired))
    }

    /// Push `rows` source rows acquired at `acquired_secs` (Unix seconds)
    ///
    /// `src` holds rows of `src_stride` bytes, each at least a full source row.
    /// Before commit the rows feed the warmup window; afterwards they are
    /// appended. Capacity exhaustion is reported through [`PushStatus`].
    pub fn push_block_at(
        &mut self,
        src: &[u8],
        rows: usize,
        src_stride: usize,
        acquired_secs: f64,
    ) -> Result<PushStatus> {
        let shared = &*self.reader.shared;
        let _access = shared.enter()?;
        if rows == 0 {
            return Ok(PushStatus::Stored { rows: 0 });
        }
        if src_stride < shared.source_row_bytes {
            return Err(LineStoreError::InvalidArgument(format!(
                "source stride {} is smaller than a source row ({} bytes)",
                src_stride, shared.source_row_bytes
            )));
        }
        let required = (rows - 1)
            .checked_mul(src_stride)
            .and_then(|n| n.checked_add(shared.source_row_bytes));
        match required {
            Some(required) if src.len() >= required => {}
            _ => {
                return Err(LineStoreError::InvalidArgument(format!(
                    "source holds {} bytes, {} rows at stride {} need more",
                    src.len(),
                    rows,
                    src_stride
                )))
            }
        }

        if shared.is_committed() {
            Ok(self.writer.push_linear(shared, src, rows, src_stride, acquired_secs))
        } else {
            self.writer.push_warmup(shared, src, rows, src_stride, acquired_secs);
            Ok(PushStatus::Stored { rows })
        }
    }

    /// Freeze the warmup window and switch to linear append; later calls are no-ops
    pub fn commit(&mut self) -> Result<()> {
        let shared = &*self.reader.shared;
        let _access = shared.enter()?;
        if shared.is_committed() {
            return Ok(());
        }

        let t = shared.fallback_time();
        shared.warmup.set_last_time(t);

        let count = self.writer.warmup_count;
        let frozen = shared.warmup.copy_rows(count);
        // SAFETY: readers only borrow the arena once `committed` is published below
        unsafe { shared.arena.write(0, &frozen) };
        shared.anchors.push(0, t);

        self.writer.write_index = count;
        self.writer.commit_base = count;
        shared.commit_base.publish(count);
        shared.stored_lines.publish(count);
        shared.committed.store(true, Ordering::Release);

        info!("Line store committed: {} warmup rows frozen at t={:.6}", count, t);
        Ok(())
    }

    /// Release the buffer; idempotent
    pub fn dispose(&self) {
        self.reader.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.reader.is_disposed()
    }

    pub fn is_committed(&self) -> bool {
        self.reader.is_committed()
    }

    pub fn config(&self) -> &LineStoreConfig {
        self.reader.config()
    }

    pub fn source_width(&self) -> usize {
        self.reader.source_width()
    }

    pub fn roi_x(&self) -> usize {
        self.reader.roi_x()
    }

    /// ROI width in pixels
    pub fn width(&self) -> usize {
        self.reader.width()
    }

    pub fn capacity_lines(&self) -> usize {
        self.reader.capacity_lines()
    }

    pub fn warmup_lines(&self) -> usize {
        self.reader.warmup_lines()
    }

    pub fn pixel_type(&self) -> PixelType {
        self.reader.pixel_type()
    }

    pub fn elem_size(&self) -> usize {
        self.reader.elem_size()
    }

    pub fn row_bytes(&self) -> usize {
        self.reader.row_bytes()
    }

    pub fn source_row_bytes(&self) -> usize {
        self.reader.source_row_bytes()
    }

    /// Rows ever received
    pub fn head_total(&self) -> usize {
        self.reader.head_total()
    }

    /// Rows currently readable
    pub fn stored_lines(&self) -> usize {
        self.reader.stored_lines()
    }

    pub fn stats(&self) -> StoreStats {
        self.reader.stats()
    }

    pub fn time_anchors(&self) -> Result<Vec<Anchor>> {
        self.reader.time_anchors()
    }

    pub fn row_time(&self, row: usize) -> Result<Option<f64>> {
        self.reader.row_time(row)
    }

    pub fn try_get_window(&self, start_row: usize, win_w: usize, win_h: usize, x0: usize) -> Result<Option<Window<'_>>> {
        self.reader.try_get_window(start_row, win_w, win_h, x0)
    }

    pub fn try_get_latest_window(&self, win_w: usize, win_h: usize, x0: usize) -> Result<Option<Window<'_>>> {
        self.reader.try_get_latest_window(win_w, win_h, x0)
    }
}

impl Drop for LineStore {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for LineStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineStore")
            .field("config", self.config())
            .field("writer", &self.writer)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Read handle onto a [`LineStore`]
///
/// Cheap to clone and safe to use from any thread concurrently with the writer.
#[derive(Clone)]
pub struct LineReader {
    pub(crate) shared: Arc<Shared>,
}

impl LineReader {
    /// Dispose the underlying store; idempotent
    pub fn dispose(&self) {
        self.shared.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.lifecycle_state() != LifecycleState::Active
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.shared.lifecycle_state()
    }

    pub fn is_committed(&self) -> bool {
        self.shared.is_committed()
    }

    pub fn config(&self) -> &LineStoreConfig {
        &self.shared.config
    }

    pub fn source_width(&self) -> usize {
        self.shared.config.source_width
    }

    pub fn roi_x(&self) -> usize {
        self.shared.config.roi_x
    }

    /// ROI width in pixels
    pub fn width(&self) -> usize {
        self.shared.config.roi_width
    }

    pub fn capacity_lines(&self) -> usize {
        self.shared.config.capacity_lines
    }

    pub fn warmup_lines(&self) -> usize {
        self.shared.config.warmup_lines
    }

    pub fn pixel_type(&self) -> PixelType {
        self.shared.config.pixel_type
    }

    pub fn elem_size(&self) -> usize {
        self.shared.elem_size
    }

    pub fn row_bytes(&self) -> usize {
        self.shared.row_bytes
    }

    pub fn source_row_bytes(&self) -> usize {
        self.shared.source_row_bytes
    }

    /// Rows ever received
    pub fn head_total(&self) -> usize {
        self.shared.head_total.observe()
    }

    /// Rows currently readable
    pub fn stored_lines(&self) -> usize {
        self.shared.stored_lines.observe()
    }

    pub fn stats(&self) -> StoreStats {
        self.shared.stats()
    }

    /// Time anchors recorded since commit, oldest first
    pub fn time_anchors(&self) -> Result<Vec<Anchor>> {
        self.shared.ensure_active()?;
        Ok(self.shared.anchors.to_vec())
    }

    /// Reconstructed acquisition time of a stored row
    pub fn row_time(&self, row: usize) -> Result<Option<f64>> {
        let _access = self.shared.enter()?;
        if row >= self.shared.stored_lines.observe() {
            return Ok(None);
        }
        Ok(Some(self.shared.row_time_sec(row)))
    }

    /// Window of `win_h` rows starting at absolute row `start_row`
    ///
    /// `x0` is clamped so the window stays inside the ROI. `Ok(None)` means
    /// the rows are not stored yet or the geometry does not fit.
    pub fn try_get_window(&self, start_row: usize, win_w: usize, win_h: usize, x0: usize) -> Result<Option<Window<'_>>> {
        self.shared.window(start_row, win_w, win_h, x0)
    }

    /// Window over the most recent `win_h` stored rows
    pub fn try_get_latest_window(&self, win_w: usize, win_h: usize, x0: usize) -> Result<Option<Window<'_>>> {
        self.shared.ensure_active()?;
        let avail = self.shared.stored_lines.observe();
        if win_h == 0 || avail < win_h {
            return Ok(None);
        }
        self.shared.window(avail - win_h, win_w, win_h, x0)
    }
}

impl std::fmt::Debug for LineReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineReader")
            .field("state", &self.lifecycle_state())
            .field("stats", &self.stats())
            .finish()
    }
}
