//! Zero-copy row windows

use crate::error::Result;
use crate::store::{AccessGuard, Shared};
use crate::warmup::{Snapshot, SnapshotRequest};
use std::borrow::Cow;
use std::fmt;

/// Rectangular view of stored rows
///
/// After commit the view borrows the live buffer directly. Before commit the
/// warmup rows may still slide, so the view holds a consistent copy instead.
/// Either way the layout is identical: `height` rows of `width` pixels spaced
/// `stride_bytes` apart. The store cannot release its buffer while a window
/// is alive.
pub struct Window<'a> {
    data: Cow<'a, [u8]>,
    stride_bytes: usize,
    width: usize,
    height: usize,
    elem_size: usize,
    start_row: usize,
    x_offset: usize,
    top_time_sec: f64,
    _access: AccessGuard<'a>,
}

impl<'a> Window<'a> {
    /// Distance between consecutive rows in bytes
    pub fn stride_bytes(&self) -> usize {
        self.stride_bytes
    }

    /// Window width in pixels
    pub fn width(&self) -> usize {
        self.width
    }

    /// Window height in rows
    pub fn height(&self) -> usize {
        self.height
    }

    /// Bytes per pixel element
    pub fn elem_size(&self) -> usize {
        self.elem_size
    }

    /// Absolute index of the first row
    pub fn start_row(&self) -> usize {
        self.start_row
    }

    /// Horizontal offset within the ROI after clamping, in pixels
    pub fn x_offset(&self) -> usize {
        self.x_offset
    }

    /// Reconstructed acquisition time of the first row (Unix seconds)
    pub fn top_time_sec(&self) -> f64 {
        self.top_time_sec
    }

    /// `true` when the window borrows the live buffer
    pub fn is_zero_copy(&self) -> bool {
        matches!(self.data, Cow::Borrowed(_))
    }

    /// The strided span from the first pixel of the first row to the last pixel of the last row
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Pixels of row `i` of the window
    pub fn row(&self, i: usize) -> Option<&[u8]> {
        if i >= self.height {
            return None;
        }
        let start = i * self.stride_bytes;
        Some(&self.data[start..start + self.width * self.elem_size])
    }

    /// Rows top to bottom
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> + '_ {
        (0..self.height).filter_map(move |i| self.row(i))
    }

    /// Copy the window out tightly packed
    pub fn to_packed(&self) -> Vec<u8> {
        let mut packed = Vec::with_capacity(self.width * self.elem_size * self.height);
        for row in self.rows() {
            packed.extend_from_slice(row);
        }
        packed
    }
}

impl fmt::Debug for Window<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Window")
            .field("start_row", &self.start_row)
            .field("x_offset", &self.x_offset)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride_bytes", &self.stride_bytes)
            .field("top_time_sec", &self.top_time_sec)
            .field("zero_copy", &self.is_zero_copy())
            .finish()
    }
}

impl Shared {
    pub(crate) fn window(&self, start_row: usize, win_w: usize, win_h: usize, x0: usize) -> Result<Option<Window<'_>>> {
        let access = self.enter()?;
        let width = self.config.roi_width;
        if win_w == 0 || win_h == 0 || win_w > width || win_h > self.config.capacity_lines {
            return Ok(None);
        }

        let x_offset = x0.min(width - win_w);
        let req = SnapshotRequest {
            start_row,
            height: win_h,
            x_bytes: x_offset * self.elem_size,
            span: (win_h - 1) * self.row_bytes + win_w * self.elem_size,
        };
        let window = |data, top_time_sec, access| Window {
            data,
            stride_bytes: self.row_bytes,
            width: win_w,
            height: win_h,
            elem_size: self.elem_size,
            start_row,
            x_offset,
            top_time_sec,
            _access: access,
        };

        if !self.is_committed() {
            let snapshot = self.warmup.snapshot(
                req,
                || self.stored_lines.observe(),
                || self.is_committed(),
                || self.clock.now_unix_secs(),
            );
            match snapshot {
                Snapshot::Ready { data, top_time } => {
                    return Ok(Some(window(Cow::Owned(data), top_time, access)))
                }
                Snapshot::Unavailable => return Ok(None),
                Snapshot::Committed => {}
            }
        }

        let avail = self.stored_lines.observe();
        match start_row.checked_add(win_h) {
            Some(end) if end <= avail => {}
            _ => return Ok(None),
        }

        let offset = start_row * self.row_bytes + req.x_bytes;
        // SAFETY: the store is committed and every row below `avail` is
        // published, so these bytes are never written again; `access` keeps
        // the arena allocated for as long as the window lives
        let data = unsafe { self.arena.slice(offset, req.span) };
        let top_time = self.row_time_sec(start_row);
        Ok(Some(window(Cow::Borrowed(data), top_time, access)))
    }
}
