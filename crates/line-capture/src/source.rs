//! Line sources
//!
//! A [`LineSource`] delivers blocks of full-width sensor rows together with the
//! acquisition time of the first row in the block.

use crate::settings::CaptureSettings;
use line_store::PixelType;

/// A block of rows as delivered by a source
#[derive(Debug, Clone, PartialEq)]
pub struct LineBlock {
    /// Row bytes, `stride_bytes` apart
    pub data: Vec<u8>,
    /// Rows in the block
    pub rows: usize,
    /// Distance between consecutive rows in bytes
    pub stride_bytes: usize,
    /// Acquisition time of the first row (Unix seconds)
    pub acquired_unix_secs: f64,
}

/// Producer of sensor rows
pub trait LineSource: Send {
    /// Next block of at most `rows` rows, or `None` once exhausted
    fn next_block(&mut self, rows: usize) -> Option<LineBlock>;

    /// Pixels per delivered row
    fn source_width(&self) -> usize;

    /// Pixel element width
    fn pixel_type(&self) -> PixelType;
}

/// Deterministic source for tests and demos
///
/// Pixel `x` of line `n` holds `(n + x) mod 256` (U8) or
/// `(n + x) mod 65536` little-endian (U16). Line `n` is acquired at
/// `start + n / line_rate_hz`.
#[derive(Debug, Clone)]
pub struct SyntheticLineSource {
    source_width: usize,
    pixel_type: PixelType,
    line_rate_hz: f64,
    start_unix_secs: f64,
    stride_padding: usize,
    line_limit: Option<usize>,
    next_line: usize,
}

impl SyntheticLineSource {
    /// Create a source starting at `start_unix_secs`
    pub fn new(source_width: usize, pixel_type: PixelType, line_rate_hz: f64, start_unix_secs: f64) -> Self {
        Self {
            source_width,
            pixel_type,
            line_rate_hz,
            start_unix_secs,
            stride_padding: 0,
            line_limit: None,
            next_line: 0,
        }
    }

    /// Source matching the store geometry and rate in `settings`
    pub fn from_settings(settings: &CaptureSettings, start_unix_secs: f64) -> Self {
        Self::new(
            settings.store.source_width,
            settings.store.pixel_type,
            settings.line_rate_hz,
            start_unix_secs,
        )
        .with_stride_padding(settings.stride_padding)
    }

    /// Append `padding` zero bytes after every row
    pub fn with_stride_padding(mut self, padding: usize) -> Self {
        self.stride_padding = padding;
        self
    }

    /// Stop after `limit` lines in total
    pub fn with_line_limit(mut self, limit: usize) -> Self {
        self.line_limit = Some(limit);
        self
    }

    /// Lines produced so far
    pub fn lines_produced(&self) -> usize {
        self.next_line
    }

    /// Bytes between consecutive rows
    pub fn stride_bytes(&self) -> usize {
        self.source_width * self.pixel_type.elem_size() + self.stride_padding
    }

    /// Expected bytes of pixel `x` on line `line`
    pub fn pixel(pixel_type: PixelType, line: usize, x: usize) -> Vec<u8> {
        match pixel_type {
            PixelType::U8 => vec![(line.wrapping_add(x) % 256) as u8],
            PixelType::U16 => ((line.wrapping_add(x) % 65536) as u16).to_le_bytes().to_vec(),
        }
    }

    /// Acquisition time of line `line`
    pub fn line_time(&self, line: usize) -> f64 {
        self.start_unix_secs + line as f64 / self.line_rate_hz
    }

    fn fill_row(&self, line: usize, row: &mut [u8]) {
        match self.pixel_type {
            PixelType::U8 => {
                for (x, px) in row.iter_mut().enumerate() {
                    *px = (line.wrapping_add(x) % 256) as u8;
                }
            }
            PixelType::U16 => {
                for (x, px) in row.chunks_exact_mut(2).enumerate() {
                    let value = (line.wrapping_add(x) % 65536) as u16;
                    px.copy_from_slice(&value.to_le_bytes());
                }
            }
        }
    }
}

impl LineSource for SyntheticLineSource {
    fn next_block(&mut self, rows: usize) -> Option<LineBlock> {
        let remaining = match self.line_limit {
            Some(limit) => limit.saturating_sub(self.next_line),
            None => usize::MAX,
        };
        let rows = rows.min(remaining);
        if rows == 0 {
            return None;
        }

        let stride = self.stride_bytes();
        let row_bytes = self.source_width * self.pixel_type.elem_size();
        let mut data = vec![0u8; rows * stride];
        for (i, row) in data.chunks_exact_mut(stride).enumerate() {
            self.fill_row(self.next_line + i, &mut row[..row_bytes]);
        }

        let block = LineBlock {
            data,
            rows,
            stride_bytes: stride,
            acquired_unix_secs: self.line_time(self.next_line),
        };
        self.next_line += rows;
        Some(block)
    }

    fn source_width(&self) -> usize {
        self.source_width
    }

    fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }
}
