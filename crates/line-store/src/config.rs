//! Store geometry and capacity configuration

use crate::error::{LineStoreError, Result};
use serde::{Deserialize, Serialize};

/// Pixel element width of the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelType {
    /// 8-bit samples
    #[default]
    U8,
    /// 16-bit samples
    U16,
}

impl PixelType {
    /// Bytes per pixel element
    pub const fn elem_size(self) -> usize {
        match self {
            PixelType::U8 => 1,
            PixelType::U16 => 2,
        }
    }
}

/// Line store configuration, fixed for the lifetime of a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineStoreConfig {
    /// Pixels per source row as delivered by the sensor
    pub source_width: usize,
    /// First stored pixel of each source row
    pub roi_x: usize,
    /// Stored pixels per row
    pub roi_width: usize,
    /// Rows the buffer can hold in total (warmup prefix included)
    pub capacity_lines: usize,
    /// Size of the sliding warmup window
    pub warmup_lines: usize,
    /// Pixel element width
    pub pixel_type: PixelType,
}

impl Default for LineStoreConfig {
    fn default() -> Self {
        Self {
            source_width: 2048,
            roi_x: 0,
            roi_width: 2048,
            capacity_lines: 8192,
            warmup_lines: 64,
            pixel_type: PixelType::U8,
        }
    }
}

impl LineStoreConfig {
    /// Create a config for the given geometry
    pub fn new(
        source_width: usize,
        roi_x: usize,
        roi_width: usize,
        capacity_lines: usize,
        warmup_lines: usize,
        pixel_type: PixelType,
    ) -> Self {
        Self {
            source_width,
            roi_x,
            roi_width,
            capacity_lines,
            warmup_lines,
            pixel_type,
        }
    }

    /// Full-width ROI over an 8-bit sensor
    pub fn full_width(source_width: usize, capacity_lines: usize, warmup_lines: usize) -> Self {
        Self::new(source_width, 0, source_width, capacity_lines, warmup_lines, PixelType::U8)
    }

    /// Bytes per stored row
    pub fn row_bytes(&self) -> usize {
        self.roi_width * self.pixel_type.elem_size()
    }

    /// Bytes per full source row
    pub fn source_row_bytes(&self) -> usize {
        self.source_width * self.pixel_type.elem_size()
    }

    /// Check geometry and capacity, returning the buffer size in bytes
    pub fn validate(&self) -> Result<usize> {
        if self.source_width == 0 {
            return Err(LineStoreError::out_of_range(
                "source_width",
                self.source_width,
                "must be positive",
            ));
        }
        if self.roi_x >= self.source_width {
            return Err(LineStoreError::out_of_range(
                "roi_x",
                self.roi_x,
                "must lie inside the source row",
            ));
        }
        if self.roi_width == 0 || self.roi_width > self.source_width - self.roi_x {
            return Err(LineStoreError::out_of_range(
                "roi_width",
                self.roi_width,
                "must be positive and end inside the source row",
            ));
        }
        if self.warmup_lines == 0 || self.capacity_lines < self.warmup_lines {
            return Err(LineStoreError::out_of_range(
                "warmup_lines",
                self.warmup_lines,
                "must be positive and not exceed capacity_lines",
            ));
        }

        let row_bytes = self
            .roi_width
            .checked_mul(self.pixel_type.elem_size())
            .ok_or(LineStoreError::Overflow {
                lines: 1,
                row_bytes: usize::MAX,
            })?;
        let overflow = LineStoreError::Overflow {
            lines: self.capacity_lines,
            row_bytes,
        };
        let total = self
            .capacity_lines
            .checked_mul(row_bytes)
            .ok_or_else(|| overflow.clone())?;
        if total > isize::MAX as usize {
            return Err(overflow);
        }
        Ok(total)
    }
}
