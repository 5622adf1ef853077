//! Line Store Error Types

use thiserror::Error;

/// Convenience result alias for line store operations
pub type Result<T> = std::result::Result<T, LineStoreError>;

/// Errors raised by the line store
///
/// Capacity exhaustion and windows that are not yet available are not errors;
/// they are reported through [`PushStatus`](crate::PushStatus) and `Option`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LineStoreError {
    /// Geometry or capacity parameter outside its allowed range
    #[error("{field} value {value} is out of range: {reason}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        reason: &'static str,
    },

    /// `capacity_lines * row_bytes` does not fit in the address space
    #[error("Buffer size overflows: {lines} lines x {row_bytes} bytes")]
    Overflow { lines: usize, row_bytes: usize },

    /// The backing buffer could not be allocated
    #[error("Failed to allocate {bytes} bytes for line buffer")]
    Allocation { bytes: usize },

    /// Call-time argument rejected before any mutation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The store was disposed
    #[error("Line store disposed")]
    Disposed,
}

impl LineStoreError {
    pub(crate) fn out_of_range(field: &'static str, value: impl TryInto<i64>, reason: &'static str) -> Self {
        Self::OutOfRange {
            field,
            value: value.try_into().unwrap_or(i64::MAX),
            reason,
        }
    }
}
