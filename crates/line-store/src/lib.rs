//! Line Store
//!
//! Fixed-capacity row buffer for line-scan sensors. A single producer pushes
//! blocks of freshly captured rows; any number of readers take zero-copy
//! windows of the most recent rows together with an interpolated acquisition
//! timestamp for the first row of the window.
//!
//! Lifecycle: rows first collect in a sliding warmup window holding the most
//! recent `warmup_lines` rows. [`LineStore::commit`] freezes that window as
//! the head of a linear log; later pushes append until capacity runs out and
//! report [`PushStatus::Full`] instead of wrapping.
//!
//! ```
//! use line_store::{LineStore, LineStoreConfig, PixelType};
//!
//! let config = LineStoreConfig::new(100, 10, 50, 20, 5, PixelType::U8);
//! let mut store = LineStore::new(config).unwrap();
//!
//! let block = vec![7u8; 100 * 5];
//! store.push_block_at(&block, 5, 100, 0.0).unwrap();
//! store.commit().unwrap();
//! store.push_block_at(&block[..100], 1, 100, 1.0).unwrap();
//!
//! let window = store.try_get_latest_window(50, 6, 0).unwrap().unwrap();
//! assert_eq!(window.stride_bytes(), 50);
//! assert_eq!(window.row(0).unwrap(), &[7u8; 50][..]);
//! ```

mod anchors;
mod arena;
mod clock;
mod config;
mod error;
mod lifecycle;
mod publish;
mod store;
mod warmup;
mod window;

pub use anchors::Anchor;
pub use clock::{to_unix_secs, Clock, ManualClock, SystemClock};
pub use config::{LineStoreConfig, PixelType};
pub use error::{LineStoreError, Result};
pub use lifecycle::LifecycleState;
pub use store::{LineReader, LineStore, PushStatus, StoreStats};
pub use window::Window;

#[cfg(test)]
mod tests;
