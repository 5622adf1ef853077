//! Capture session
//!
//! Paces a [`LineSource`] at the configured line rate and feeds its blocks
//! into a store: warmup first, commit after `warmup_blocks` blocks, then
//! linear append until the store fills, the source runs dry or the block
//! limit is reached.

use crate::settings::CaptureSettings;
use crate::source::LineSource;
use crate::CaptureError;
use line_store::{LineStore, LineStoreError, PushStatus, StoreStats};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Why a capture run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The store refused or truncated a block
    StoreFull,
    /// The source had no more rows
    SourceExhausted,
    /// `max_blocks` blocks were pushed
    BlockLimit,
    /// The store was disposed underneath the session
    Disposed,
}

/// Summary of a finished capture run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureReport {
    /// Blocks handed to the store
    pub blocks_pushed: usize,
    /// Rows delivered by the source
    pub rows_offered: usize,
    /// Rows the store accepted
    pub rows_stored: usize,
    pub head_total: usize,
    pub committed: bool,
    pub stop_reason: StopReason,
    pub stats: StoreStats,
}

/// Producer loop feeding a line store
#[derive(Debug, Clone)]
pub struct CaptureSession {
    settings: CaptureSettings,
}

impl CaptureSession {
    pub fn new(settings: CaptureSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    /// Time between blocks at the configured line rate
    pub fn block_period(&self) -> Duration {
        Duration::from_secs_f64(self.settings.block_rows as f64 / self.settings.line_rate_hz)
            .max(Duration::from_micros(1))
    }

    /// Run until the store fills, the source is exhausted or the block limit hits
    pub async fn run<S: LineSource>(
        &self,
        store: &mut LineStore,
        source: &mut S,
    ) -> Result<CaptureReport, CaptureError> {
        if source.source_width() != store.source_width() || source.pixel_type() != store.pixel_type() {
            return Err(CaptureError::Geometry(format!(
                "source delivers {} x {:?}, store expects {} x {:?}",
                source.source_width(),
                source.pixel_type(),
                store.source_width(),
                store.pixel_type()
            )));
        }

        info!(
            "Starting capture: {} rows/block every {:?}, commit after {} blocks",
            self.settings.block_rows,
            self.block_period(),
            self.settings.warmup_blocks
        );

        let mut ticker = interval(self.block_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut blocks_pushed = 0usize;
        let mut rows_offered = 0usize;
        let mut rows_stored = 0usize;

        let stop_reason = loop {
            if !store.is_committed() && blocks_pushed >= self.settings.warmup_blocks {
                match store.commit() {
                    Ok(()) => {}
                    Err(LineStoreError::Disposed) => break StopReason::Disposed,
                    Err(e) => return Err(e.into()),
                }
            }
            if self.settings.max_blocks.is_some_and(|max| blocks_pushed >= max) {
                break StopReason::BlockLimit;
            }

            ticker.tick().await;

            let Some(block) = source.next_block(self.settings.block_rows) else {
                break StopReason::SourceExhausted;
            };
            rows_offered += block.rows;

            let status = match store.push_block_at(
                &block.data,
                block.rows,
                block.stride_bytes,
                block.acquired_unix_secs,
            ) {
                Ok(status) => status,
                Err(LineStoreError::Disposed) => break StopReason::Disposed,
                Err(e) => return Err(e.into()),
            };
            blocks_pushed += 1;
            rows_stored += status.rows_written();

            metrics::counter!("line_capture_blocks_total").increment(1);
            metrics::counter!("line_capture_rows_total").increment(status.rows_written() as u64);
            metrics::gauge!("line_capture_fill_ratio").set(store.stats().fill_ratio);

            match status {
                PushStatus::Stored { rows } => {
                    debug!("Block {} stored {} rows", blocks_pushed, rows);
                }
                PushStatus::Truncated { written, dropped } => {
                    metrics::counter!("line_capture_rows_dropped_total").increment(dropped as u64);
                    warn!("Block {} truncated: {} written, {} dropped", blocks_pushed, written, dropped);
                    break StopReason::StoreFull;
                }
                PushStatus::Full => {
                    metrics::counter!("line_capture_rows_dropped_total").increment(block.rows as u64);
                    break StopReason::StoreFull;
                }
            }
        };

        let stats = store.stats();
        info!(
            "Capture stopped ({:?}): {} blocks, {} of {} rows stored, fill {:.1}%",
            stop_reason,
            blocks_pushed,
            rows_stored,
            rows_offered,
            stats.fill_ratio * 100.0
        );

        Ok(CaptureReport {
            blocks_pushed,
            rows_offered,
            rows_stored,
            head_total: stats.head_total,
            committed: stats.committed,
            stop_reason,
            stats,
        })
    }
}
