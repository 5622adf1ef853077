//! Latest-window monitor
//!
//! Polls the newest rows of a store through a [`LineReader`] and publishes a
//! small summary of each window over a channel.

use crate::settings::MonitorSettings;
use line_store::{LineReader, LineStoreError, PixelType, Window};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Summary of one latest-window read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSample {
    /// Absolute row of the window's first row
    pub start_row: usize,
    /// Acquisition time of that row (Unix seconds)
    pub top_time_sec: f64,
    /// Mean pixel value across the window
    pub mean: f64,
    /// Rows stored when the window was taken
    pub stored_lines: usize,
    /// Whether the window borrowed store memory
    pub zero_copy: bool,
}

/// Polling reader of the newest rows
#[derive(Debug, Clone)]
pub struct WindowMonitor {
    reader: LineReader,
    settings: MonitorSettings,
}

impl WindowMonitor {
    pub fn new(reader: LineReader, settings: MonitorSettings) -> Self {
        Self { reader, settings }
    }

    fn window_width(&self) -> usize {
        match self.settings.window_width {
            0 => self.reader.width(),
            w => w,
        }
    }

    /// Sample the latest window; `Ok(None)` until enough rows are stored
    pub fn sample(&self) -> Result<Option<WindowSample>, LineStoreError> {
        let stored_lines = self.reader.stored_lines();
        let window = self.reader.try_get_latest_window(
            self.window_width(),
            self.settings.window_height,
            self.settings.x_offset,
        )?;

        Ok(window.map(|window| WindowSample {
            start_row: window.start_row(),
            top_time_sec: window.top_time_sec(),
            mean: mean_pixel(&window, self.reader.pixel_type()),
            stored_lines,
            zero_copy: window.is_zero_copy(),
        }))
    }

    /// Poll until the store is disposed or the receiver goes away
    ///
    /// Returns the number of samples sent.
    pub async fn run(self, tx: mpsc::Sender<WindowSample>) -> usize {
        let mut ticker = tokio::time::interval(Duration::from_millis(self.settings.poll_ms.max(1)));
        let mut sent = 0usize;

        info!(
            "Window monitor started: {}x{} every {}ms",
            self.window_width(),
            self.settings.window_height,
            self.settings.poll_ms
        );

        loop {
            ticker.tick().await;
            let sample = match self.sample() {
                Ok(Some(sample)) => sample,
                Ok(None) => continue,
                Err(e) => {
                    debug!("Window monitor stopping: {}", e);
                    break;
                }
            };
            if tx.send(sample).await.is_err() {
                debug!("Window monitor stopping: receiver closed");
                break;
            }
            sent += 1;
        }

        info!("Window monitor stopped after {} samples", sent);
        sent
    }
}

fn mean_pixel(window: &Window<'_>, pixel_type: PixelType) -> f64 {
    let mut sum = 0u64;
    for row in window.rows() {
        sum += match pixel_type {
            PixelType::U8 => row.iter().map(|&b| b as u64).sum::<u64>(),
            PixelType::U16 => row
                .chunks_exact(2)
                .map(|px| u16::from_le_bytes([px[0], px[1]]) as u64)
                .sum::<u64>(),
        };
    }
    let count = window.width() * window.height();
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}
