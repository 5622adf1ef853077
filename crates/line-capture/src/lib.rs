//! Line Capture
//!
//! Drives a [`line_store::LineStore`] from a line-scan source:
//! - Layered settings (defaults, TOML file, `LINECAP_*` environment)
//! - Synthetic line source with deterministic pixel patterns
//! - Paced capture session: warmup, commit, linear append until full
//! - Latest-window monitor publishing samples over a channel

pub mod monitor;
pub mod session;
pub mod settings;
pub mod source;

pub use monitor::{WindowMonitor, WindowSample};
pub use session::{CaptureReport, CaptureSession, StopReason};
pub use settings::{CaptureSettings, MonitorSettings};
pub use source::{LineBlock, LineSource, SyntheticLineSource};

use line_store::{to_unix_secs, LineStore, LineStoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, Level};

/// Capture error types
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Line store error: {0}")]
    Store(#[from] LineStoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid settings: {0}")]
    Settings(String),

    #[error("Source geometry mismatch: {0}")]
    Geometry(String),
}

/// Outcome of [`run`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureSummary {
    pub report: CaptureReport,
    /// Samples the monitor sent
    pub samples_sent: usize,
    /// Samples the consumer received
    pub samples_received: usize,
    /// Newest sample seen by the consumer
    pub last_sample: Option<WindowSample>,
}

/// Install the global tracing subscriber
///
/// Does nothing if a subscriber is already installed.
pub fn init_logging(settings: &CaptureSettings) {
    let level = settings.log_level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true);

    let _ = if settings.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Capture from a synthetic source into a fresh store while a monitor samples it
///
/// The store is disposed when the session ends, which also stops the monitor.
pub async fn run(settings: CaptureSettings) -> Result<CaptureSummary, CaptureError> {
    settings.validate()?;

    let mut store = LineStore::new(settings.store.clone())?;
    let mut source = SyntheticLineSource::from_settings(&settings, to_unix_secs(chrono::Utc::now()));
    let monitor = WindowMonitor::new(store.reader(), settings.monitor.clone());
    let session = CaptureSession::new(settings);

    let (tx, mut rx) = mpsc::channel::<WindowSample>(64);

    let capture = async {
        let report = session.run(&mut store, &mut source).await;
        store.dispose();
        report
    };
    let consume = async {
        let mut received = 0usize;
        let mut last = None;
        while let Some(sample) = rx.recv().await {
            received += 1;
            debug!(
                "Window @{} t={:.6} mean={:.2} stored={}",
                sample.start_row, sample.top_time_sec, sample.mean, sample.stored_lines
            );
            last = Some(sample);
        }
        (received, last)
    };

    let (report, samples_sent, (samples_received, last_sample)) =
        tokio::join!(capture, monitor.run(tx), consume);

    Ok(CaptureSummary {
        report: report?,
        samples_sent,
        samples_received,
        last_sample,
    })
}
