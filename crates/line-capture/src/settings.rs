//! Capture settings
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `LINECAP_*` environment variables (`__` separates nested keys,
//! e.g. `LINECAP_STORE__CAPACITY_LINES=4096`).

use crate::CaptureError;
use config::{Config, Environment, File};
use line_store::LineStoreConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "LINECAP";

/// Latest-window monitor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Window width in pixels (0 = full ROI)
    pub window_width: usize,
    /// Window height in rows
    pub window_height: usize,
    /// Horizontal offset inside the ROI
    pub x_offset: usize,
    /// Polling period (milliseconds)
    pub poll_ms: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            window_width: 0,
            window_height: 128,
            x_offset: 0,
            poll_ms: 50,
        }
    }
}

/// Capture session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Store geometry and capacity
    pub store: LineStoreConfig,
    /// Rows delivered per block
    pub block_rows: usize,
    /// Sensor line rate (Hz)
    pub line_rate_hz: f64,
    /// Blocks accumulated in warmup before commit
    pub warmup_blocks: usize,
    /// Stop after this many blocks (unset = run until the store is full)
    pub max_blocks: Option<usize>,
    /// Padding bytes after each source row
    pub stride_padding: usize,
    /// Latest-window monitor
    pub monitor: MonitorSettings,
    /// Log level filter (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit JSON log lines
    pub json_logs: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            store: LineStoreConfig::default(),
            block_rows: 32,
            line_rate_hz: 10_000.0,
            warmup_blocks: 8,
            max_blocks: None,
            stride_padding: 0,
            monitor: MonitorSettings::default(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl CaptureSettings {
    /// Load settings from defaults, an optional file and `LINECAP_*` variables
    pub fn load(path: Option<&Path>) -> Result<Self, CaptureError> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    /// Load settings reading environment overrides under `prefix`
    pub fn load_with_prefix(path: Option<&Path>, prefix: &str) -> Result<Self, CaptureError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Self = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check the producer parameters and the store geometry
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.block_rows == 0 {
            return Err(CaptureError::Settings("block_rows must be positive".into()));
        }
        if !(self.line_rate_hz.is_finite() && self.line_rate_hz > 0.0) {
            return Err(CaptureError::Settings(format!(
                "line_rate_hz must be positive, got {}",
                self.line_rate_hz
            )));
        }
        if self.monitor.window_height == 0 || self.monitor.poll_ms == 0 {
            return Err(CaptureError::Settings(
                "monitor window_height and poll_ms must be positive".into(),
            ));
        }
        self.store.validate()?;
        Ok(())
    }

    /// Source stride in bytes
    pub fn source_stride(&self) -> usize {
        self.store.source_row_bytes() + self.stride_padding
    }
}
