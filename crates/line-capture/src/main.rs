//! Line Capture - Main Entry Point
//!
//! Usage: `line-capture [settings.toml]`

use anyhow::Context;
use line_capture::{init_logging, CaptureSettings};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1).map(PathBuf::from);
    let settings = CaptureSettings::load(path.as_deref()).context("loading capture settings")?;
    init_logging(&settings);

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("installing metrics recorder")?;

    info!("=== Line Capture v{} ===", env!("CARGO_PKG_VERSION"));

    let summary = line_capture::run(settings).await.context("capture failed")?;
    info!(
        "Monitor sent {} samples, {} received",
        summary.samples_sent, summary.samples_received
    );
    info!("Capture metrics:\n{}", metrics.render());

    println!("{}", serde_json::to_string_pretty(&summary.report)?);
    Ok(())
}
