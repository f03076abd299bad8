//! Sensor Acquisition - Main Entry Point

use std::path::PathBuf;
use std::time::Duration;

use acquisition::{init_logging, AppConfig, Pipeline};
use hardware_sensor::load_config;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging()?;

    info!("=== Sensor Acquisition v{} ===", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config: AppConfig = load_config(config_path.as_deref())?;
    config.validate()?;

    let mut pipeline = Pipeline::from_config(&config)?;
    pipeline.start()?;
    let summary = pipeline
        .run(Duration::from_secs_f64(config.run_seconds))
        .await?;

    info!("Run summary: {}", serde_json::to_string(&summary)?);
    Ok(())
}
