use anyhow::Result;
use crime_cleaner::services::pipeline;
use crime_cleaner::{logging, Config};

fn main() -> Result<()> {
    // Initialize logging
    logging::init_logging()?;

    // Load configuration
    let config = Config::new()?;
    tracing::debug!("Configuration: {:?}", config);

    let report = pipeline::run_database_pipeline(&config)?;
    tracing::info!("Batch report: {}", serde_json::to_string(&report)?);

    if report.failed > 0 {
        tracing::warn!("{} of {} rows were not inserted", report.failed, report.attempted);
    }
    tracing::info!("Process completed successfully!");

    Ok(())
}
