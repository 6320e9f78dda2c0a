use anyhow::Result;
use crime_cleaner::services::pipeline;
use crime_cleaner::{logging, Config};

fn main() -> Result<()> {
    logging::init_logging()?;

    let config = Config::new()?;
    tracing::debug!("Configuration: {:?}", config);

    let summary = pipeline::run_spreadsheet_pipeline(&config)?;
    tracing::info!("Clean summary: {}", serde_json::to_string(&summary)?);
    tracing::info!(
        "Wrote {} cleaned rows to {}",
        summary.rows_out,
        config.destination_path.display()
    );

    Ok(())
}
