//! playlake: builds the song play star schema from raw JSON.

use clap::Parser;
use snafu::prelude::*;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use playlake::config::Config;
use playlake::error::{ConfigSnafu, EtlError, MetricsSnafu};
use playlake::metrics::MetricsExporter;
use playlake::run_pipeline;

/// Song play star schema ETL.
#[derive(Parser, Debug)]
#[command(name = "playlake")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Dry run - validate configuration without processing.
    #[arg(long)]
    dry_run: bool,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), EtlError> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("playlake starting");

    let config = Config::from_file(&args.config).context(ConfigSnafu)?;

    if args.dry_run {
        info!("Dry run mode - validating configuration");
        info!("Songs: {}", config.input.song_pattern());
        info!("Logs: {}", config.input.log_pattern());
        info!("Output: {}", config.output.path);
        info!("Compression: {:?}", config.output.compression);
        info!("Join match mode: {:?}", config.join.match_mode);
        info!("Key conflicts: {:?}", config.dimensions.on_key_conflict);
        match &config.rejects.path {
            Some(path) => info!("Rejected plays: {}", path),
            None => info!("Rejected plays: counted only"),
        }
        info!("Configuration is valid");
        return Ok(());
    }

    let exporter = MetricsExporter::install(&config.metrics).context(MetricsSnafu)?;

    // failed runs still export what they recorded
    let result = run_pipeline(config).await;
    if let Some(exporter) = &exporter {
        exporter.finish().await.context(MetricsSnafu)?;
    }
    let stats = result?;

    info!("Run completed successfully");
    info!("  Song records read: {}", stats.song_records);
    info!("  Log records read: {}", stats.log_records);
    info!("  Play events: {}", stats.logs.plays);
    for table in stats.tables() {
        info!(
            "  {}: {} rows, {} files, {} bytes",
            table.table, table.rows, table.files, table.bytes
        );
    }
    info!("  Unmatched plays: {}", stats.rejected.total());

    Ok(())
}
