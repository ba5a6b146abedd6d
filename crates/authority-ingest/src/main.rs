//! Authority Ingest - contribution ingestion runner

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use authority_common::logging::{init_logging, LogConfig, LogFormat, LogLevel};
use authority_ingest::config::{IngestConfig, SinkConfig};
use authority_ingest::loader::Loader;
use authority_ingest::registry::SourceRegistry;
use authority_ingest::sink::PostgresSink;
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "authority-ingest")]
#[command(author, version, about = "Incremental contribution ingestion")]
struct Cli {
    /// Run a single source, identified by its scraper id
    #[arg(short, long)]
    only: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::new(log_level, LogFormat::Text);

    // Environment variables take precedence
    let log_config = LogConfig::from_env().unwrap_or(log_config);
    init_logging(&log_config)?;

    let registry = SourceRegistry::builtin()?;
    let config = IngestConfig::from_env();
    let mut sources = registry.build_sources(&config)?;
    if let Some(only) = &cli.only {
        sources.retain(|s| s.scraper_id() == only);
        if sources.is_empty() {
            let known: Vec<_> = registry.scraper_ids().collect();
            bail!("unknown source '{}', known sources: {}", only, known.join(", "));
        }
    }

    let sink = PostgresSink::connect(&SinkConfig::from_env()?)
        .await
        .context("connecting contribution sink")?;

    let loader = Loader::new(Arc::new(sink), sources);
    let outcomes = loader.run().await?;

    for outcome in &outcomes {
        info!(source = %outcome.name, count = outcome.count, "loaded");
    }
    info!("ingestion complete");
    Ok(())
}
