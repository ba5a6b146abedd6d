//! Authority Ingest - incremental contribution ingestion.
//!
//! Pulls contribution records (blog posts, talks, pull requests,
//! attendance) from heterogeneous upstream sources and appends previously
//! unseen records to a single Postgres sink, using a per-source high-water
//! mark instead of full re-scans.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use authority_ingest::config::{IngestConfig, SinkConfig};
//! use authority_ingest::loader::Loader;
//! use authority_ingest::registry::SourceRegistry;
//! use authority_ingest::sink::PostgresSink;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let sink = Arc::new(PostgresSink::connect(&SinkConfig::from_env()?).await?);
//!     let sources = SourceRegistry::builtin()?.build_sources(&IngestConfig::from_env())?;
//!     let outcomes = Loader::new(sink, sources).run().await?;
//!     for outcome in outcomes {
//!         println!("{}: {}", outcome.name, outcome.count);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod loader;
pub mod pagination;
pub mod registry;
pub mod sink;
pub mod sources;
