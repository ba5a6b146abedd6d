//! Authority Common Library
//!
//! Shared domain model and utilities for the authority contribution ingest
//! workspace.
//!
//! # Overview
//!
//! This crate provides the pieces every workspace member agrees on:
//!
//! - **Contribution**: the immutable record of one recognized external
//!   activity (blog post, talk, pull request, attendance)
//! - **Watermark**: per-source "newest already persisted" instant and the
//!   ingestion window derived from it
//! - **Logging**: tracing subscriber bootstrap
//!
//! # Example
//!
//! ```no_run
//! use authority_common::contribution::{Contribution, ContributionType};
//! use chrono::Utc;
//!
//! let c = Contribution {
//!     guid: "https://example.com/post/1".to_string(),
//!     author: "Jane Doe".to_string(),
//!     title: "On incremental ingestion".to_string(),
//!     date: Utc::now(),
//!     unit: None,
//!     kind: ContributionType::Blog,
//!     scraper_id: "example.com/blog".to_string(),
//!     url: Some("https://example.com/post/1".to_string()),
//! };
//! assert!(c.is_valid());
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

pub mod contribution;
pub mod logging;
pub mod watermark;

// Re-export commonly used types
pub use contribution::{Contribution, ContributionType};
pub use watermark::{sentinel_min, IngestWindow};
