//! lottoharvest - lottery draw results collector
//!
//! Crawls per-jurisdiction results pages, extracts draw records and keeps a
//! relational store of games and draws free of duplicates.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`crawler`] - Fetching, URL construction and the crawl orchestrator
//! - [`parser`] - HTML parsing and data extraction
//! - [`models`] - Core data structures and types
//! - [`storage`] - Connection lifecycle, SQLite/PostgreSQL backends, upsert engine
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use lottoharvest::config::Config;
//! use lottoharvest::crawler::{CrawlOrchestrator, CrawlPlan, CrawlSettings, HttpFetcher, ResultsUrlBuilder};
//! use lottoharvest::parser::DrawPageExtractor;
//! use lottoharvest::storage::Database;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let urls = ResultsUrlBuilder::new(&config.crawler.base_url)?;
//!     let orchestrator = CrawlOrchestrator::new(
//!         HttpFetcher::from_config(&config.crawler)?,
//!         DrawPageExtractor::new(urls.clone()),
//!         urls,
//!         Database::connect(&config.database).await?,
//!         CrawlSettings::from_config(&config, true),
//!     );
//!     let summary = orchestrator.run_crawl(&["NY".to_string()], &CrawlPlan::Latest).await;
//!     println!("{}", summary.to_json_pretty()?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crawler;
pub mod error;
pub mod models;
pub mod parser;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crawler::{CrawlOrchestrator, CrawlPlan, CrawlSettings, JobSummary};
    pub use crate::error::{Error, ErrorCategory, HarvestErrorTrait, Result};
    pub use crate::models::{GameDefinition, Jurisdiction, RawDrawRecord, StoredDrawResult};
    pub use crate::storage::{Database, DrawStore, UpsertEngine, UpsertReport};
}

// Direct re-exports for convenience
pub use models::{DrawNumbers, DrawValues, RawDrawRecord, StoredDrawResult};
