//! Web crawling functionality with rate limiting
//!
//! This module implements the fetch boundary and the crawl orchestrator that
//! walks jurisdictions and dates, hands pages to the extractor and batches
//! records into the upsert engine.

pub mod fetcher;
pub mod orchestrator;
pub mod summary;
pub mod url;

pub use fetcher::HttpFetcher;
pub use orchestrator::{CrawlOrchestrator, CrawlPlan, CrawlSettings};
pub use summary::{DateResult, JobMetadata, JobSummary, StateResult};
pub use url::ResultsUrlBuilder;

use async_trait::async_trait;

use crate::utils::error::FetchError;

/// A successfully fetched document
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Requested URL
    pub url: String,

    /// HTTP status (always a success status)
    pub status: u16,

    /// Decoded body
    pub body: String,
}

/// Fetch boundary: one GET per call
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

#[async_trait]
impl<T: PageFetcher + ?Sized> PageFetcher for std::sync::Arc<T> {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        (**self).fetch(url).await
    }
}
