//! Unified error handling for the lottoharvest crate
//!
//! This module provides a unified error type that consolidates the boundary
//! errors into a single `Error` enum, while the boundaries themselves keep
//! their own types.
//!
//! # Architecture
//!
//! - [`HarvestErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust
//! use lottoharvest::error::{Error, ErrorCategory, HarvestErrorTrait};
//! use lottoharvest::utils::error::FetchError;
//!
//! let err = Error::from(FetchError::Timeout);
//! assert!(err.is_recoverable());
//! assert_eq!(err.category(), ErrorCategory::Network);
//! ```

use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::utils::error::{CrawlError, ErrorKind, FetchError, StoreError};

/// Common trait for lottoharvest error types
pub trait HarvestErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout, upstream status)
    Network,
    /// Parsing and data extraction errors
    Parsing,
    /// Storage and I/O errors
    Storage,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Parsing => "parsing",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

impl HarvestErrorTrait for FetchError {
    fn is_recoverable(&self) -> bool {
        self.kind().is_retryable()
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Decode(_) => ErrorCategory::Parsing,
            Self::InvalidUrl(_) => ErrorCategory::Config,
            _ => ErrorCategory::Network,
        }
    }
}

impl HarvestErrorTrait for StoreError {
    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Pool(_))
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidConfig(_) => ErrorCategory::Config,
            _ => ErrorCategory::Storage,
        }
    }
}

impl HarvestErrorTrait for CrawlError {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_recoverable(),
            Self::Store(e) => e.is_recoverable(),
            Self::UnknownJurisdiction(_) => false,
            Self::NoData => true,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(e) => e.category(),
            Self::Store(e) => e.category(),
            Self::UnknownJurisdiction(_) => ErrorCategory::Storage,
            Self::NoData => ErrorCategory::Parsing,
        }
    }
}

/// Unified error type for the lottoharvest crate
#[derive(Error, Debug)]
pub enum Error {
    /// Fetch boundary errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Storage boundary errors
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Crawl unit errors
    #[error("Crawl error: {0}")]
    Crawl(#[from] CrawlError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl HarvestErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_recoverable(),
            Self::Store(e) => e.is_recoverable(),
            Self::Crawl(e) => e.is_recoverable(),
            Self::Io(_) => true, // I/O errors are often transient
            Self::Json(_) => false,
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(e) => e.category(),
            Self::Store(e) => e.category(),
            Self::Crawl(e) => e.category(),
            Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::Parsing,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Pipeline classification, when the error came from a pipeline boundary
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Fetch(e) => Some(e.kind()),
            Self::Store(e) => Some(e.kind()),
            Self::Crawl(e) => Some(e.kind()),
            _ => None,
        }
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: format!("{err:#}"),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let fetch_err = Error::Fetch(FetchError::Timeout);
        assert_eq!(fetch_err.category(), ErrorCategory::Network);

        let store_err = Error::Store(StoreError::Pool("exhausted".into()));
        assert_eq!(store_err.category(), ErrorCategory::Storage);
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::Fetch(FetchError::Timeout).is_recoverable());
        assert!(!Error::Fetch(FetchError::ServerError(503)).is_recoverable());
        assert!(!Error::Crawl(CrawlError::UnknownJurisdiction("ZZ".into())).is_recoverable());
    }

    #[test]
    fn test_error_conversion() {
        let unified: Error = CrawlError::NoData.into();
        assert!(matches!(unified, Error::Crawl(_)));
        assert_eq!(unified.kind(), Some(ErrorKind::NoData));
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("batch_size must be at least 1");
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.is_recoverable());
        assert!(err.kind().is_none());
    }

    #[test]
    fn test_other_error() {
        let err = Error::other("Something went wrong");
        assert_eq!(err.category(), ErrorCategory::Other);
        assert_eq!(err.category().as_str(), "other");
    }
}
