//! Error types for the lottoharvest pipeline
//!
//! Each boundary of the pipeline (fetch, storage, crawl unit) has its own
//! error enum. Every variant maps onto one [`ErrorKind`], which is what the
//! orchestrator switches on.

use thiserror::Error;

/// Closed classification of pipeline failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Network, DNS or timeout failure. Retried up to the attempt budget.
    Transport,
    /// Upstream 5xx or 429. Skipped without retry.
    Server,
    /// Jurisdiction unknown to storage. Fatal for that jurisdiction.
    NotFound,
    /// Page fetched but no draw sections present.
    NoData,
    /// Uniqueness violation on insert. Recovered inside the upsert engine.
    Conflict,
    /// Write failure unrelated to conflicts.
    Persistence,
    /// Anything else. Retried up to the attempt budget, then skipped.
    Other,
}

impl ErrorKind {
    /// Whether the orchestrator should spend another attempt on this kind
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transport | Self::Other)
    }

    /// Whether the failure ends the jurisdiction's date loop
    #[must_use]
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Errors that can occur at the fetch boundary
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error (connection refused, DNS, TLS, body read)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Upstream server error or throttling
    #[error("Server error: {0}")]
    ServerError(u16),

    /// Non-success status that is not a server error
    #[error("Unexpected status: {0}")]
    Status(u16),

    /// Content decoding error
    #[error("Decoding error: {0}")]
    Decode(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Classify this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Http(e) if e.is_timeout() => ErrorKind::Transport,
            Self::Http(e) if e.is_connect() || e.is_request() || e.is_body() => {
                ErrorKind::Transport
            }
            Self::Http(_) => ErrorKind::Other,
            Self::Timeout => ErrorKind::Transport,
            Self::ServerError(_) => ErrorKind::Server,
            Self::Status(_) | Self::Decode(_) | Self::InvalidUrl(_) => ErrorKind::Other,
        }
    }

    /// Whether a status code is treated as an upstream server failure
    ///
    /// 429 is included: throttling tends to persist for the rest of a run.
    #[must_use]
    pub fn is_server_status(status: u16) -> bool {
        status == 429 || (500..=599).contains(&status)
    }
}

/// Errors that can occur at the storage boundary
#[derive(Error, Debug)]
pub enum StoreError {
    /// Unique constraint violated
    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[source] rusqlite::Error),

    /// PostgreSQL error
    #[error("PostgreSQL error: {0}")]
    Postgres(#[source] tokio_postgres::Error),

    /// Connection pool error
    #[error("Connection pool error: {0}")]
    Pool(String),

    /// Stored value could not be decoded into the typed model
    #[error("Corrupt stored value in {column}: {message}")]
    Corrupt { column: &'static str, message: String },

    /// Referenced row does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// Invalid connection URL or backend settings
    #[error("Invalid database configuration: {0}")]
    InvalidConfig(String),
}

impl StoreError {
    /// Classify this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::NotFound(_) => ErrorKind::NotFound,
            _ => ErrorKind::Persistence,
        }
    }

    /// Build a decode error for a column
    pub fn corrupt(column: &'static str, message: impl ToString) -> Self {
        Self::Corrupt {
            column,
            message: message.to_string(),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, msg)
                if code.code == rusqlite::ErrorCode::ConstraintViolation
                    && matches!(
                        code.extended_code,
                        rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                            | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    ) =>
            {
                Self::Conflict(msg.clone().unwrap_or_else(|| code.to_string()))
            }
            _ => Self::Sqlite(err),
        }
    }
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(err: tokio_postgres::Error) -> Self {
        if err.code() == Some(&tokio_postgres::error::SqlState::UNIQUE_VIOLATION) {
            let detail = err
                .as_db_error()
                .map(|db| db.message().to_string())
                .unwrap_or_else(|| err.to_string());
            return Self::Conflict(detail);
        }
        Self::Postgres(err)
    }
}

/// Failure of one crawl unit (one jurisdiction, one date or latest page)
#[derive(Error, Debug)]
pub enum CrawlError {
    /// Fetch boundary failure
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Storage failure while resolving or logging
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Jurisdiction code not present in storage
    #[error("Jurisdiction not found: {0}")]
    UnknownJurisdiction(String),

    /// Page fetched but no draw sections found
    #[error("No draw results on page")]
    NoData,
}

impl CrawlError {
    /// Classify this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Fetch(e) => e.kind(),
            Self::Store(e) => e.kind(),
            Self::UnknownJurisdiction(_) => ErrorKind::NotFound,
            Self::NoData => ErrorKind::NoData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_kinds() {
        assert_eq!(FetchError::Timeout.kind(), ErrorKind::Transport);
        assert_eq!(FetchError::ServerError(503).kind(), ErrorKind::Server);
        assert_eq!(FetchError::ServerError(429).kind(), ErrorKind::Server);
        assert_eq!(FetchError::Status(404).kind(), ErrorKind::Other);
        assert_eq!(
            FetchError::Decode("bad".to_string()).kind(),
            ErrorKind::Other
        );
    }

    #[test]
    fn test_server_status_classification() {
        assert!(FetchError::is_server_status(429));
        assert!(FetchError::is_server_status(500));
        assert!(FetchError::is_server_status(503));
        assert!(!FetchError::is_server_status(404));
        assert!(!FetchError::is_server_status(200));
    }

    #[test]
    fn test_kind_policies() {
        assert!(ErrorKind::Transport.is_retryable());
        assert!(ErrorKind::Other.is_retryable());
        assert!(!ErrorKind::Server.is_retryable());
        assert!(!ErrorKind::NoData.is_retryable());
        assert!(ErrorKind::NotFound.is_fatal());
        assert!(!ErrorKind::Server.is_fatal());
    }

    #[test]
    fn test_sqlite_unique_violation_is_conflict() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER UNIQUE); INSERT INTO t VALUES (1);")
            .unwrap();
        let err: StoreError = conn
            .execute("INSERT INTO t VALUES (1)", [])
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_crawl_error_kinds() {
        assert_eq!(
            CrawlError::UnknownJurisdiction("ZZ".to_string()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(CrawlError::NoData.kind(), ErrorKind::NoData);
        assert_eq!(
            CrawlError::from(FetchError::ServerError(502)).kind(),
            ErrorKind::Server
        );
        assert_eq!(
            CrawlError::from(StoreError::Pool("closed".to_string())).kind(),
            ErrorKind::Persistence
        );
    }
}
