//! Collection attempt log
//!
//! One row per crawl unit. [`AttemptLog::start`] returns an [`Attempt`]
//! token and [`AttemptLog::finish`] consumes it, so an attempt cannot be
//! finalized twice through this API.

use std::time::Instant;

use chrono::Utc;
use tracing::debug;

use super::repository::DrawStore;
use crate::models::AttemptStatus;
use crate::utils::error::StoreError;

/// Open attempt, to be passed back to [`AttemptLog::finish`]
#[derive(Debug)]
#[must_use = "an attempt must be finished"]
pub struct Attempt {
    id: i64,
    jurisdiction_code: String,
    started: Instant,
}

impl Attempt {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn jurisdiction_code(&self) -> &str {
        &self.jurisdiction_code
    }
}

/// Writes attempt rows through the storage boundary
#[derive(Debug, Clone, Copy, Default)]
pub struct AttemptLog;

impl AttemptLog {
    pub fn new() -> Self {
        Self
    }

    /// Record the start of a crawl unit as `pending`
    pub async fn start(
        &self,
        store: &mut dyn DrawStore,
        jurisdiction_code: &str,
        url: &str,
    ) -> Result<Attempt, StoreError> {
        let id = store
            .insert_attempt(jurisdiction_code, url, AttemptStatus::Pending, Utc::now())
            .await?;
        debug!(attempt = id, state = %jurisdiction_code, url = %url, "Attempt started");

        Ok(Attempt {
            id,
            jurisdiction_code: jurisdiction_code.to_string(),
            started: Instant::now(),
        })
    }

    /// Mark the attempt as actively fetching
    pub async fn processing(
        &self,
        store: &mut dyn DrawStore,
        attempt: &Attempt,
    ) -> Result<(), StoreError> {
        store
            .set_attempt_status(attempt.id, AttemptStatus::Processing)
            .await
    }

    /// Finalize the attempt exactly once
    pub async fn finish(
        &self,
        store: &mut dyn DrawStore,
        attempt: Attempt,
        status: AttemptStatus,
        records_collected: u32,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        if !status.is_terminal() {
            return Err(StoreError::InvalidConfig(format!(
                "attempt cannot finish as {status}"
            )));
        }

        store
            .finalize_attempt(attempt.id, status, records_collected, error, Utc::now())
            .await?;
        debug!(
            attempt = attempt.id,
            state = %attempt.jurisdiction_code,
            status = %status,
            records = records_collected,
            elapsed_ms = attempt.started.elapsed().as_millis() as u64,
            "Attempt finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    #[tokio::test]
    async fn test_attempt_lifecycle() {
        let db = Database::in_memory().await.unwrap();
        let mut conn = db.acquire_pooled().await.unwrap();
        let store = conn.store();
        let log = AttemptLog::new();

        let attempt = log
            .start(store, "NY", "https://www.lotterycorner.com/ny/2025/5/13")
            .await
            .unwrap();
        let id = attempt.id();

        let pending = store.find_attempt(id).await.unwrap().unwrap();
        assert_eq!(pending.status, AttemptStatus::Pending);
        assert!(pending.end_time.is_none());

        log.processing(store, &attempt).await.unwrap();
        log.finish(store, attempt, AttemptStatus::Completed, 12, None)
            .await
            .unwrap();

        let done = store.find_attempt(id).await.unwrap().unwrap();
        assert_eq!(done.status, AttemptStatus::Completed);
        assert_eq!(done.records_collected, 12);
        assert_eq!(done.jurisdiction_code, "NY");
        assert!(done.end_time.unwrap() >= done.start_time);
    }

    #[tokio::test]
    async fn test_failed_attempt_keeps_error() {
        let db = Database::in_memory().await.unwrap();
        let mut conn = db.acquire_pooled().await.unwrap();
        let store = conn.store();
        let log = AttemptLog::new();

        let attempt = log.start(store, "CA", "https://example.test/ca").await.unwrap();
        let id = attempt.id();
        log.finish(store, attempt, AttemptStatus::Failed, 0, Some("Server error: 503"))
            .await
            .unwrap();

        let attempts = store.list_attempts("CA").await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].id, id);
        assert_eq!(attempts[0].error_message.as_deref(), Some("Server error: 503"));
    }

    #[tokio::test]
    async fn test_finish_requires_terminal_status() {
        let db = Database::in_memory().await.unwrap();
        let mut conn = db.acquire_pooled().await.unwrap();
        let store = conn.store();
        let log = AttemptLog::new();

        let attempt = log.start(store, "TX", "https://example.test/tx").await.unwrap();
        let err = log
            .finish(store, attempt, AttemptStatus::Processing, 0, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfig(_)));
    }
}
