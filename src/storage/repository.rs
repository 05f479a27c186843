//! Storage boundary
//!
//! Every component that touches the relational store goes through
//! [`DrawStore`]. The trait exposes small primitives; the decisions about
//! what to insert or update live in the upsert engine.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │        Upsert engine, attempt log, orchestrator             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      DrawStore trait                        │
//! └─────────────────────────────────────────────────────────────┘
//!                 │                              │
//!                 ▼                              ▼
//!      ┌─────────────────────┐        ┌─────────────────────┐
//!      │ rusqlite::Connection│        │ tokio_postgres::    │
//!      │                     │        │ Client              │
//!      └─────────────────────┘        └─────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::models::{
    AttemptStatus, CollectionAttempt, GameDefinition, Jurisdiction, NewDrawResult, NewGame,
    ResultUpdate, StoredDrawResult,
};
use crate::utils::error::StoreError;

/// Rows fetched per lookup statement
pub const LOOKUP_CHUNK_SIZE: usize = 200;

/// Primitive operations on the relational store
#[async_trait]
pub trait DrawStore: Send {
    /// Create tables and indexes if missing
    async fn init_schema(&mut self) -> Result<(), StoreError>;

    // ------------------------------------------------------------------
    // Jurisdictions
    // ------------------------------------------------------------------

    /// All jurisdictions ordered by code
    async fn list_jurisdictions(&mut self) -> Result<Vec<Jurisdiction>, StoreError>;

    /// Look up a jurisdiction by its code (case-insensitive)
    async fn find_jurisdiction(&mut self, code: &str) -> Result<Option<Jurisdiction>, StoreError>;

    /// Insert or rename a jurisdiction keyed by code
    async fn save_jurisdiction(&mut self, code: &str, name: &str)
        -> Result<Jurisdiction, StoreError>;

    // ------------------------------------------------------------------
    // Games
    // ------------------------------------------------------------------

    /// Games whose slug is in `slugs`
    async fn find_games_by_slugs(
        &mut self,
        slugs: &[String],
    ) -> Result<Vec<GameDefinition>, StoreError>;

    /// Create a game. Fails with [`StoreError::Conflict`] if the slug exists.
    async fn insert_game(&mut self, game: &NewGame) -> Result<GameDefinition, StoreError>;

    /// Update the mutable fields of a game
    async fn update_game(
        &mut self,
        id: i64,
        name: &str,
        logo_ref: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Insert `(game_id, jurisdiction_id)` associations that are missing.
    /// Returns how many were created.
    async fn link_games(&mut self, pairs: &[(i64, i64)]) -> Result<usize, StoreError>;

    /// Jurisdiction ids associated with a game
    async fn game_jurisdictions(&mut self, game_id: i64) -> Result<Vec<i64>, StoreError>;

    // ------------------------------------------------------------------
    // Draw results
    // ------------------------------------------------------------------

    /// Every stored row matching any `(game_id, draw_date)` key, ordered by id
    async fn find_results(
        &mut self,
        keys: &[(i64, NaiveDate)],
    ) -> Result<Vec<StoredDrawResult>, StoreError>;

    /// Insert one row. Fails with [`StoreError::Conflict`] on an identity collision.
    async fn insert_result(&mut self, row: &NewDrawResult) -> Result<i64, StoreError>;

    /// Apply all updates in one write, advancing `collected_at`
    async fn update_results(&mut self, updates: &[ResultUpdate]) -> Result<usize, StoreError>;

    /// Total stored rows
    async fn count_results(&mut self) -> Result<u64, StoreError>;

    // ------------------------------------------------------------------
    // Collection log
    // ------------------------------------------------------------------

    /// Append a new attempt row
    async fn insert_attempt(
        &mut self,
        jurisdiction_code: &str,
        url: &str,
        status: AttemptStatus,
        started_at: DateTime<Utc>,
    ) -> Result<i64, StoreError>;

    /// Move a non-finalized attempt to another non-terminal status
    async fn set_attempt_status(&mut self, id: i64, status: AttemptStatus)
        -> Result<(), StoreError>;

    /// Finalize an attempt. Fails if it is unknown or already finalized.
    async fn finalize_attempt(
        &mut self,
        id: i64,
        status: AttemptStatus,
        records_collected: u32,
        error_message: Option<&str>,
        ended_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Fetch one attempt
    async fn find_attempt(&mut self, id: i64) -> Result<Option<CollectionAttempt>, StoreError>;

    /// Attempts for a jurisdiction, oldest first
    async fn list_attempts(
        &mut self,
        jurisdiction_code: &str,
    ) -> Result<Vec<CollectionAttempt>, StoreError>;
}
