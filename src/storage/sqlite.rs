//! SQLite backend
//!
//! Connections are pooled with `deadpool`; a shared-cache URI lets every
//! pooled connection see the same in-memory database.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use deadpool::managed::{self, Metrics, RecycleError, RecycleResult};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row};

use super::repository::{DrawStore, LOOKUP_CHUNK_SIZE};
use super::schema::SQLITE_SCHEMA;
use crate::models::{
    AttemptStatus, CollectionAttempt, DrawNumbers, DrawValues, GameDefinition, Jurisdiction,
    NewDrawResult, NewGame, ResultUpdate, StoredDrawResult,
};
use crate::utils::error::StoreError;
use crate::utils::format_time;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

const RESULT_COLUMNS: &str = "id, game_id, draw_date, draw_time, timezone_offset, numbers, \
     special_number, jackpot, next_draw_date, next_draw_time, next_jackpot, collected_at";

const ATTEMPT_COLUMNS: &str =
    "id, state_code, url, status, start_time, end_time, games_collected, error_message";

// ============================================================================
// Connection manager
// ============================================================================

/// Where the SQLite database lives
#[derive(Debug, Clone)]
pub enum SqliteTarget {
    File(PathBuf),
    /// Shared-cache in-memory database identified by a URI
    Memory(String),
}

impl SqliteTarget {
    /// A fresh, uniquely named in-memory database
    pub fn unique_memory() -> Self {
        Self::Memory(format!(
            "file:lottoharvest-{}?mode=memory&cache=shared",
            uuid::Uuid::new_v4()
        ))
    }

    /// Open a connection to this target
    pub fn open(&self) -> rusqlite::Result<Connection> {
        let conn = match self {
            Self::File(path) => Connection::open(path)?,
            Self::Memory(uri) => Connection::open_with_flags(
                uri,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?,
        };
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }
}

/// `deadpool` manager producing SQLite connections
#[derive(Debug)]
pub struct SqliteManager {
    target: SqliteTarget,
}

impl SqliteManager {
    pub fn new(target: SqliteTarget) -> Self {
        Self { target }
    }
}

impl managed::Manager for SqliteManager {
    type Type = Connection;
    type Error = rusqlite::Error;

    async fn create(&self) -> Result<Connection, rusqlite::Error> {
        self.target.open()
    }

    async fn recycle(
        &self,
        conn: &mut Connection,
        _metrics: &Metrics,
    ) -> RecycleResult<rusqlite::Error> {
        conn.query_row("SELECT 1", [], |_| Ok(()))
            .map_err(RecycleError::Backend)
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn date_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| conversion_error(idx, e))
}

fn opt_date_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn opt_time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveTime>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| NaiveTime::parse_from_str(&raw, TIME_FORMAT).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn opt_timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| conversion_error(idx, e))
        })
        .transpose()
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

fn date_text(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn jurisdiction_from_row(row: &Row<'_>) -> rusqlite::Result<Jurisdiction> {
    Ok(Jurisdiction {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
    })
}

fn game_from_row(row: &Row<'_>) -> rusqlite::Result<GameDefinition> {
    Ok(GameDefinition {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        logo_ref: row.get(3)?,
        is_multi_jurisdiction: row.get(4)?,
    })
}

fn result_from_row(row: &Row<'_>) -> rusqlite::Result<StoredDrawResult> {
    let numbers_raw: String = row.get(5)?;
    let numbers = DrawNumbers::from_json(&numbers_raw).map_err(|e| conversion_error(5, e))?;

    Ok(StoredDrawResult {
        id: row.get(0)?,
        game_id: row.get(1)?,
        draw_date: date_at(row, 2)?,
        draw_time: opt_time_at(row, 3)?,
        values: DrawValues {
            numbers,
            special_number: row.get(6)?,
            jackpot: row.get(7)?,
            next_draw_date: opt_date_at(row, 8)?,
            next_draw_time: opt_time_at(row, 9)?,
            next_jackpot: row.get(10)?,
            timezone_offset: row.get(4)?,
        },
        collected_at: timestamp_at(row, 11)?,
    })
}

fn attempt_from_row(row: &Row<'_>) -> rusqlite::Result<CollectionAttempt> {
    let status_raw: String = row.get(3)?;
    let status = status_raw.parse::<AttemptStatus>().map_err(|e| {
        conversion_error(3, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })?;

    Ok(CollectionAttempt {
        id: row.get(0)?,
        jurisdiction_code: row.get(1)?,
        target_url: row.get(2)?,
        status,
        start_time: timestamp_at(row, 4)?,
        end_time: opt_timestamp_at(row, 5)?,
        records_collected: row.get(6)?,
        error_message: row.get(7)?,
    })
}

// ============================================================================
// Synchronous operations
// ============================================================================

fn find_games_by_slugs(
    conn: &Connection,
    slugs: &[String],
) -> Result<Vec<GameDefinition>, StoreError> {
    let mut games = Vec::with_capacity(slugs.len());

    for chunk in slugs.chunks(LOOKUP_CHUNK_SIZE) {
        let placeholders = chunk.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let query = format!(
            "SELECT id, name, slug, logo_ref, is_multi_jurisdiction \
             FROM games WHERE slug IN ({placeholders})"
        );
        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(params_from_iter(chunk.iter()), game_from_row)?;
        for game in rows {
            games.push(game?);
        }
    }

    Ok(games)
}

fn find_results(
    conn: &Connection,
    keys: &[(i64, NaiveDate)],
) -> Result<Vec<StoredDrawResult>, StoreError> {
    let mut results = Vec::new();

    for chunk in keys.chunks(LOOKUP_CHUNK_SIZE) {
        let clauses = chunk
            .iter()
            .map(|_| "(game_id = ? AND draw_date = ?)")
            .collect::<Vec<_>>()
            .join(" OR ");
        let query = format!("SELECT {RESULT_COLUMNS} FROM game_results WHERE {clauses}");

        let values: Vec<Value> = chunk
            .iter()
            .flat_map(|(game_id, date)| [Value::Integer(*game_id), Value::Text(date_text(*date))])
            .collect();

        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), result_from_row)?;
        for row in rows {
            results.push(row?);
        }
    }

    results.sort_by_key(|r| r.id);
    Ok(results)
}

fn insert_result(conn: &Connection, row: &NewDrawResult) -> Result<i64, StoreError> {
    let v = &row.values;
    conn.execute(
        "INSERT INTO game_results (game_id, draw_date, draw_time, timezone_offset, numbers, \
         special_number, jackpot, next_draw_date, next_draw_time, next_jackpot, collected_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            row.game_id,
            date_text(row.draw_date),
            row.draw_time.map(format_time),
            v.timezone_offset,
            v.numbers.to_json(),
            v.special_number,
            v.jackpot,
            v.next_draw_date.map(date_text),
            v.next_draw_time.map(format_time),
            v.next_jackpot,
            timestamp(Utc::now()),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn update_results(conn: &mut Connection, updates: &[ResultUpdate]) -> Result<usize, StoreError> {
    let tx = conn.transaction()?;
    let mut changed = 0;
    {
        let mut stmt = tx.prepare(
            "UPDATE game_results SET numbers = ?1, special_number = ?2, jackpot = ?3, \
             next_draw_date = ?4, next_draw_time = ?5, next_jackpot = ?6, timezone_offset = ?7, \
             collected_at = ?8 WHERE id = ?9",
        )?;
        let now = timestamp(Utc::now());
        for update in updates {
            let v = &update.values;
            changed += stmt.execute(params![
                v.numbers.to_json(),
                v.special_number,
                v.jackpot,
                v.next_draw_date.map(date_text),
                v.next_draw_time.map(format_time),
                v.next_jackpot,
                v.timezone_offset,
                now,
                update.id,
            ])?;
        }
    }
    tx.commit()?;
    Ok(changed)
}

fn finalize_attempt(
    conn: &Connection,
    id: i64,
    status: AttemptStatus,
    records_collected: u32,
    error_message: Option<&str>,
    ended_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    let changed = conn.execute(
        "UPDATE collection_log SET status = ?1, games_collected = ?2, error_message = ?3, \
         end_time = ?4 WHERE id = ?5 AND status IN ('pending', 'processing')",
        params![
            status.as_str(),
            records_collected,
            error_message,
            timestamp(ended_at),
            id
        ],
    )?;

    if changed == 0 {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM collection_log WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        return Err(if exists {
            StoreError::Conflict(format!("attempt {id} already finalized"))
        } else {
            StoreError::NotFound(format!("attempt {id}"))
        });
    }

    Ok(())
}

// ============================================================================
// DrawStore implementation
// ============================================================================

#[async_trait]
impl DrawStore for Connection {
    async fn init_schema(&mut self) -> Result<(), StoreError> {
        self.execute_batch(SQLITE_SCHEMA)?;
        Ok(())
    }

    async fn list_jurisdictions(&mut self) -> Result<Vec<Jurisdiction>, StoreError> {
        let mut stmt = self.prepare("SELECT id, code, name FROM states ORDER BY code")?;
        let rows = stmt.query_map([], jurisdiction_from_row)?;
        let mut jurisdictions = Vec::new();
        for row in rows {
            jurisdictions.push(row?);
        }
        Ok(jurisdictions)
    }

    async fn find_jurisdiction(&mut self, code: &str) -> Result<Option<Jurisdiction>, StoreError> {
        let found = self
            .query_row(
                "SELECT id, code, name FROM states WHERE code = ?1",
                params![code.to_uppercase()],
                jurisdiction_from_row,
            )
            .optional()?;
        Ok(found)
    }

    async fn save_jurisdiction(
        &mut self,
        code: &str,
        name: &str,
    ) -> Result<Jurisdiction, StoreError> {
        let code = code.to_uppercase();
        let saved = self.query_row(
            "INSERT INTO states (code, name) VALUES (?1, ?2) \
             ON CONFLICT(code) DO UPDATE SET name = excluded.name \
             RETURNING id, code, name",
            params![code, name],
            jurisdiction_from_row,
        )?;
        Ok(saved)
    }

    async fn find_games_by_slugs(
        &mut self,
        slugs: &[String],
    ) -> Result<Vec<GameDefinition>, StoreError> {
        find_games_by_slugs(self, slugs)
    }

    async fn insert_game(&mut self, game: &NewGame) -> Result<GameDefinition, StoreError> {
        self.execute(
            "INSERT INTO games (name, slug, logo_ref, is_multi_jurisdiction) VALUES (?1, ?2, ?3, ?4)",
            params![game.name, game.slug, game.logo_ref, game.is_multi_jurisdiction],
        )?;
        Ok(GameDefinition {
            id: self.last_insert_rowid(),
            name: game.name.clone(),
            slug: game.slug.clone(),
            logo_ref: game.logo_ref.clone(),
            is_multi_jurisdiction: game.is_multi_jurisdiction,
        })
    }

    async fn update_game(
        &mut self,
        id: i64,
        name: &str,
        logo_ref: Option<&str>,
    ) -> Result<(), StoreError> {
        let changed = self.execute(
            "UPDATE games SET name = ?1, logo_ref = ?2 WHERE id = ?3",
            params![name, logo_ref, id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("game {id}")));
        }
        Ok(())
    }

    async fn link_games(&mut self, pairs: &[(i64, i64)]) -> Result<usize, StoreError> {
        let mut stmt =
            self.prepare("INSERT OR IGNORE INTO state_games (game_id, state_id) VALUES (?1, ?2)")?;
        let mut created = 0;
        for (game_id, state_id) in pairs {
            created += stmt.execute(params![game_id, state_id])?;
        }
        Ok(created)
    }

    async fn game_jurisdictions(&mut self, game_id: i64) -> Result<Vec<i64>, StoreError> {
        let mut stmt =
            self.prepare("SELECT state_id FROM state_games WHERE game_id = ?1 ORDER BY state_id")?;
        let rows = stmt.query_map(params![game_id], |row| row.get::<_, i64>(0))?;
        let mut ids = Vec::new();
        for id in rows {
            ids.push(id?);
        }
        Ok(ids)
    }

    async fn find_results(
        &mut self,
        keys: &[(i64, NaiveDate)],
    ) -> Result<Vec<StoredDrawResult>, StoreError> {
        find_results(self, keys)
    }

    async fn insert_result(&mut self, row: &NewDrawResult) -> Result<i64, StoreError> {
        insert_result(self, row)
    }

    async fn update_results(&mut self, updates: &[ResultUpdate]) -> Result<usize, StoreError> {
        if updates.is_empty() {
            return Ok(0);
        }
        update_results(self, updates)
    }

    async fn count_results(&mut self) -> Result<u64, StoreError> {
        let count: i64 = self.query_row("SELECT COUNT(*) FROM game_results", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    async fn insert_attempt(
        &mut self,
        jurisdiction_code: &str,
        url: &str,
        status: AttemptStatus,
        started_at: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        self.execute(
            "INSERT INTO collection_log (state_code, url, status, start_time) VALUES (?1, ?2, ?3, ?4)",
            params![jurisdiction_code, url, status.as_str(), timestamp(started_at)],
        )?;
        Ok(self.last_insert_rowid())
    }

    async fn set_attempt_status(
        &mut self,
        id: i64,
        status: AttemptStatus,
    ) -> Result<(), StoreError> {
        let changed = self.execute(
            "UPDATE collection_log SET status = ?1 WHERE id = ?2 \
             AND status IN ('pending', 'processing')",
            params![status.as_str(), id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("open attempt {id}")));
        }
        Ok(())
    }

    async fn finalize_attempt(
        &mut self,
        id: i64,
        status: AttemptStatus,
        records_collected: u32,
        error_message: Option<&str>,
        ended_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        finalize_attempt(self, id, status, records_collected, error_message, ended_at)
    }

    async fn find_attempt(&mut self, id: i64) -> Result<Option<CollectionAttempt>, StoreError> {
        let query = format!("SELECT {ATTEMPT_COLUMNS} FROM collection_log WHERE id = ?1");
        let attempt = self
            .query_row(&query, params![id], attempt_from_row)
            .optional()?;
        Ok(attempt)
    }

    async fn list_attempts(
        &mut self,
        jurisdiction_code: &str,
    ) -> Result<Vec<CollectionAttempt>, StoreError> {
        let query =
            format!("SELECT {ATTEMPT_COLUMNS} FROM collection_log WHERE state_code = ?1 ORDER BY id");
        let mut stmt = self.prepare(&query)?;
        let rows = stmt.query_map(params![jurisdiction_code], attempt_from_row)?;
        let mut attempts = Vec::new();
        for row in rows {
            attempts.push(row?);
        }
        Ok(attempts)
    }
}
