//! PostgreSQL backend
//!
//! Pool construction with `deadpool-postgres` and the [`DrawStore`]
//! implementation for a pooled `tokio_postgres::Client`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use deadpool_postgres::{Config as PgConfig, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::{Client, NoTls, Row};

use super::repository::DrawStore;
use super::schema::POSTGRES_SCHEMA;
use crate::models::{
    AttemptStatus, CollectionAttempt, DrawNumbers, DrawValues, GameDefinition, Jurisdiction,
    NewDrawResult, NewGame, ResultUpdate, StoredDrawResult,
};
use crate::utils::error::StoreError;
use crate::utils::format_time;

const RESULT_COLUMNS: &str = "r.id, r.game_id, r.draw_date, r.draw_time, r.timezone_offset, \
     r.numbers, r.special_number, r.jackpot, r.next_draw_date, r.next_draw_time, \
     r.next_jackpot, r.collected_at";

const ATTEMPT_COLUMNS: &str =
    "id, state_code, url, status, start_time, end_time, games_collected, error_message";

/// Create a connection pool for a `postgres://` URL
pub fn create_pool(url: &str, max_size: usize, wait_timeout: Duration) -> Result<Pool, StoreError> {
    let mut cfg = PgConfig::new();
    cfg.url = Some(url.to_string());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    let mut pool_cfg = PoolConfig::new(max_size);
    pool_cfg.timeouts.wait = Some(wait_timeout);
    cfg.pool = Some(pool_cfg);

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| StoreError::Pool(e.to_string()))
}

// ============================================================================
// Row mapping
// ============================================================================

fn parse_time(column: &'static str, raw: Option<String>) -> Result<Option<NaiveTime>, StoreError> {
    raw.map(|s| NaiveTime::parse_from_str(&s, "%H:%M").map_err(|e| StoreError::corrupt(column, e)))
        .transpose()
}

fn jurisdiction_from_row(row: &Row) -> Result<Jurisdiction, StoreError> {
    Ok(Jurisdiction {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        name: row.try_get("name")?,
    })
}

fn game_from_row(row: &Row) -> Result<GameDefinition, StoreError> {
    Ok(GameDefinition {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        logo_ref: row.try_get("logo_ref")?,
        is_multi_jurisdiction: row.try_get("is_multi_jurisdiction")?,
    })
}

fn result_from_row(row: &Row) -> Result<StoredDrawResult, StoreError> {
    let numbers_raw: String = row.try_get("numbers")?;
    let numbers =
        DrawNumbers::from_json(&numbers_raw).map_err(|e| StoreError::corrupt("numbers", e))?;

    Ok(StoredDrawResult {
        id: row.try_get("id")?,
        game_id: row.try_get("game_id")?,
        draw_date: row.try_get("draw_date")?,
        draw_time: parse_time("draw_time", row.try_get("draw_time")?)?,
        values: DrawValues {
            numbers,
            special_number: row.try_get("special_number")?,
            jackpot: row.try_get("jackpot")?,
            next_draw_date: row.try_get("next_draw_date")?,
            next_draw_time: parse_time("next_draw_time", row.try_get("next_draw_time")?)?,
            next_jackpot: row.try_get("next_jackpot")?,
            timezone_offset: row.try_get("timezone_offset")?,
        },
        collected_at: row.try_get("collected_at")?,
    })
}

fn attempt_from_row(row: &Row) -> Result<CollectionAttempt, StoreError> {
    let status: String = row.try_get("status")?;
    let records: i32 = row.try_get("games_collected")?;

    Ok(CollectionAttempt {
        id: row.try_get("id")?,
        jurisdiction_code: row.try_get("state_code")?,
        target_url: row.try_get("url")?,
        status: status
            .parse()
            .map_err(|e: String| StoreError::corrupt("status", e))?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        records_collected: records.max(0) as u32,
        error_message: row.try_get("error_message")?,
    })
}

// ============================================================================
// DrawStore implementation
// ============================================================================

#[async_trait]
impl DrawStore for Client {
    async fn init_schema(&mut self) -> Result<(), StoreError> {
        self.batch_execute(POSTGRES_SCHEMA).await?;
        tracing::info!("PostgreSQL schema initialized");
        Ok(())
    }

    async fn list_jurisdictions(&mut self) -> Result<Vec<Jurisdiction>, StoreError> {
        let rows = self
            .query("SELECT id, code, name FROM states ORDER BY code", &[])
            .await?;
        rows.iter().map(jurisdiction_from_row).collect()
    }

    async fn find_jurisdiction(&mut self, code: &str) -> Result<Option<Jurisdiction>, StoreError> {
        let code = code.to_uppercase();
        let row = self
            .query_opt("SELECT id, code, name FROM states WHERE code = $1", &[&code])
            .await?;
        row.as_ref().map(jurisdiction_from_row).transpose()
    }

    async fn save_jurisdiction(
        &mut self,
        code: &str,
        name: &str,
    ) -> Result<Jurisdiction, StoreError> {
        let code = code.to_uppercase();
        let row = self
            .query_one(
                "INSERT INTO states (code, name) VALUES ($1, $2) \
                 ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name \
                 RETURNING id, code, name",
                &[&code, &name],
            )
            .await?;
        jurisdiction_from_row(&row)
    }

    async fn find_games_by_slugs(
        &mut self,
        slugs: &[String],
    ) -> Result<Vec<GameDefinition>, StoreError> {
        if slugs.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self
            .query(
                "SELECT id, name, slug, logo_ref, is_multi_jurisdiction \
                 FROM games WHERE slug = ANY($1)",
                &[&slugs],
            )
            .await?;
        rows.iter().map(game_from_row).collect()
    }

    async fn insert_game(&mut self, game: &NewGame) -> Result<GameDefinition, StoreError> {
        let row = self
            .query_one(
                "INSERT INTO games (name, slug, logo_ref, is_multi_jurisdiction) \
                 VALUES ($1, $2, $3, $4) \
                 RETURNING id, name, slug, logo_ref, is_multi_jurisdiction",
                &[
                    &game.name,
                    &game.slug,
                    &game.logo_ref,
                    &game.is_multi_jurisdiction,
                ],
            )
            .await?;
        game_from_row(&row)
    }

    async fn update_game(
        &mut self,
        id: i64,
        name: &str,
        logo_ref: Option<&str>,
    ) -> Result<(), StoreError> {
        let changed = self
            .execute(
                "UPDATE games SET name = $1, logo_ref = $2 WHERE id = $3",
                &[&name, &logo_ref, &id],
            )
            .await?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("game {id}")));
        }
        Ok(())
    }

    async fn link_games(&mut self, pairs: &[(i64, i64)]) -> Result<usize, StoreError> {
        let stmt = self
            .prepare(
                "INSERT INTO state_games (game_id, state_id) VALUES ($1, $2) \
                 ON CONFLICT DO NOTHING",
            )
            .await?;
        let mut created = 0;
        for (game_id, state_id) in pairs {
            created += self.execute(&stmt, &[game_id, state_id]).await? as usize;
        }
        Ok(created)
    }

    async fn game_jurisdictions(&mut self, game_id: i64) -> Result<Vec<i64>, StoreError> {
        let rows = self
            .query(
                "SELECT state_id FROM state_games WHERE game_id = $1 ORDER BY state_id",
                &[&game_id],
            )
            .await?;
        Ok(rows.iter().map(|row| row.get::<_, i64>(0)).collect())
    }

    async fn find_results(
        &mut self,
        keys: &[(i64, NaiveDate)],
    ) -> Result<Vec<StoredDrawResult>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let game_ids: Vec<i64> = keys.iter().map(|(id, _)| *id).collect();
        let dates: Vec<NaiveDate> = keys.iter().map(|(_, date)| *date).collect();

        let query = format!(
            "SELECT DISTINCT {RESULT_COLUMNS} FROM game_results r \
             JOIN unnest($1::bigint[], $2::date[]) AS k(game_id, draw_date) \
               ON r.game_id = k.game_id AND r.draw_date = k.draw_date \
             ORDER BY r.id"
        );
        let rows = self.query(query.as_str(), &[&game_ids, &dates]).await?;
        rows.iter().map(result_from_row).collect()
    }

    async fn insert_result(&mut self, row: &NewDrawResult) -> Result<i64, StoreError> {
        let v = &row.values;
        let draw_time = row.draw_time.map(format_time);
        let next_draw_time = v.next_draw_time.map(format_time);
        let numbers = v.numbers.to_json();

        let inserted = self
            .query_one(
                "INSERT INTO game_results (game_id, draw_date, draw_time, timezone_offset, \
                 numbers, special_number, jackpot, next_draw_date, next_draw_time, next_jackpot, \
                 collected_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW()) \
                 RETURNING id",
                &[
                    &row.game_id,
                    &row.draw_date,
                    &draw_time,
                    &v.timezone_offset,
                    &numbers,
                    &v.special_number,
                    &v.jackpot,
                    &v.next_draw_date,
                    &next_draw_time,
                    &v.next_jackpot,
                ],
            )
            .await?;
        Ok(inserted.get(0))
    }

    async fn update_results(&mut self, updates: &[ResultUpdate]) -> Result<usize, StoreError> {
        if updates.is_empty() {
            return Ok(0);
        }

        let tx = self.transaction().await?;
        let stmt = tx
            .prepare(
                "UPDATE game_results SET numbers = $1, special_number = $2, jackpot = $3, \
                 next_draw_date = $4, next_draw_time = $5, next_jackpot = $6, \
                 timezone_offset = $7, collected_at = NOW() WHERE id = $8",
            )
            .await?;

        let mut changed = 0;
        for update in updates {
            let v = &update.values;
            let numbers = v.numbers.to_json();
            let next_draw_time = v.next_draw_time.map(format_time);
            changed += tx
                .execute(
                    &stmt,
                    &[
                        &numbers,
                        &v.special_number,
                        &v.jackpot,
                        &v.next_draw_date,
                        &next_draw_time,
                        &v.next_jackpot,
                        &v.timezone_offset,
                        &update.id,
                    ],
                )
                .await? as usize;
        }
        tx.commit().await?;
        Ok(changed)
    }

    async fn count_results(&mut self) -> Result<u64, StoreError> {
        let row = self.query_one("SELECT COUNT(*) FROM game_results", &[]).await?;
        let count: i64 = row.get(0);
        Ok(count as u64)
    }

    async fn insert_attempt(
        &mut self,
        jurisdiction_code: &str,
        url: &str,
        status: AttemptStatus,
        started_at: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let row = self
            .query_one(
                "INSERT INTO collection_log (state_code, url, status, start_time) \
                 VALUES ($1, $2, $3, $4) RETURNING id",
                &[&jurisdiction_code, &url, &status.as_str(), &started_at],
            )
            .await?;
        Ok(row.get(0))
    }

    async fn set_attempt_status(
        &mut self,
        id: i64,
        status: AttemptStatus,
    ) -> Result<(), StoreError> {
        let changed = self
            .execute(
                "UPDATE collection_log SET status = $1 WHERE id = $2 \
                 AND status IN ('pending', 'processing')",
                &[&status.as_str(), &id],
            )
            .await?;
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
        let records = records_collected.min(i32::MAX as u32) as i32;
        let changed = self
            .execute(
                "UPDATE collection_log SET status = $1, games_collected = $2, \
                 error_message = $3, end_time = $4 \
                 WHERE id = $5 AND status IN ('pending', 'processing')",
                &[&status.as_str(), &records, &error_message, &ended_at, &id],
            )
            .await?;

        if changed == 0 {
            let exists = self
                .query_opt("SELECT 1 FROM collection_log WHERE id = $1", &[&id])
                .await?
                .is_some();
            return Err(if exists {
                StoreError::Conflict(format!("attempt {id} already finalized"))
            } else {
                StoreError::NotFound(format!("attempt {id}"))
            });
        }
        Ok(())
    }

    async fn find_attempt(&mut self, id: i64) -> Result<Option<CollectionAttempt>, StoreError> {
        let query = format!("SELECT {ATTEMPT_COLUMNS} FROM collection_log WHERE id = $1");
        let row = self.query_opt(query.as_str(), &[&id]).await?;
        row.as_ref().map(attempt_from_row).transpose()
    }

    async fn list_attempts(
        &mut self,
        jurisdiction_code: &str,
    ) -> Result<Vec<CollectionAttempt>, StoreError> {
        let query = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM collection_log WHERE state_code = $1 ORDER BY id"
        );
        let rows = self.query(query.as_str(), &[&jurisdiction_code]).await?;
        rows.iter().map(attempt_from_row).collect()
    }
}
