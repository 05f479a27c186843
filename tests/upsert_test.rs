//! Integration tests for the upsert engine against SQLite

mod common;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::time::Duration;

use common::{date, hm, memory_db, record};
use lottoharvest::models::{
    AttemptStatus, CollectionAttempt, DrawNumbers, GameDefinition, Jurisdiction, NewDrawResult,
    NewGame, ResultUpdate, StoredDrawResult,
};
use lottoharvest::storage::{Database, DrawStore, SqliteTarget, UpsertEngine, UpsertReport};
use lottoharvest::utils::error::StoreError;

async fn all_results(db: &Database, slug: &str, on: &str) -> Vec<StoredDrawResult> {
    let mut conn = db.acquire_pooled().await.unwrap();
    let store = conn.store();
    let game = store
        .find_games_by_slugs(&[slug.to_string()])
        .await
        .unwrap()
        .into_iter()
        .next()
        .expect("game should exist");
    store.find_results(&[(game.id, date(on))]).await.unwrap()
}

async fn upsert(db: &Database, records: &[lottoharvest::RawDrawRecord]) -> UpsertReport {
    let mut conn = db.acquire_pooled().await.unwrap();
    UpsertEngine::new()
        .upsert_batch(conn.store(), records)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_second_run_is_a_no_op() {
    let (db, states) = memory_db(&[("NY", "New York")]).await;
    let ny = states[0].id;
    let batch = vec![
        record("Take 5 Midday", ny, "2025-05-13", Some(hm(14, 30)), &["1", "2", "3", "4", "5"], None),
        record("Take 5 Evening", ny, "2025-05-13", Some(hm(22, 30)), &["6", "7", "8", "9", "10"], None),
    ];

    let first = upsert(&db, &batch).await;
    assert_eq!(first.inserted, 2);

    let second = upsert(&db, &batch).await;
    assert_eq!(
        second,
        UpsertReport {
            unchanged: 2,
            ..Default::default()
        }
    );

    let mut conn = db.acquire_pooled().await.unwrap();
    assert_eq!(conn.store().count_results().await.unwrap(), 2);
}

#[tokio::test]
async fn test_national_draw_seen_from_two_jurisdictions_is_stored_once() {
    let (db, states) = memory_db(&[("NY", "New York"), ("CA", "California")]).await;
    let numbers = ["5", "9", "12", "27", "41"];

    let mut ny = record("Powerball", states[0].id, "2025-05-13", Some(hm(23, 0)), &numbers, Some("$20 Million"));
    ny.values.special_number = Some("8".to_string());
    // Same draw shown with the Pacific time on the California page
    let mut ca = record("Powerball", states[1].id, "2025-05-13", Some(hm(20, 0)), &numbers, Some("$20 Million"));
    ca.values.special_number = Some("8".to_string());

    let report = upsert(&db, &[ny]).await;
    assert_eq!(report.inserted, 1);
    let report = upsert(&db, &[ca]).await;
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.inserted, 0);

    let rows = all_results(&db, "powerball", "2025-05-13").await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].draw_time, Some(hm(23, 0)));
    assert_eq!(rows[0].values.special_number.as_deref(), Some("8"));

    let mut conn = db.acquire_pooled().await.unwrap();
    let store = conn.store();
    let game = store
        .find_games_by_slugs(&["powerball".to_string()])
        .await
        .unwrap()
        .remove(0);
    assert!(game.is_multi_jurisdiction);
    let mut linked = store.game_jurisdictions(game.id).await.unwrap();
    linked.sort_unstable();
    assert_eq!(linked, vec![states[0].id, states[1].id]);
}

#[tokio::test]
async fn test_national_draw_correction_updates_in_place() {
    let (db, states) = memory_db(&[("NY", "New York"), ("CA", "California")]).await;

    upsert(
        &db,
        &[record("Mega Millions", states[0].id, "2025-05-13", Some(hm(23, 0)), &["1", "2", "3"], Some("$100 Million"))],
    )
    .await;
    let before = all_results(&db, "mega-millions", "2025-05-13").await;

    let report = upsert(
        &db,
        &[record("Mega Millions", states[1].id, "2025-05-13", Some(hm(23, 0)), &["1", "2", "4"], Some("$100 Million"))],
    )
    .await;
    assert_eq!(report.updated, 1);

    let after = all_results(&db, "mega-millions", "2025-05-13").await;
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].id, before[0].id);
    assert_eq!(after[0].values.numbers, DrawNumbers::new(["1", "2", "4"]));
}

#[tokio::test]
async fn test_scoped_game_keeps_each_draw_time() {
    let (db, states) = memory_db(&[("NY", "New York")]).await;
    let ny = states[0].id;

    let report = upsert(
        &db,
        &[
            record("Numbers", ny, "2025-05-13", Some(hm(12, 0)), &["1", "2", "3"], None),
            record("Numbers", ny, "2025-05-13", Some(hm(19, 0)), &["4", "5", "6"], None),
        ],
    )
    .await;
    assert_eq!(report.inserted, 2);

    let rows = all_results(&db, "numbers", "2025-05-13").await;
    let times: Vec<_> = rows.iter().map(|r| r.draw_time).collect();
    assert_eq!(times, vec![Some(hm(12, 0)), Some(hm(19, 0))]);
}

#[tokio::test]
async fn test_pick_3_midday_insert_unchanged_update() {
    let (db, states) = memory_db(&[("NY", "New York")]).await;
    let ny = states[0].id;
    let original = record("Pick 3 Midday", ny, "2025-05-13", Some(hm(12, 0)), &["1", "2", "3"], None);

    assert_eq!(upsert(&db, std::slice::from_ref(&original)).await.inserted, 1);
    assert_eq!(upsert(&db, std::slice::from_ref(&original)).await.unchanged, 1);
    let before = all_results(&db, "pick-3-midday", "2025-05-13").await.remove(0);

    tokio::time::sleep(Duration::from_millis(5)).await;

    let corrected = record("Pick 3 Midday", ny, "2025-05-13", Some(hm(12, 0)), &["1", "2", "4"], None);
    let report = upsert(&db, &[corrected]).await;
    assert_eq!(report, UpsertReport { updated: 1, ..Default::default() });

    let rows = all_results(&db, "pick-3-midday", "2025-05-13").await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, before.id);
    assert_eq!(rows[0].values.numbers, DrawNumbers::new(["1", "2", "4"]));
    assert!(rows[0].collected_at > before.collected_at);
}

#[tokio::test]
async fn test_secondary_field_change_is_an_update() {
    let (db, states) = memory_db(&[("NY", "New York")]).await;
    let ny = states[0].id;

    let mut draw = record("Take 5 Evening", ny, "2025-05-13", Some(hm(22, 30)), &["1", "2", "3", "4", "5"], None);
    upsert(&db, std::slice::from_ref(&draw)).await;

    draw.values.next_jackpot = Some("$500".to_string());
    assert_eq!(upsert(&db, std::slice::from_ref(&draw)).await.updated, 1);

    let row = all_results(&db, "take-5-evening", "2025-05-13").await.remove(0);
    assert_eq!(row.values.next_jackpot.as_deref(), Some("$500"));
}

#[tokio::test]
async fn test_untimed_row_is_matched_by_timed_record() {
    let (db, states) = memory_db(&[("NY", "New York")]).await;
    let ny = states[0].id;

    upsert(&db, &[record("Cash 5", ny, "2025-05-13", None, &["1"], None)]).await;
    let report = upsert(&db, &[record("Cash 5", ny, "2025-05-13", Some(hm(21, 0)), &["1"], None)]).await;

    assert_eq!(report.unchanged, 1);
    assert_eq!(all_results(&db, "cash-5", "2025-05-13").await.len(), 1);
}

#[tokio::test]
async fn test_timed_and_untimed_siblings_are_separate_rows() {
    let timed = |ny| record("Take 5", ny, "2025-05-13", Some(hm(14, 30)), &["1", "2", "3"], None);
    let untimed = |ny| record("Take 5", ny, "2025-05-13", None, &["7", "8", "9"], None);

    for timed_first in [true, false] {
        let (db, states) = memory_db(&[("NY", "New York")]).await;
        let ny = states[0].id;
        let batch = if timed_first {
            vec![timed(ny), untimed(ny)]
        } else {
            vec![untimed(ny), timed(ny)]
        };

        let first = upsert(&db, &batch).await;
        assert_eq!(first, UpsertReport { inserted: 2, ..Default::default() });

        for _ in 0..3 {
            let again = upsert(&db, &batch).await;
            assert_eq!(again, UpsertReport { unchanged: 2, ..Default::default() });
        }

        let rows = all_results(&db, "take-5", "2025-05-13").await;
        assert_eq!(rows.len(), 2);
        let timed_row = rows.iter().find(|r| r.draw_time == Some(hm(14, 30))).unwrap();
        let untimed_row = rows.iter().find(|r| r.draw_time.is_none()).unwrap();
        assert_eq!(timed_row.values.numbers, DrawNumbers::new(["1", "2", "3"]));
        assert_eq!(untimed_row.values.numbers, DrawNumbers::new(["7", "8", "9"]));
    }
}

#[tokio::test]
async fn test_duplicates_within_batch_collapse_to_last() {
    let (db, states) = memory_db(&[("NY", "New York")]).await;
    let ny = states[0].id;

    let report = upsert(
        &db,
        &[
            record("Win 4", ny, "2025-05-13", Some(hm(19, 30)), &["1", "1", "1", "1"], None),
            record("Win 4", ny, "2025-05-13", Some(hm(19, 30)), &["2", "2", "2", "2"], None),
        ],
    )
    .await;
    assert_eq!(report.inserted, 1);
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.total(), 2);

    let rows = all_results(&db, "win-4", "2025-05-13").await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].values.numbers, DrawNumbers::new(["2", "2", "2", "2"]));
}

#[tokio::test]
async fn test_empty_numbers_are_stored_and_compared() {
    let (db, states) = memory_db(&[("NY", "New York")]).await;
    let ny = states[0].id;
    let pending = record("Lotto", ny, "2025-05-14", None, &[], Some("$3 Million"));

    assert_eq!(upsert(&db, std::slice::from_ref(&pending)).await.inserted, 1);
    let rows = all_results(&db, "lotto", "2025-05-14").await;
    assert!(rows[0].values.numbers.is_empty());

    assert_eq!(upsert(&db, &[pending]).await.unchanged, 1);
}

#[tokio::test]
async fn test_logo_is_refreshed_but_never_cleared() {
    let (db, states) = memory_db(&[("NY", "New York")]).await;
    let ny = states[0].id;

    let mut with_logo = record("Take 5", ny, "2025-05-13", None, &["1"], None);
    with_logo.logo_ref = Some("https://cdn.example.com/take5.png".to_string());
    upsert(&db, &[with_logo]).await;

    let without_logo = record("Take 5", ny, "2025-05-14", None, &["2"], None);
    upsert(&db, &[without_logo]).await;

    let mut conn = db.acquire_pooled().await.unwrap();
    let game = conn
        .store()
        .find_games_by_slugs(&["take-5".to_string()])
        .await
        .unwrap()
        .remove(0);
    assert_eq!(game.logo_ref.as_deref(), Some("https://cdn.example.com/take5.png"));
}

/// SQLite store with injectable races and write failures
struct ScriptedStore {
    inner: rusqlite::Connection,
    /// A rival writer inserts the same identity with these numbers first
    rival_numbers: Option<DrawNumbers>,
    /// Inserts for this game slug fail outright
    failing_game: Option<String>,
    fail_updates: bool,
}

impl ScriptedStore {
    async fn new() -> Self {
        let mut inner = SqliteTarget::unique_memory().open().unwrap();
        inner.init_schema().await.unwrap();
        Self {
            inner,
            rival_numbers: None,
            failing_game: None,
            fail_updates: false,
        }
    }

    async fn racing(rival_numbers: &[&str]) -> Self {
        Self {
            rival_numbers: Some(DrawNumbers::new(rival_numbers.iter().copied())),
            ..Self::new().await
        }
    }

    fn disk_full() -> StoreError {
        StoreError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_FULL),
            Some("database or disk is full".to_string()),
        ))
    }
}

#[async_trait]
impl DrawStore for ScriptedStore {
    async fn init_schema(&mut self) -> Result<(), StoreError> {
        self.inner.init_schema().await
    }

    async fn list_jurisdictions(&mut self) -> Result<Vec<Jurisdiction>, StoreError> {
        self.inner.list_jurisdictions().await
    }

    async fn find_jurisdiction(&mut self, code: &str) -> Result<Option<Jurisdiction>, StoreError> {
        self.inner.find_jurisdiction(code).await
    }

    async fn save_jurisdiction(&mut self, code: &str, name: &str) -> Result<Jurisdiction, StoreError> {
        self.inner.save_jurisdiction(code, name).await
    }

    async fn find_games_by_slugs(&mut self, slugs: &[String]) -> Result<Vec<GameDefinition>, StoreError> {
        self.inner.find_games_by_slugs(slugs).await
    }

    async fn insert_game(&mut self, game: &NewGame) -> Result<GameDefinition, StoreError> {
        self.inner.insert_game(game).await
    }

    async fn update_game(&mut self, id: i64, name: &str, logo_ref: Option<&str>) -> Result<(), StoreError> {
        self.inner.update_game(id, name, logo_ref).await
    }

    async fn link_games(&mut self, pairs: &[(i64, i64)]) -> Result<usize, StoreError> {
        self.inner.link_games(pairs).await
    }

    async fn game_jurisdictions(&mut self, game_id: i64) -> Result<Vec<i64>, StoreError> {
        self.inner.game_jurisdictions(game_id).await
    }

    async fn find_results(&mut self, keys: &[(i64, NaiveDate)]) -> Result<Vec<StoredDrawResult>, StoreError> {
        self.inner.find_results(keys).await
    }

    async fn insert_result(&mut self, row: &NewDrawResult) -> Result<i64, StoreError> {
        if let Some(slug) = self.failing_game.clone() {
            let failing = self.inner.find_games_by_slugs(&[slug]).await?;
            if failing.iter().any(|game| game.id == row.game_id) {
                return Err(Self::disk_full());
            }
        }
        if let Some(numbers) = self.rival_numbers.take() {
            let mut rival = row.clone();
            rival.values.numbers = numbers;
            self.inner.insert_result(&rival).await?;
        }
        self.inner.insert_result(row).await
    }

    async fn update_results(&mut self, updates: &[ResultUpdate]) -> Result<usize, StoreError> {
        if self.fail_updates {
            return Err(Self::disk_full());
        }
        self.inner.update_results(updates).await
    }

    async fn count_results(&mut self) -> Result<u64, StoreError> {
        self.inner.count_results().await
    }

    async fn insert_attempt(
        &mut self,
        jurisdiction_code: &str,
        url: &str,
        status: AttemptStatus,
        started_at: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        self.inner
            .insert_attempt(jurisdiction_code, url, status, started_at)
            .await
    }

    async fn set_attempt_status(&mut self, id: i64, status: AttemptStatus) -> Result<(), StoreError> {
        self.inner.set_attempt_status(id, status).await
    }

    async fn finalize_attempt(
        &mut self,
        id: i64,
        status: AttemptStatus,
        records_collected: u32,
        error_message: Option<&str>,
        ended_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner
            .finalize_attempt(id, status, records_collected, error_message, ended_at)
            .await
    }

    async fn find_attempt(&mut self, id: i64) -> Result<Option<CollectionAttempt>, StoreError> {
        self.inner.find_attempt(id).await
    }

    async fn list_attempts(&mut self, jurisdiction_code: &str) -> Result<Vec<CollectionAttempt>, StoreError> {
        self.inner.list_attempts(jurisdiction_code).await
    }
}

#[tokio::test]
async fn test_insert_conflict_resolves_to_update() {
    let mut store = ScriptedStore::racing(&["9", "9", "9"]).await;
    let ny = store.save_jurisdiction("NY", "New York").await.unwrap();

    let mine = record("Pick 3 Evening", ny.id, "2025-05-13", Some(hm(19, 0)), &["1", "2", "3"], None);
    let report = UpsertEngine::new()
        .upsert_batch(&mut store, &[mine])
        .await
        .unwrap();

    assert_eq!(report, UpsertReport { updated: 1, ..Default::default() });
    assert_eq!(store.count_results().await.unwrap(), 1);

    let game = store
        .find_games_by_slugs(&["pick-3-evening".to_string()])
        .await
        .unwrap()
        .remove(0);
    let rows = store.find_results(&[(game.id, date("2025-05-13"))]).await.unwrap();
    assert_eq!(rows[0].values.numbers, DrawNumbers::new(["1", "2", "3"]));
}

#[tokio::test]
async fn test_insert_conflict_with_identical_row_is_unchanged() {
    let mut store = ScriptedStore::racing(&["1", "2", "3"]).await;
    let ny = store.save_jurisdiction("NY", "New York").await.unwrap();

    let mine = record("Pick 3 Evening", ny.id, "2025-05-13", Some(hm(19, 0)), &["1", "2", "3"], None);
    let report = UpsertEngine::new()
        .upsert_batch(&mut store, &[mine])
        .await
        .unwrap();

    assert_eq!(report, UpsertReport { unchanged: 1, ..Default::default() });
    assert_eq!(store.count_results().await.unwrap(), 1);
}

#[tokio::test]
async fn test_failed_insert_is_counted_and_siblings_still_land() {
    let mut store = ScriptedStore::new().await;
    store.failing_game = Some("take-5-evening".to_string());
    let ny = store.save_jurisdiction("NY", "New York").await.unwrap();

    let batch = vec![
        record("Take 5 Midday", ny.id, "2025-05-13", Some(hm(14, 30)), &["1", "2", "3", "4", "5"], None),
        record("Take 5 Evening", ny.id, "2025-05-13", Some(hm(22, 30)), &["6", "7", "8", "9", "10"], None),
        record("Numbers Midday", ny.id, "2025-05-13", Some(hm(14, 30)), &["4", "0", "7"], None),
    ];
    let report = UpsertEngine::new()
        .upsert_batch(&mut store, &batch)
        .await
        .unwrap();

    assert_eq!(report, UpsertReport { inserted: 2, errors: 1, ..Default::default() });
    assert_eq!(store.count_results().await.unwrap(), 2);
}

#[tokio::test]
async fn test_failed_batched_update_counts_every_queued_update() {
    let mut store = ScriptedStore::new().await;
    let ny = store.save_jurisdiction("NY", "New York").await.unwrap();
    let engine = UpsertEngine::new();

    let original = vec![
        record("Win 4 Midday", ny.id, "2025-05-13", Some(hm(14, 30)), &["1", "1", "1", "1"], None),
        record("Win 4 Evening", ny.id, "2025-05-13", Some(hm(22, 30)), &["2", "2", "2", "2"], None),
    ];
    engine.upsert_batch(&mut store, &original).await.unwrap();

    store.fail_updates = true;
    let corrected = vec![
        record("Win 4 Midday", ny.id, "2025-05-13", Some(hm(14, 30)), &["1", "1", "1", "9"], None),
        record("Win 4 Evening", ny.id, "2025-05-13", Some(hm(22, 30)), &["2", "2", "2", "9"], None),
        record("Pick 10", ny.id, "2025-05-13", Some(hm(20, 0)), &["3"], None),
    ];
    let report = engine.upsert_batch(&mut store, &corrected).await.unwrap();

    assert_eq!(report, UpsertReport { inserted: 1, errors: 2, ..Default::default() });
    assert_eq!(store.count_results().await.unwrap(), 3);

    let game = store
        .find_games_by_slugs(&["win-4-midday".to_string()])
        .await
        .unwrap()
        .remove(0);
    let rows = store.find_results(&[(game.id, date("2025-05-13"))]).await.unwrap();
    assert_eq!(rows[0].values.numbers, DrawNumbers::new(["1", "1", "1", "1"]));
}
