//! Deduplication and upsert engine
//!
//! Turns a batch of [`RawDrawRecord`]s into insert, update or no-op
//! decisions against what is already stored.
//!
//! Identity depends on the game's persisted classification:
//!
//! - jurisdiction-scoped games: one row per `(game, date, time)`. A timed
//!   record that is the batch's only record for its `(game, date)` falls back
//!   to a stored row without a time;
//! - multi-jurisdiction games: one row per `(game, date)`. A record whose
//!   numbers and jackpot match any stored variant is a no-op; otherwise it
//!   corrects the stored variant in place.
//!
//! The sequence lookup, decide, write is not wrapped in a transaction. Each
//! insert re-checks storage first and a uniqueness conflict on insert is
//! resolved against the row that won the race.

use std::collections::{HashMap, HashSet};

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::repository::DrawStore;
use crate::models::{
    GameDefinition, NewDrawResult, NewGame, RawDrawRecord, ResultUpdate, StoredDrawResult,
};
use crate::utils::error::StoreError;

/// Counters for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub errors: usize,
}

impl UpsertReport {
    /// Accumulate another batch's counters
    pub fn merge(&mut self, other: &UpsertReport) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.errors += other.errors;
    }

    /// Records accounted for
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.unchanged + self.errors
    }
}

/// Identity of a record within a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum IdentityKey {
    /// Multi-jurisdiction draw
    Draw(i64, NaiveDate),
    /// Jurisdiction-scoped draw
    Timed(i64, NaiveDate, Option<NaiveTime>),
}

impl IdentityKey {
    fn of(game: &GameDefinition, record: &RawDrawRecord) -> Self {
        if game.is_multi_jurisdiction {
            Self::Draw(game.id, record.draw_date)
        } else {
            Self::Timed(game.id, record.draw_date, record.draw_time)
        }
    }
}

/// What to do with one record
#[derive(Debug, Clone, PartialEq, Eq)]
enum Decision {
    Unchanged { id: i64 },
    Update(ResultUpdate),
    Insert(NewDrawResult),
}

/// A record with its resolved game
struct Candidate<'a> {
    game: &'a GameDefinition,
    record: &'a RawDrawRecord,
    /// No other record in the batch shares this `(game, date)`
    sole: bool,
}

impl Candidate<'_> {
    fn date_key(&self) -> (i64, NaiveDate) {
        (self.game.id, self.record.draw_date)
    }

    fn new_row(&self) -> NewDrawResult {
        NewDrawResult {
            game_id: self.game.id,
            draw_date: self.record.draw_date,
            draw_time: self.record.draw_time,
            values: self.record.values.clone(),
        }
    }

    /// Decide against the stored rows sharing this record's `(game, date)`
    fn decide(&self, existing: &[StoredDrawResult]) -> Decision {
        let matched = if self.game.is_multi_jurisdiction {
            if let Some(same) = existing
                .iter()
                .find(|row| row.values.same_draw(&self.record.values))
            {
                return Decision::Unchanged { id: same.id };
            }
            existing
                .iter()
                .find(|row| row.draw_time == self.record.draw_time)
                .or_else(|| existing.first())
        } else {
            match_scoped(self.record.draw_time, existing, self.sole)
        };

        match matched {
            Some(row) if row.values == self.record.values => Decision::Unchanged { id: row.id },
            Some(row) => Decision::Update(ResultUpdate {
                id: row.id,
                values: self.record.values.clone(),
            }),
            None => Decision::Insert(self.new_row()),
        }
    }
}

/// Pick the stored row a jurisdiction-scoped record refers to
///
/// The untimed fallback is only taken by a record with no sibling for the
/// same `(game, date)`, so two records never fold into one row.
fn match_scoped(
    draw_time: Option<NaiveTime>,
    existing: &[StoredDrawResult],
    allow_fallback: bool,
) -> Option<&StoredDrawResult> {
    let exact = existing.iter().find(|row| row.draw_time == draw_time);
    if exact.is_some() || draw_time.is_none() || !allow_fallback {
        return exact;
    }
    existing.iter().find(|row| row.draw_time.is_none())
}

/// The upsert engine
#[derive(Debug, Clone, Copy, Default)]
pub struct UpsertEngine;

impl UpsertEngine {
    pub fn new() -> Self {
        Self
    }

    /// Persist a batch of records
    ///
    /// Per-record write failures are counted in `errors` and do not stop the
    /// batch. An error is returned only when game resolution or the batch
    /// lookup fails, in which case nothing after that step was written.
    pub async fn upsert_batch(
        &self,
        store: &mut dyn DrawStore,
        records: &[RawDrawRecord],
    ) -> Result<UpsertReport, StoreError> {
        let mut report = UpsertReport::default();
        if records.is_empty() {
            return Ok(report);
        }

        let games = self.resolve_games(store, records).await?;

        // Collapse repeated identities; the last observation wins
        let mut order: Vec<IdentityKey> = Vec::new();
        let mut latest: HashMap<IdentityKey, Candidate<'_>> = HashMap::new();
        let mut per_date: HashMap<(i64, NaiveDate), usize> = HashMap::new();
        for record in records {
            let Some(game) = games.get(&record.game_slug) else {
                warn!(slug = %record.game_slug, "Game missing after resolution");
                report.errors += 1;
                continue;
            };
            let key = IdentityKey::of(game, record);
            let candidate = Candidate {
                game,
                record,
                sole: false,
            };
            if latest.insert(key, candidate).is_some() {
                report.unchanged += 1;
            } else {
                *per_date.entry((game.id, record.draw_date)).or_default() += 1;
                order.push(key);
            }
        }
        for candidate in latest.values_mut() {
            candidate.sole = per_date.get(&candidate.date_key()) == Some(&1);
        }

        let date_keys: Vec<(i64, NaiveDate)> = {
            let mut seen = HashSet::new();
            order
                .iter()
                .filter_map(|key| latest.get(key).map(Candidate::date_key))
                .filter(|key| seen.insert(*key))
                .collect()
        };
        let existing = group_by_date(store.find_results(&date_keys).await?);

        let mut updates = Vec::new();
        let mut inserts = Vec::new();
        for key in &order {
            let Some(candidate) = latest.get(key) else {
                continue;
            };
            let rows = existing
                .get(&candidate.date_key())
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            match candidate.decide(rows) {
                Decision::Unchanged { id } => {
                    debug!(slug = %candidate.game.slug, date = %candidate.record.draw_date, id, "Unchanged");
                    report.unchanged += 1;
                }
                Decision::Update(update) => updates.push(update),
                Decision::Insert(_) => inserts.push(candidate),
            }
        }

        if !updates.is_empty() {
            match store.update_results(&updates).await {
                Ok(_) => report.updated += updates.len(),
                Err(e) => {
                    warn!(count = updates.len(), error = %e, "Batch update failed");
                    report.errors += updates.len();
                }
            }
        }

        for candidate in inserts {
            self.insert_one(store, candidate, &mut report).await;
        }

        info!(
            inserted = report.inserted,
            updated = report.updated,
            unchanged = report.unchanged,
            errors = report.errors,
            "Upserted draw batch"
        );
        Ok(report)
    }

    /// Look up, create or refresh every game named in the batch
    async fn resolve_games(
        &self,
        store: &mut dyn DrawStore,
        records: &[RawDrawRecord],
    ) -> Result<HashMap<String, GameDefinition>, StoreError> {
        // Last observation of each slug carries the freshest name and logo
        let mut observed: HashMap<&str, &RawDrawRecord> = HashMap::new();
        let mut slugs: Vec<String> = Vec::new();
        for record in records {
            if observed.insert(&record.game_slug, record).is_none() {
                slugs.push(record.game_slug.clone());
            }
        }

        let mut games: HashMap<String, GameDefinition> = store
            .find_games_by_slugs(&slugs)
            .await?
            .into_iter()
            .map(|game| (game.slug.clone(), game))
            .collect();

        for slug in &slugs {
            let Some(record) = observed.get(slug.as_str()) else {
                continue;
            };

            match games.get_mut(slug) {
                Some(game) => {
                    let logo = record.logo_ref.as_ref().or(game.logo_ref.as_ref()).cloned();
                    if game.name != record.game_name || game.logo_ref != logo {
                        store.update_game(game.id, &record.game_name, logo.as_deref()).await?;
                        game.name = record.game_name.clone();
                        game.logo_ref = logo;
                    }
                }
                None => {
                    let new_game = NewGame::first_sighting(
                        &record.game_name,
                        slug,
                        record.logo_ref.as_deref(),
                    );
                    let created = match store.insert_game(&new_game).await {
                        Ok(game) => game,
                        Err(StoreError::Conflict(_)) => store
                            .find_games_by_slugs(std::slice::from_ref(slug))
                            .await?
                            .into_iter()
                            .next()
                            .ok_or_else(|| StoreError::NotFound(format!("game {slug}")))?,
                        Err(e) => return Err(e),
                    };
                    debug!(
                        slug = %created.slug,
                        multi = created.is_multi_jurisdiction,
                        "Registered game"
                    );
                    games.insert(slug.clone(), created);
                }
            }
        }

        let mut links: Vec<(i64, i64)> = records
            .iter()
            .filter_map(|r| games.get(&r.game_slug).map(|g| (g.id, r.jurisdiction_id)))
            .collect();
        links.sort_unstable();
        links.dedup();
        store.link_games(&links).await?;

        Ok(games)
    }

    /// Insert one record, re-checking storage and recovering from conflicts
    async fn insert_one(
        &self,
        store: &mut dyn DrawStore,
        candidate: &Candidate<'_>,
        report: &mut UpsertReport,
    ) {
        let decision = match store.find_results(&[candidate.date_key()]).await {
            Ok(rows) => candidate.decide(&rows),
            Err(e) => {
                warn!(slug = %candidate.game.slug, error = %e, "Re-check before insert failed");
                report.errors += 1;
                return;
            }
        };

        let row = match decision {
            Decision::Insert(row) => row,
            other => {
                debug!(slug = %candidate.game.slug, "Row appeared before insert");
                self.apply(store, other, report).await;
                return;
            }
        };

        match store.insert_result(&row).await {
            Ok(id) => {
                debug!(slug = %candidate.game.slug, date = %row.draw_date, id, "Inserted");
                report.inserted += 1;
            }
            Err(StoreError::Conflict(detail)) => {
                debug!(slug = %candidate.game.slug, detail = %detail, "Insert conflict, re-resolving");
                match store.find_results(&[candidate.date_key()]).await {
                    Ok(rows) => match candidate.decide(&rows) {
                        Decision::Insert(_) => {
                            warn!(
                                slug = %candidate.game.slug,
                                date = %row.draw_date,
                                "Conflicting row not visible after insert conflict"
                            );
                            report.errors += 1;
                        }
                        other => self.apply(store, other, report).await,
                    },
                    Err(e) => {
                        warn!(slug = %candidate.game.slug, error = %e, "Lookup after conflict failed");
                        report.errors += 1;
                    }
                }
            }
            Err(e) => {
                warn!(
                    slug = %candidate.game.slug,
                    date = %row.draw_date,
                    error = %e,
                    "Insert failed"
                );
                report.errors += 1;
            }
        }
    }

    /// Apply a non-insert decision reached during insert recovery
    async fn apply(&self, store: &mut dyn DrawStore, decision: Decision, report: &mut UpsertReport) {
        match decision {
            Decision::Unchanged { .. } => report.unchanged += 1,
            Decision::Update(update) => match store.update_results(std::slice::from_ref(&update)).await {
                Ok(_) => report.updated += 1,
                Err(e) => {
                    warn!(id = update.id, error = %e, "Update failed");
                    report.errors += 1;
                }
            },
            Decision::Insert(_) => report.errors += 1,
        }
    }
}

fn group_by_date(rows: Vec<StoredDrawResult>) -> HashMap<(i64, NaiveDate), Vec<StoredDrawResult>> {
    let mut grouped: HashMap<(i64, NaiveDate), Vec<StoredDrawResult>> = HashMap::new();
    for row in rows {
        grouped.entry((row.game_id, row.draw_date)).or_default().push(row);
    }
    for variants in grouped.values_mut() {
        variants.sort_by_key(|row| row.id);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DrawNumbers, DrawValues};
    use chrono::Utc;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn stored(id: i64, time: Option<NaiveTime>, numbers: &[&str]) -> StoredDrawResult {
        StoredDrawResult {
            id,
            game_id: 1,
            draw_date: date("2025-05-13"),
            draw_time: time,
            values: DrawValues {
                numbers: DrawNumbers::new(numbers.iter().copied()),
                ..Default::default()
            },
            collected_at: Utc::now(),
        }
    }

    fn game(multi: bool) -> GameDefinition {
        GameDefinition {
            id: 1,
            name: "Game".into(),
            slug: "game".into(),
            logo_ref: None,
            is_multi_jurisdiction: multi,
        }
    }

    fn record(time: Option<NaiveTime>, numbers: &[&str]) -> RawDrawRecord {
        RawDrawRecord {
            game_name: "Game".into(),
            game_slug: "game".into(),
            logo_ref: None,
            jurisdiction_id: 1,
            draw_date: date("2025-05-13"),
            draw_time: time,
            values: DrawValues {
                numbers: DrawNumbers::new(numbers.iter().copied()),
                ..Default::default()
            },
        }
    }

    fn at(h: u32, m: u32) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(h, m, 0)
    }

    #[test]
    fn test_scoped_matches_exact_time_before_untimed() {
        let rows = vec![stored(1, None, &["1"]), stored(2, at(19, 0), &["2"])];
        assert_eq!(match_scoped(at(19, 0), &rows, true).map(|r| r.id), Some(2));
        assert_eq!(match_scoped(at(12, 0), &rows, true).map(|r| r.id), Some(1));
        assert_eq!(match_scoped(None, &rows, true).map(|r| r.id), Some(1));
    }

    #[test]
    fn test_scoped_different_time_is_new_row() {
        let rows = vec![stored(1, at(12, 30), &["1"])];
        assert!(match_scoped(at(19, 30), &rows, true).is_none());
        // An untimed record never takes over a timed row
        assert!(match_scoped(None, &rows, true).is_none());
    }

    #[test]
    fn test_scoped_fallback_needs_a_sole_record() {
        let rows = vec![stored(1, None, &["1"])];
        assert_eq!(match_scoped(at(14, 30), &rows, true).map(|r| r.id), Some(1));
        assert!(match_scoped(at(14, 30), &rows, false).is_none());
    }

    #[test]
    fn test_multi_exact_match_is_unchanged_even_with_other_fields() {
        let g = game(true);
        let mut r = record(at(22, 55), &["5", "9"]);
        r.values.next_jackpot = Some("$30 Million".into());
        let c = Candidate {
            game: &g,
            record: &r,
            sole: true,
        };

        let decision = c.decide(&[stored(7, at(23, 0), &["5", "9"])]);
        assert_eq!(decision, Decision::Unchanged { id: 7 });
    }

    #[test]
    fn test_multi_correction_updates_existing_variant() {
        let g = game(true);
        let r = record(at(23, 0), &["5", "10"]);
        let c = Candidate {
            game: &g,
            record: &r,
            sole: true,
        };

        match c.decide(&[stored(7, at(23, 0), &["5", "9"])]) {
            Decision::Update(update) => {
                assert_eq!(update.id, 7);
                assert_eq!(update.values.numbers, DrawNumbers::new(["5", "10"]));
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn test_no_existing_rows_inserts() {
        let g = game(false);
        let r = record(None, &["1", "2", "3"]);
        let c = Candidate {
            game: &g,
            record: &r,
            sole: true,
        };
        assert!(matches!(c.decide(&[]), Decision::Insert(_)));
    }

    #[test]
    fn test_report_merge() {
        let mut total = UpsertReport::default();
        total.merge(&UpsertReport {
            inserted: 2,
            updated: 1,
            unchanged: 3,
            errors: 0,
        });
        total.merge(&UpsertReport {
            inserted: 1,
            updated: 0,
            unchanged: 0,
            errors: 1,
        });
        assert_eq!(total.inserted, 3);
        assert_eq!(total.total(), 8);
    }
}
