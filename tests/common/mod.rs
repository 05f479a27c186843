//! Common test utilities

#![allow(dead_code)]

pub mod fixtures;

use chrono::{NaiveDate, NaiveTime};
use lottoharvest::models::{DrawNumbers, DrawValues, Jurisdiction, RawDrawRecord};
use lottoharvest::storage::Database;
use lottoharvest::utils::slugify;

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

/// Fresh in-memory database with the given jurisdictions saved
pub async fn memory_db(jurisdictions: &[(&str, &str)]) -> (Database, Vec<Jurisdiction>) {
    let db = Database::in_memory().await.unwrap();
    let mut saved = Vec::new();
    {
        let mut conn = db.acquire_pooled().await.unwrap();
        for (code, name) in jurisdictions {
            saved.push(conn.store().save_jurisdiction(code, name).await.unwrap());
        }
    }
    (db, saved)
}

/// A draw record with numbers and a jackpot
pub fn record(
    game: &str,
    jurisdiction_id: i64,
    draw_date: &str,
    draw_time: Option<NaiveTime>,
    numbers: &[&str],
    jackpot: Option<&str>,
) -> RawDrawRecord {
    RawDrawRecord {
        game_name: game.to_string(),
        game_slug: slugify(game),
        logo_ref: None,
        jurisdiction_id,
        draw_date: date(draw_date),
        draw_time,
        values: DrawValues {
            numbers: DrawNumbers::new(numbers.iter().copied()),
            jackpot: jackpot.map(str::to_string),
            ..Default::default()
        },
    }
}
