// Core data structures for the draw-results pipeline

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Games whose draw is identical across every participating jurisdiction
pub const MULTI_JURISDICTION_GAMES: &[&str] = &[
    "Powerball",
    "Mega Millions",
    "Lucky for Life",
    "Cash4Life",
    "Lotto America",
    "2by2",
    "Tri-State",
];

/// Check a game name against the national game list (case-insensitive substring)
pub fn is_multi_jurisdiction_name(name: &str) -> bool {
    let lowered = name.to_lowercase();
    MULTI_JURISDICTION_GAMES
        .iter()
        .any(|game| lowered.contains(&game.to_lowercase()))
}

/// A state (or other region) whose results are tracked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jurisdiction {
    pub id: i64,
    pub code: String,
    pub name: String,
}

/// A game known to storage, keyed by slug
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameDefinition {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub logo_ref: Option<String>,
    /// Computed once at creation, never re-derived
    pub is_multi_jurisdiction: bool,
}

/// A game about to be created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGame {
    pub name: String,
    pub slug: String,
    pub logo_ref: Option<String>,
    pub is_multi_jurisdiction: bool,
}

impl NewGame {
    /// Build a definition for a first sighting, classifying it once
    pub fn first_sighting(name: &str, slug: &str, logo_ref: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            slug: slug.to_string(),
            logo_ref: logo_ref.map(str::to_string),
            is_multi_jurisdiction: is_multi_jurisdiction_name(name),
        }
    }
}

/// Ordered drawn numbers, stored as a JSON array
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DrawNumbers(pub Vec<String>);

impl DrawNumbers {
    pub fn new<I, S>(numbers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(numbers.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Serialize for storage
    pub fn to_json(&self) -> String {
        // A Vec<String> cannot fail to serialize
        serde_json::to_string(&self.0).unwrap_or_else(|_| String::from("[]"))
    }

    /// Deserialize from storage
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw).map(Self)
    }
}

impl fmt::Display for DrawNumbers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(" "))
    }
}

/// The mutable fields of a draw, compared to decide update vs unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawValues {
    pub numbers: DrawNumbers,
    pub special_number: Option<String>,
    pub jackpot: Option<String>,
    pub next_draw_date: Option<NaiveDate>,
    pub next_draw_time: Option<NaiveTime>,
    pub next_jackpot: Option<String>,
    pub timezone_offset: Option<String>,
}

impl DrawValues {
    /// The fields that identify a national draw across jurisdictions
    pub fn same_draw(&self, other: &Self) -> bool {
        self.numbers == other.numbers && self.jackpot == other.jackpot
    }
}

/// A draw candidate produced by the extractor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDrawRecord {
    pub game_name: String,
    pub game_slug: String,
    pub logo_ref: Option<String>,
    pub jurisdiction_id: i64,
    pub draw_date: NaiveDate,
    /// Always on the 5-minute grid
    pub draw_time: Option<NaiveTime>,
    pub values: DrawValues,
}

/// A persisted draw
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDrawResult {
    pub id: i64,
    pub game_id: i64,
    pub draw_date: NaiveDate,
    pub draw_time: Option<NaiveTime>,
    pub values: DrawValues,
    pub collected_at: DateTime<Utc>,
}

/// A draw row about to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDrawResult {
    pub game_id: i64,
    pub draw_date: NaiveDate,
    pub draw_time: Option<NaiveTime>,
    pub values: DrawValues,
}

/// Replacement values for an existing row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultUpdate {
    pub id: i64,
    pub values: DrawValues,
}

/// Status of a crawl attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether the attempt has been finalized
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown attempt status: {other}")),
        }
    }
}

/// One logged crawl unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionAttempt {
    pub id: i64,
    pub jurisdiction_code: String,
    pub target_url: String,
    pub status: AttemptStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub records_collected: u32,
    pub error_message: Option<String>,
}
