//! Common utilities and helper functions
//!
//! Text normalization, slug derivation and the tolerant date/time parsing
//! shared by the extractor and the upsert engine.

pub mod error;
pub mod retry;

use chrono::{NaiveDate, NaiveTime, Timelike};
use regex::Regex;
use std::sync::OnceLock;

/// Date layouts seen on results pages, tried in order
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%a, %b-%d-%Y",
    "%a, %b %d, %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
];

/// Time layouts, tried in order after spacing has been normalized
const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M", "%I:%M:%S %p", "%I:%M %p", "%I.%M %p"];

/// Normalize whitespace in text
pub fn normalize_whitespace(text: &str) -> String {
    static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();

    let re = WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("Invalid regex pattern"));

    re.replace_all(text.trim(), " ").to_string()
}

/// Derive a URL-safe slug from a game name
///
/// ```
/// use lottoharvest::utils::slugify;
///
/// assert_eq!(slugify("Pick 3 Midday"), "pick-3-midday");
/// assert_eq!(slugify("  Cash4Life!  "), "cash4life");
/// ```
pub fn slugify(name: &str) -> String {
    static INVALID_RE: OnceLock<Regex> = OnceLock::new();
    static DASHES_RE: OnceLock<Regex> = OnceLock::new();

    let invalid = INVALID_RE.get_or_init(|| Regex::new(r"[^a-z0-9-]").expect("Invalid regex pattern"));
    let dashes = DASHES_RE.get_or_init(|| Regex::new(r"-+").expect("Invalid regex pattern"));

    let lowered = name.trim().to_lowercase().replace(' ', "-");
    let cleaned = invalid.replace_all(&lowered, "");
    let collapsed = dashes.replace_all(&cleaned, "-");

    collapsed.trim_matches('-').to_string()
}

/// Round a time to the nearest 5-minute mark
///
/// Seconds are dropped before rounding. A result of 24:00 wraps to 00:00.
#[must_use]
pub fn round_to_five_minutes(time: NaiveTime) -> NaiveTime {
    let minutes = time.hour() * 60 + time.minute();
    let rounded = ((minutes + 2) / 5 * 5) % (24 * 60);

    NaiveTime::from_hms_opt(rounded / 60, rounded % 60, 0).unwrap_or(NaiveTime::MIN)
}

/// Parse a date in any of the layouts used by results pages
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = normalize_whitespace(text);
    if text.is_empty() {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&text, format).ok())
}

/// Parse a clock time and round it to the 5-minute grid
///
/// Accepts `20:00`, `20:00:00`, `8:00 PM`, `08:00PM`, `8.00 pm` and `8 PM`.
pub fn parse_time(text: &str) -> Option<NaiveTime> {
    static MERIDIEM_RE: OnceLock<Regex> = OnceLock::new();
    static HOUR_ONLY_RE: OnceLock<Regex> = OnceLock::new();

    let meridiem = MERIDIEM_RE
        .get_or_init(|| Regex::new(r"(?i)\s*([ap])\.?m\.?$").expect("Invalid regex pattern"));
    let hour_only =
        HOUR_ONLY_RE.get_or_init(|| Regex::new(r"^(\d{1,2}) ([AP]M)$").expect("Invalid regex pattern"));

    let text = normalize_whitespace(text);
    if text.is_empty() {
        return None;
    }

    let spaced = meridiem
        .replace(&text, |caps: &regex::Captures<'_>| {
            format!(" {}M", caps[1].to_uppercase())
        })
        .to_string();
    let candidate = hour_only.replace(&spaced, "$1:00 $2").to_string();

    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(&candidate, format).ok())
        .map(round_to_five_minutes)
}

/// Format a draw time the way it is stored (`HH:MM`)
#[must_use]
pub fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}
