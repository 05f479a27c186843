//! Job summary written at the end of every crawl run

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::UpsertReport;

/// Outcome of one date for one jurisdiction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateResult {
    pub date: NaiveDate,
    pub games_collected: usize,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Outcome of one jurisdiction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateResult {
    pub state_code: String,
    pub success: bool,
    pub games_collected: usize,
    pub days_processed: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_results: Option<Vec<DateResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StateResult {
    /// A jurisdiction that never got to fetch anything
    pub fn failed(state_code: &str, message: impl Into<String>) -> Self {
        Self {
            state_code: state_code.to_string(),
            success: false,
            games_collected: 0,
            days_processed: 0,
            date_results: None,
            message: Some(message.into()),
        }
    }
}

/// Run timing and mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMetadata {
    pub job_start: DateTime<Utc>,
    pub job_end: DateTime<Utc>,
    pub duration_seconds: f64,
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_back: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub week_collection: Option<bool>,
}

/// Structured result of a crawl run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    /// True when at least one jurisdiction succeeded
    pub success: bool,
    pub states_processed: usize,
    pub games_collected: usize,
    pub state_results: Vec<StateResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistence: Option<UpsertReport>,
    pub metadata: JobMetadata,
    /// Why the run stopped before crawling anything
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl JobSummary {
    /// Assemble the summary from per-jurisdiction results
    pub fn from_results(
        state_results: Vec<StateResult>,
        persistence: Option<UpsertReport>,
        metadata: JobMetadata,
    ) -> Self {
        Self {
            success: state_results.iter().any(|s| s.success),
            states_processed: state_results.len(),
            games_collected: state_results.iter().map(|s| s.games_collected).sum(),
            state_results,
            persistence,
            metadata,
            message: None,
        }
    }

    /// A run that failed before any jurisdiction was crawled
    pub fn aborted(metadata: JobMetadata, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::from_results(Vec::new(), None, metadata)
        }
    }

    /// Pretty JSON for `--output` and stdout
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
