use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::PathBuf;

use lottoharvest::config::Config;
use lottoharvest::crawler::{CrawlPlan, JobSummary};
use lottoharvest::parser::draws::today;

use super::{discover, emit_summary, run_plan, Targets};

/// Flags of the `historical` subcommand
#[derive(Debug, Clone, Default)]
pub struct HistoricalArgs {
    pub states: Option<String>,
    pub start: Option<String>,
    pub max_days: Option<u32>,
    pub max_empty_days: Option<u32>,
    pub discover: bool,
    pub save_to_db: bool,
    pub output: Option<PathBuf>,
    pub quiet: bool,
}

impl HistoricalArgs {
    pub fn plan(&self, config: &Config) -> Result<CrawlPlan> {
        let start = match &self.start {
            Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .with_context(|| format!("Invalid --start '{raw}', expected YYYY-MM-DD"))?,
            None => today(),
        };

        Ok(CrawlPlan::Historical {
            start,
            max_days_back: self.max_days.unwrap_or(config.collection.max_days_back),
            max_consecutive_empty_days: self
                .max_empty_days
                .unwrap_or(config.collection.max_consecutive_empty_days),
        })
    }
}

/// Walk back through history for every jurisdiction
pub async fn historical(config: Config, args: HistoricalArgs) -> Result<JobSummary> {
    let plan = args.plan(&config)?;

    if args.discover {
        // A failed discovery still leaves previously stored jurisdictions
        match discover(&config).await {
            Ok(found) => tracing::info!(jurisdictions = found, "Discovery finished"),
            Err(e) => tracing::warn!(error = ?e, "Jurisdiction discovery failed"),
        }
    }

    let targets = Targets {
        state: None,
        states: args.states.as_deref(),
        missing: "No jurisdictions in storage; run with --discover or pass --states",
    };

    let summary = run_plan(&config, &plan, args.save_to_db, targets).await;
    emit_summary(&summary, args.output.as_deref(), args.quiet)?;
    Ok(summary)
}
