use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use std::path::PathBuf;

use lottoharvest::config::Config;
use lottoharvest::crawler::{CrawlPlan, JobSummary};
use lottoharvest::parser::draws::today;

use super::{emit_summary, run_plan, Targets};

/// Flags of the `collect` subcommand
#[derive(Debug, Clone, Default)]
pub struct CollectArgs {
    pub state: Option<String>,
    pub states: Option<String>,
    pub date: Option<String>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub week: bool,
    pub days_back: Option<u32>,
    pub save_to_db: bool,
    pub output: Option<PathBuf>,
    pub quiet: bool,
}

impl CollectArgs {
    /// Target date from `--date` or `--year/--month/--day`
    fn target_date(&self) -> Result<Option<NaiveDate>> {
        if let Some(raw) = &self.date {
            let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .with_context(|| format!("Invalid --date '{raw}', expected YYYY-MM-DD"))?;
            return Ok(Some(date));
        }

        match (self.year, self.month, self.day) {
            (Some(y), Some(m), Some(d)) => NaiveDate::from_ymd_opt(y, m, d)
                .map(Some)
                .with_context(|| format!("Invalid date {y}-{m}-{d}")),
            (None, None, None) => Ok(None),
            _ => bail!("--year, --month and --day must be given together"),
        }
    }

    /// Latest mode unless a date or a window was requested
    pub fn plan(&self, config: &Config) -> Result<CrawlPlan> {
        let target = self.target_date()?;

        if self.week || self.days_back.is_some() {
            let days = self.days_back.unwrap_or(config.collection.days_back);
            return Ok(CrawlPlan::window(target.unwrap_or_else(today), days, self.week));
        }

        Ok(match target {
            Some(date) => CrawlPlan::single(date),
            None => CrawlPlan::Latest,
        })
    }
}

/// Collect latest, single-date or windowed results
pub async fn collect(config: Config, args: CollectArgs) -> Result<JobSummary> {
    let plan = args.plan(&config)?;
    let targets = Targets {
        state: args.state.as_deref(),
        states: args.states.as_deref(),
        missing: "No jurisdictions to collect; run `discover` first or pass --state",
    };

    let summary = run_plan(&config, &plan, args.save_to_db, targets).await;
    emit_summary(&summary, args.output.as_deref(), args.quiet)?;
    Ok(summary)
}
