pub mod collect;
pub mod discover;
pub mod historical;
pub mod init_db;

// Re-export command functions for convenience
pub use collect::{collect, CollectArgs};
pub use discover::discover;
pub use historical::{historical, HistoricalArgs};
pub use init_db::init_db;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::collections::HashSet;
use std::path::Path;

use lottoharvest::config::Config;
use lottoharvest::crawler::{
    CrawlOrchestrator, CrawlPlan, CrawlSettings, HttpFetcher, JobSummary, ResultsUrlBuilder,
};
use lottoharvest::error::Error;
use lottoharvest::parser::DrawPageExtractor;
use lottoharvest::storage::Database;

/// Orchestrator wired with the production fetcher and extractor
pub type Orchestrator = CrawlOrchestrator<HttpFetcher, DrawPageExtractor>;

/// Connect to storage and build the orchestrator for `config`
pub async fn build_orchestrator(config: &Config, persist: bool) -> Result<(Orchestrator, Database)> {
    let urls = ResultsUrlBuilder::new(&config.crawler.base_url)
        .map_err(Error::from)
        .context("Invalid crawler.base_url")?;
    let fetcher = HttpFetcher::from_config(&config.crawler)
        .map_err(Error::from)
        .context("Failed to create fetcher")?;
    let db = Database::connect(&config.database)
        .await
        .map_err(Error::from)
        .with_context(|| format!("Failed to open database {}", config.database.url))?;

    let orchestrator = CrawlOrchestrator::new(
        fetcher,
        DrawPageExtractor::new(urls.clone()),
        urls,
        db.clone(),
        CrawlSettings::from_config(config, persist),
    );
    Ok((orchestrator, db))
}

/// Jurisdiction codes from `--state`/`--states`, or every stored jurisdiction
pub async fn resolve_state_codes(
    db: &Database,
    state: Option<&str>,
    states: Option<&str>,
) -> Result<Vec<String>> {
    let codes = requested_codes(state, states);

    if !codes.is_empty() {
        return Ok(codes);
    }

    let mut conn = db.acquire_pooled().await.map_err(Error::from)?;
    let stored = conn
        .store()
        .list_jurisdictions()
        .await
        .map_err(Error::from)
        .context("Failed to list jurisdictions")?;
    Ok(stored.into_iter().map(|j| j.code).collect())
}

/// Codes named on the command line, upper-cased, first occurrence kept
fn requested_codes(state: Option<&str>, states: Option<&str>) -> Vec<String> {
    let mut seen = HashSet::new();
    state
        .into_iter()
        .chain(states.into_iter().flat_map(|list| list.split(',')))
        .map(|code| code.trim().to_uppercase())
        .filter(|code| !code.is_empty())
        .filter(|code| seen.insert(code.clone()))
        .collect()
}

/// Which jurisdictions a crawl command targets
#[derive(Debug, Clone, Copy)]
pub struct Targets<'a> {
    pub state: Option<&'a str>,
    pub states: Option<&'a str>,
    /// Message used when neither flags nor storage name a jurisdiction
    pub missing: &'a str,
}

/// Build the orchestrator, resolve targets and run `plan`
///
/// Startup failures end up in a failed summary rather than an error.
pub async fn run_plan(
    config: &Config,
    plan: &CrawlPlan,
    persist: bool,
    targets: Targets<'_>,
) -> JobSummary {
    let job_start = Utc::now();
    match prepare(config, persist, targets).await {
        Ok((orchestrator, codes)) => {
            tracing::info!(states = codes.len(), plan = ?plan, persist, "Starting crawl");
            orchestrator.run_crawl(&codes, plan).await
        }
        Err(e) => {
            let message = format!("{e:#}");
            tracing::error!(error = %message, "Crawl could not start");
            JobSummary::aborted(plan.metadata(job_start), message)
        }
    }
}

async fn prepare(
    config: &Config,
    persist: bool,
    targets: Targets<'_>,
) -> Result<(Orchestrator, Vec<String>)> {
    let (orchestrator, db) = build_orchestrator(config, persist).await?;
    let codes = resolve_state_codes(&db, targets.state, targets.states).await?;
    if codes.is_empty() {
        bail!("{}", targets.missing);
    }
    Ok((orchestrator, codes))
}

/// Print the summary and write it to `output` when given
pub fn emit_summary(summary: &JobSummary, output: Option<&Path>, quiet: bool) -> Result<()> {
    let json = summary.to_json_pretty().map_err(Error::from)?;

    if let Some(path) = output {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, &json)
            .with_context(|| format!("Failed to write summary to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Summary written");
    }

    if !quiet {
        println!("{json}");
    }
    Ok(())
}
