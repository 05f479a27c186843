//! Crawl orchestrator
//!
//! Walks jurisdictions in fixed-size chunks and, per jurisdiction, walks dates
//! according to a [`CrawlPlan`]. Every unit (one jurisdiction and one date, or
//! the latest page) is fetched, extracted, logged as an attempt and buffered
//! for the upsert engine. The whole run holds one batch-scoped connection.
//!
//! Nothing escapes [`CrawlOrchestrator::run_crawl`]: every failure ends up in
//! the returned [`JobSummary`].

use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use tracing::{debug, error, info, warn};

use super::summary::{DateResult, JobMetadata, JobSummary, StateResult};
use super::url::ResultsUrlBuilder;
use super::PageFetcher;
use crate::config::Config;
use crate::models::{AttemptStatus, Jurisdiction, RawDrawRecord};
use crate::parser::{Extractor, PageDate};
use crate::storage::{AttemptLog, BatchSession, Database, UpsertEngine, UpsertReport};
use crate::utils::error::{CrawlError, FetchError};
use crate::utils::retry::{with_retry_if, RetryConfig};

/// Which dates a run visits for every jurisdiction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlPlan {
    /// Walk backwards from `start` until the adaptive termination rules stop
    Historical {
        start: NaiveDate,
        max_days_back: u32,
        max_consecutive_empty_days: u32,
    },
    /// Visit every date of an explicit window, newest first
    Window {
        dates: Vec<NaiveDate>,
        days_back: Option<u32>,
        week_collection: bool,
    },
    /// One unit per jurisdiction against its latest page
    Latest,
}

impl CrawlPlan {
    /// Window of `days` dates ending at `end`
    pub fn window(end: NaiveDate, days: u32, week_collection: bool) -> Self {
        let dates = (0..days.max(1))
            .filter_map(|offset| end.checked_sub_days(chrono::Days::new(u64::from(offset))))
            .collect();
        Self::Window {
            dates,
            days_back: Some(days.max(1)),
            week_collection,
        }
    }

    /// A single explicit date
    pub fn single(date: NaiveDate) -> Self {
        Self::Window {
            dates: vec![date],
            days_back: None,
            week_collection: false,
        }
    }

    fn mode(&self) -> &'static str {
        match self {
            Self::Historical { .. } => "historical",
            Self::Window { .. } => "window",
            Self::Latest => "latest",
        }
    }

    /// Timing and mode block for a run that started at `job_start`
    pub fn metadata(&self, job_start: chrono::DateTime<Utc>) -> JobMetadata {
        let job_end = Utc::now();
        let (days_back, week_collection) = match self {
            Self::Historical { max_days_back, .. } => (Some(*max_days_back), None),
            Self::Window {
                days_back,
                week_collection,
                ..
            } => (*days_back, week_collection.then_some(true)),
            Self::Latest => (None, None),
        };

        JobMetadata {
            job_start,
            job_end,
            duration_seconds: (job_end - job_start).num_milliseconds() as f64 / 1000.0,
            mode: self.mode().to_string(),
            days_back,
            week_collection,
        }
    }
}

/// Run-wide knobs taken from [`Config`] and CLI flags
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    /// Attempt budget for transport and unclassified fetch failures
    pub retry: RetryConfig,
    /// Jurisdictions per chunk
    pub batch_size: usize,
    /// Flush to storage once this many records are pending
    pub max_buffered_records: usize,
    pub pause_between_days: Duration,
    pub pause_between_states: Duration,
    /// Write results and attempts
    pub persist: bool,
}

impl CrawlSettings {
    pub fn from_config(config: &Config, persist: bool) -> Self {
        Self {
            retry: RetryConfig::with_delays(
                config.crawler.max_retries,
                config.crawler.retry_base_delay_ms,
                config.crawler.retry_base_delay_ms.saturating_mul(8),
            ),
            batch_size: config.collection.batch_size,
            max_buffered_records: config.collection.max_buffered_records,
            pause_between_days: Duration::from_millis(config.collection.pause_between_days_ms),
            pause_between_states: Duration::from_millis(config.collection.pause_between_states_ms),
            persist,
        }
    }
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self::from_config(&Config::default(), true)
    }
}

/// State carried across jurisdictions within one run
#[derive(Default)]
struct RunState {
    pending: Vec<RawDrawRecord>,
    persistence: UpsertReport,
}

/// Per-jurisdiction tallies
#[derive(Default)]
struct StateTally {
    games: usize,
    days: u32,
    completed_units: u32,
    dates: Vec<DateResult>,
    last_error: Option<String>,
    note: Option<String>,
}

impl StateTally {
    /// Record one dated unit
    fn record(&mut self, date: NaiveDate, outcome: &Result<usize, CrawlError>) {
        self.days += 1;
        match outcome {
            Ok(count) => {
                self.games += count;
                self.completed_units += 1;
                self.dates.push(DateResult {
                    date,
                    games_collected: *count,
                    success: true,
                    message: None,
                });
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
                self.dates.push(DateResult {
                    date,
                    games_collected: 0,
                    success: false,
                    message: Some(e.to_string()),
                });
            }
        }
    }

    fn into_result(self, code: &str, with_dates: bool) -> StateResult {
        let success = self.completed_units > 0;
        let message = if success { self.note } else { self.last_error.or(self.note) };
        StateResult {
            state_code: code.to_string(),
            success,
            games_collected: self.games,
            days_processed: self.days,
            date_results: with_dates.then_some(self.dates),
            message,
        }
    }
}

/// Drives a crawl run
pub struct CrawlOrchestrator<F, X> {
    fetcher: F,
    extractor: X,
    urls: ResultsUrlBuilder,
    db: Database,
    settings: CrawlSettings,
    upsert: UpsertEngine,
    attempts: AttemptLog,
}

impl<F: PageFetcher, X: Extractor> CrawlOrchestrator<F, X> {
    pub fn new(
        fetcher: F,
        extractor: X,
        urls: ResultsUrlBuilder,
        db: Database,
        settings: CrawlSettings,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            urls,
            db,
            settings,
            upsert: UpsertEngine::new(),
            attempts: AttemptLog::new(),
        }
    }

    /// Crawl every jurisdiction in `codes` according to `plan`
    pub async fn run_crawl(&self, codes: &[String], plan: &CrawlPlan) -> JobSummary {
        let job_start = Utc::now();
        let started = Instant::now();
        info!(
            states = codes.len(),
            mode = plan.mode(),
            persist = self.settings.persist,
            "Starting crawl run"
        );

        let session = match self.db.begin_batch().await {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "Could not open batch connection");
                let results = codes
                    .iter()
                    .map(|code| StateResult::failed(&code.trim().to_uppercase(), e.to_string()))
                    .collect();
                return JobSummary::from_results(results, None, plan.metadata(job_start));
            }
        };

        let mut run = RunState::default();
        let mut results = Vec::with_capacity(codes.len());

        for (index, chunk) in codes.chunks(self.settings.batch_size.max(1)).enumerate() {
            info!(chunk = index + 1, states = chunk.len(), "Processing chunk");

            for code in chunk {
                if !results.is_empty() {
                    pause(self.settings.pause_between_states).await;
                }
                let result = self.crawl_state(&session, code, plan, &mut run).await;
                if result.success {
                    info!(
                        state = %result.state_code,
                        games = result.games_collected,
                        days = result.days_processed,
                        "Jurisdiction finished"
                    );
                } else {
                    warn!(
                        state = %result.state_code,
                        message = result.message.as_deref().unwrap_or(""),
                        "Jurisdiction failed"
                    );
                }
                results.push(result);
            }

            self.flush(&session, &mut run).await;
        }

        self.db.end_batch(session);

        let persistence = self.settings.persist.then_some(run.persistence);
        let summary = JobSummary::from_results(results, persistence, plan.metadata(job_start));
        info!(
            success = summary.success,
            games = summary.games_collected,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Crawl run finished"
        );
        summary
    }

    async fn crawl_state(
        &self,
        session: &BatchSession,
        code: &str,
        plan: &CrawlPlan,
        run: &mut RunState,
    ) -> StateResult {
        let code = code.trim().to_uppercase();

        let lookup = {
            let mut conn = session.connection().await;
            conn.store().find_jurisdiction(&code).await
        };
        let jurisdiction = match lookup {
            Ok(Some(jurisdiction)) => jurisdiction,
            Ok(None) => {
                let err = CrawlError::UnknownJurisdiction(code.clone());
                error!(state = %code, kind = ?err.kind(), "Jurisdiction not in storage");
                return StateResult::failed(&code, err.to_string());
            }
            Err(e) => {
                error!(state = %code, error = %e, "Jurisdiction lookup failed");
                return StateResult::failed(&code, CrawlError::from(e).to_string());
            }
        };

        let mut tally = StateTally::default();
        match plan {
            CrawlPlan::Historical {
                start,
                max_days_back,
                max_consecutive_empty_days,
            } => {
                self.walk_history(
                    session,
                    &jurisdiction,
                    *start,
                    *max_days_back,
                    *max_consecutive_empty_days,
                    run,
                    &mut tally,
                )
                .await;
            }
            CrawlPlan::Window { dates, .. } => {
                for (i, date) in dates.iter().enumerate() {
                    if i > 0 {
                        pause(self.settings.pause_between_days).await;
                    }
                    let outcome = self
                        .crawl_unit(session, &jurisdiction, PageDate::Exact(*date), run)
                        .await;
                    tally.record(*date, &outcome);
                    if matches!(&outcome, Err(e) if e.kind().is_fatal()) {
                        break;
                    }
                }
            }
            CrawlPlan::Latest => {
                let page = PageDate::Latest {
                    fallback: crate::parser::draws::today(),
                };
                let outcome = self.crawl_unit(session, &jurisdiction, page, run).await;
                tally.days = 1;
                match outcome {
                    Ok(count) => {
                        tally.games = count;
                        tally.completed_units = 1;
                    }
                    Err(e) => tally.last_error = Some(e.to_string()),
                }
            }
        }

        tally.into_result(&jurisdiction.code, !matches!(plan, CrawlPlan::Latest))
    }

    /// Historical walk with adaptive termination
    #[allow(clippy::too_many_arguments)]
    async fn walk_history(
        &self,
        session: &BatchSession,
        jurisdiction: &Jurisdiction,
        start: NaiveDate,
        max_days_back: u32,
        max_consecutive_empty_days: u32,
        run: &mut RunState,
        tally: &mut StateTally,
    ) {
        let mut current = start;
        let mut consecutive_empty = 0u32;

        while tally.days < max_days_back && consecutive_empty < max_consecutive_empty_days {
            if tally.days > 0 {
                pause(self.settings.pause_between_days).await;
            }

            let outcome = self
                .crawl_unit(session, jurisdiction, PageDate::Exact(current), run)
                .await;
            let first_date = tally.days == 0;
            tally.record(current, &outcome);

            match outcome {
                Ok(0) => {
                    consecutive_empty += 1;
                    if first_date {
                        info!(
                            state = %jurisdiction.code,
                            date = %current,
                            "No draws on the first date, treating jurisdiction as inactive"
                        );
                        tally.note = Some(format!("No draws found on {current}; stopped"));
                        break;
                    }
                }
                Ok(_) => consecutive_empty = 0,
                Err(e) if e.kind().is_fatal() => {
                    error!(state = %jurisdiction.code, date = %current, error = %e, "Stopping jurisdiction");
                    break;
                }
                Err(e) => {
                    warn!(
                        state = %jurisdiction.code,
                        date = %current,
                        kind = ?e.kind(),
                        error = %e,
                        "Skipping date"
                    );
                    consecutive_empty += 1;
                }
            }

            match current.pred_opt() {
                Some(previous) => current = previous,
                None => break,
            }
        }

        debug!(
            state = %jurisdiction.code,
            days = tally.days,
            consecutive_empty,
            "Historical walk ended"
        );
    }

    /// Fetch, extract, log and buffer one unit; returns the record count
    async fn crawl_unit(
        &self,
        session: &BatchSession,
        jurisdiction: &Jurisdiction,
        page: PageDate,
        run: &mut RunState,
    ) -> Result<usize, CrawlError> {
        let url = match page {
            PageDate::Exact(date) => self.urls.for_date(&jurisdiction.code, date),
            PageDate::Latest { .. } => self.urls.latest(&jurisdiction.code),
        };

        let attempt = if self.settings.persist {
            let mut conn = session.connection().await;
            let store = conn.store();
            let attempt = self.attempts.start(store, &jurisdiction.code, &url).await?;
            if let Err(e) = self.attempts.processing(store, &attempt).await {
                warn!(attempt = attempt.id(), error = %e, "Could not mark attempt as processing");
            }
            Some(attempt)
        } else {
            None
        };

        let outcome = match self.fetch_and_extract(&url, jurisdiction, page).await {
            Err(CrawlError::NoData) => {
                debug!(state = %jurisdiction.code, url = %url, "No draw sections on page");
                Ok(Vec::new())
            }
            other => other,
        };

        if let Some(attempt) = attempt {
            let (status, count, message) = match &outcome {
                Ok(records) => (AttemptStatus::Completed, records.len(), None),
                Err(e) => (AttemptStatus::Failed, 0, Some(e.to_string())),
            };
            let mut conn = session.connection().await;
            if let Err(e) = self
                .attempts
                .finish(conn.store(), attempt, status, count as u32, message.as_deref())
                .await
            {
                warn!(url = %url, error = %e, "Could not finalize attempt");
            }
        }

        let records = outcome?;
        let count = records.len();
        debug!(state = %jurisdiction.code, url = %url, records = count, "Unit done");

        if self.settings.persist && count > 0 {
            run.pending.extend(records);
            if run.pending.len() >= self.settings.max_buffered_records.max(1) {
                self.flush(session, run).await;
            }
        }

        Ok(count)
    }

    async fn fetch_and_extract(
        &self,
        url: &str,
        jurisdiction: &Jurisdiction,
        page: PageDate,
    ) -> Result<Vec<RawDrawRecord>, CrawlError> {
        let fetcher = &self.fetcher;
        let attempted = with_retry_if(
            &self.settings.retry,
            move || fetcher.fetch(url),
            |e: &FetchError| e.kind().is_retryable(),
        )
        .await;

        let page_body = match attempted.result {
            Ok(fetched) => fetched.body,
            Err(e) => {
                debug!(url = %url, attempts = attempted.attempts, kind = ?e.kind(), "Fetch failed");
                return Err(CrawlError::Fetch(e));
            }
        };

        let records = self.extractor.extract(&page_body, jurisdiction, page);
        if records.is_empty() {
            return Err(CrawlError::NoData);
        }
        Ok(records)
    }

    /// Hand buffered records to the upsert engine
    async fn flush(&self, session: &BatchSession, run: &mut RunState) {
        if run.pending.is_empty() {
            return;
        }

        let records = std::mem::take(&mut run.pending);
        let mut conn = session.connection().await;
        match self.upsert.upsert_batch(conn.store(), &records).await {
            Ok(report) => run.persistence.merge(&report),
            Err(e) => {
                error!(records = records.len(), error = %e, "Upsert batch failed");
                run.persistence.errors += records.len();
            }
        }
    }
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_window_plan_counts_back() {
        let plan = CrawlPlan::window(date("2025-03-02"), 3, false);
        match plan {
            CrawlPlan::Window { dates, days_back, .. } => {
                assert_eq!(dates, vec![date("2025-03-02"), date("2025-03-01"), date("2025-02-28")]);
                assert_eq!(days_back, Some(3));
            }
            other => panic!("unexpected plan {other:?}"),
        }
    }

    #[test]
    fn test_plan_metadata() {
        let start = Utc::now();
        let meta = CrawlPlan::window(date("2025-03-02"), 7, true).metadata(start);
        assert_eq!(meta.mode, "window");
        assert_eq!(meta.days_back, Some(7));
        assert_eq!(meta.week_collection, Some(true));

        let meta = CrawlPlan::Latest.metadata(start);
        assert_eq!(meta.mode, "latest");
        assert!(meta.days_back.is_none());
        assert!(meta.duration_seconds >= 0.0);
    }

    #[test]
    fn test_tally_success_needs_a_completed_unit() {
        let mut tally = StateTally::default();
        tally.record(
            date("2025-05-13"),
            &Err(CrawlError::Fetch(FetchError::ServerError(503))),
        );
        let result = tally.into_result("NY", true);
        assert!(!result.success);
        assert_eq!(result.message.as_deref(), Some("Fetch error: Server error: 503"));

        let mut tally = StateTally::default();
        tally.record(date("2025-05-13"), &Ok(0));
        let result = tally.into_result("NY", true);
        assert!(result.success);
        assert_eq!(result.date_results.unwrap().len(), 1);
    }
}
