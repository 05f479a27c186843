use anyhow::{Context, Result};

use lottoharvest::config::Config;
use lottoharvest::crawler::{HttpFetcher, PageFetcher, ResultsUrlBuilder};
use lottoharvest::error::Error;
use lottoharvest::parser::parse_jurisdiction_menu;
use lottoharvest::storage::Database;

/// Read the site's jurisdiction menu and upsert every entry by code
///
/// Returns the number of jurisdictions found.
pub async fn discover(config: &Config) -> Result<usize> {
    let urls = ResultsUrlBuilder::new(&config.crawler.base_url).map_err(Error::from)?;
    let fetcher = HttpFetcher::from_config(&config.crawler).map_err(Error::from)?;

    let home = urls.home();
    let page = fetcher
        .fetch(&home)
        .await
        .map_err(Error::from)
        .with_context(|| format!("Failed to fetch {home}"))?;

    let entries = parse_jurisdiction_menu(&page.body);
    if entries.is_empty() {
        tracing::warn!(url = %home, "No jurisdictions found in site menu");
        return Ok(0);
    }

    let db = Database::connect(&config.database).await.map_err(Error::from)?;
    let mut conn = db.acquire_pooled().await.map_err(Error::from)?;
    let store = conn.store();

    for entry in &entries {
        store
            .save_jurisdiction(&entry.code, &entry.name)
            .await
            .map_err(Error::from)
            .with_context(|| format!("Failed to save jurisdiction {}", entry.code))?;
        tracing::debug!(code = %entry.code, name = %entry.name, "Saved jurisdiction");
    }

    tracing::info!(count = entries.len(), "Jurisdictions discovered");
    Ok(entries.len())
}
