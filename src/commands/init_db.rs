use anyhow::{Context, Result};

use lottoharvest::config::Config;
use lottoharvest::error::Error;
use lottoharvest::storage::Database;

/// Create the schema (idempotent) and report what is already stored
pub async fn init_db(config: &Config) -> Result<()> {
    let db = Database::connect(&config.database)
        .await
        .map_err(Error::from)
        .with_context(|| format!("Failed to initialize {}", config.database.url))?;

    let mut conn = db.acquire_pooled().await.map_err(Error::from)?;
    let store = conn.store();
    let jurisdictions = store.list_jurisdictions().await.map_err(Error::from)?.len();
    let results = store.count_results().await.map_err(Error::from)?;

    println!("Database ready: {}", config.database.url);
    println!("  Jurisdictions: {jurisdictions}");
    println!("  Draw results:  {results}");
    Ok(())
}
