//! Storage layer
//!
//! [`Database`] owns the connection pool for the configured backend. Short
//! reads borrow a [`PooledConnection`] that returns to the pool when dropped.
//! A crawl run brackets its work with [`Database::begin_batch`], which hands
//! out a [`BatchSession`] holding one connection for the whole run. Nested
//! `begin_batch` calls share the open session; the connection goes back to
//! the pool when the last session handle is ended or dropped.

pub mod attempts;
pub mod postgres;
pub mod repository;
pub mod schema;
pub mod sqlite;
pub mod upsert;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use deadpool::managed;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tracing::{debug, info};

pub use attempts::{Attempt, AttemptLog};
pub use repository::DrawStore;
pub use sqlite::{SqliteManager, SqliteTarget};
pub use upsert::{UpsertEngine, UpsertReport};

use crate::config::DatabaseConfig;
use crate::utils::error::StoreError;

type SqlitePool = managed::Pool<SqliteManager>;

/// Backend selected from the database URL
#[derive(Clone)]
enum Backend {
    Sqlite {
        pool: SqlitePool,
        /// Keeps a shared in-memory database alive while the pool is idle
        _keepalive: Option<Arc<Mutex<rusqlite::Connection>>>,
    },
    Postgres(deadpool_postgres::Pool),
}

/// A connection checked out of the pool
pub enum PooledConnection {
    Sqlite(managed::Object<SqliteManager>),
    Postgres(deadpool_postgres::Object),
}

impl PooledConnection {
    /// The storage boundary on this connection
    pub fn store(&mut self) -> &mut dyn DrawStore {
        match self {
            Self::Sqlite(conn) => &mut **conn,
            Self::Postgres(client) => {
                let client: &mut tokio_postgres::Client = client;
                client
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "sqlite",
            Self::Postgres(_) => "postgres",
        }
    }
}

/// Shared state of an open batch
struct BatchInner {
    id: u64,
    conn: AsyncMutex<PooledConnection>,
    opened_at: Instant,
}

impl Drop for BatchInner {
    fn drop(&mut self) {
        info!(
            batch = self.id,
            held_ms = self.opened_at.elapsed().as_millis() as u64,
            "Released batch connection"
        );
    }
}

/// Handle on the batch-scoped connection
///
/// Each handle counts as one open `begin_batch`. Ending (or dropping) the
/// last handle returns the connection to the pool.
pub struct BatchSession {
    inner: Arc<BatchInner>,
}

impl BatchSession {
    /// Lock the shared connection for a sequence of store calls
    pub async fn connection(&self) -> MutexGuard<'_, PooledConnection> {
        self.inner.conn.lock().await
    }

    /// Identifier of the underlying batch, shared by nested sessions
    pub fn batch_id(&self) -> u64 {
        self.inner.id
    }

    /// Number of open handles on this batch
    pub fn depth(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Close this handle
    pub fn end(self) {
        debug!(batch = self.inner.id, depth = self.depth() - 1, "Ending batch session");
    }
}

/// Connection pool plus the batch-scoped connection slot
#[derive(Clone)]
pub struct Database {
    backend: Backend,
    batch: Arc<Mutex<Weak<BatchInner>>>,
    next_batch_id: Arc<AtomicU64>,
}

impl Database {
    /// Open the backend named by `config.url` and ensure the schema exists
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let url = config.url.trim();
        let wait = Duration::from_secs(config.wait_timeout_secs);

        let backend = if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Backend::Postgres(postgres::create_pool(url, config.pool_size, wait)?)
        } else if url == "sqlite::memory:" {
            Self::sqlite_backend(SqliteTarget::unique_memory(), config.pool_size, wait)?
        } else if let Some(path) = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
        {
            let path = PathBuf::from(path);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::InvalidConfig(format!(
                        "cannot create directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
            Self::sqlite_backend(SqliteTarget::File(path), config.pool_size, wait)?
        } else {
            return Err(StoreError::InvalidConfig(format!(
                "unsupported database URL: {url}"
            )));
        };

        let db = Self {
            backend,
            batch: Arc::new(Mutex::new(Weak::new())),
            next_batch_id: Arc::new(AtomicU64::new(1)),
        };

        let mut conn = db.acquire_pooled().await?;
        conn.store().init_schema().await?;
        info!(backend = conn.backend_name(), "Database ready");

        Ok(db)
    }

    /// A private in-memory SQLite database
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::connect(&DatabaseConfig {
            url: String::from("sqlite::memory:"),
            ..DatabaseConfig::default()
        })
        .await
    }

    fn sqlite_backend(
        target: SqliteTarget,
        pool_size: usize,
        wait: Duration,
    ) -> Result<Backend, StoreError> {
        let keepalive = match &target {
            SqliteTarget::Memory(_) => Some(Arc::new(Mutex::new(target.open()?))),
            SqliteTarget::File(_) => None,
        };

        let pool = managed::Pool::builder(SqliteManager::new(target))
            .max_size(pool_size)
            .wait_timeout(Some(wait))
            .runtime(deadpool::Runtime::Tokio1)
            .build()
            .map_err(|e| StoreError::Pool(e.to_string()))?;

        Ok(Backend::Sqlite {
            pool,
            _keepalive: keepalive,
        })
    }

    /// Borrow a short-lived connection; it returns to the pool on drop
    pub async fn acquire_pooled(&self) -> Result<PooledConnection, StoreError> {
        match &self.backend {
            Backend::Sqlite { pool, .. } => pool
                .get()
                .await
                .map(PooledConnection::Sqlite)
                .map_err(|e| StoreError::Pool(e.to_string())),
            Backend::Postgres(pool) => pool
                .get()
                .await
                .map(PooledConnection::Postgres)
                .map_err(|e| StoreError::Pool(e.to_string())),
        }
    }

    /// Open (or join) the batch-scoped connection
    pub async fn begin_batch(&self) -> Result<BatchSession, StoreError> {
        if let Some(session) = self.join_open_batch() {
            return Ok(session);
        }

        let conn = self.acquire_pooled().await?;

        let mut slot = self.batch.lock().map_err(|_| StoreError::Pool("batch slot poisoned".into()))?;
        if let Some(inner) = slot.upgrade() {
            // Another caller opened the batch while we were waiting on the pool
            drop(conn);
            return Ok(BatchSession { inner });
        }

        let inner = Arc::new(BatchInner {
            id: self.next_batch_id.fetch_add(1, Ordering::Relaxed),
            conn: AsyncMutex::new(conn),
            opened_at: Instant::now(),
        });
        *slot = Arc::downgrade(&inner);
        info!(batch = inner.id, "Opened batch connection");

        Ok(BatchSession { inner })
    }

    /// Close one `begin_batch`; only the outermost close releases the connection
    pub fn end_batch(&self, session: BatchSession) {
        session.end();
    }

    /// Number of open handles on the current batch (0 when none is open)
    pub fn batch_depth(&self) -> usize {
        self.batch
            .lock()
            .map(|slot| slot.strong_count())
            .unwrap_or(0)
    }

    fn join_open_batch(&self) -> Option<BatchSession> {
        let slot = self.batch.lock().ok()?;
        let inner = slot.upgrade()?;
        debug!(batch = inner.id, depth = Arc::strong_count(&inner), "Joined open batch");
        Some(BatchSession { inner })
    }
}
