//! Cold tier: durable single-file SQLite store.
//!
//! Rows carry an absolute `expires_at_ms`. Expired rows are deleted lazily
//! when read and in bulk by [`SqliteStore::purge_expired`].

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use super::store::CacheStore;
use crate::clock::Clock;
use crate::error::{Result, SearchError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cache_entries (
    key           TEXT PRIMARY KEY,
    value         BLOB NOT NULL,
    expires_at_ms INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cache_entries_expiry ON cache_entries (expires_at_ms);
";

/// SQLite-backed store.
///
/// Thread-safe via an internal `Mutex<Connection>`; queries run on the
/// blocking pool so they never stall the async runtime.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Cache`] if the file cannot be opened or the
    /// schema cannot be applied.
    pub fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| SearchError::Cache(format!("create {}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path).map_err(sqlite_error)?;
        Self::from_connection(conn, clock)
    }

    /// A private in-memory database, for tests and single-process setups.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Cache`] if the schema cannot be applied.
    pub fn open_in_memory(clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(sqlite_error)?;
        Self::from_connection(conn, clock)
    }

    fn from_connection(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(sqlite_error)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock,
        })
    }

    /// Delete every expired row. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Cache`] if the delete fails.
    pub async fn purge_expired(&self) -> Result<usize> {
        let now = to_sql_millis(self.clock.now_millis());
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM cache_entries WHERE expires_at_ms < ?1",
                params![now],
            )
        })
        .await
    }

    /// Number of physically stored rows, expired or not.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Cache`] if the count fails.
    pub async fn len(&self) -> Result<usize> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| usize::try_from(n).unwrap_or(0))
        })
        .await
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = lock(&conn)?;
            f(&guard).map_err(sqlite_error)
        })
        .await
        .map_err(|e| SearchError::Cache(format!("sqlite task failed: {e}")))?
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|e| SearchError::Cache(format!("sqlite lock poisoned: {e}")))
}

fn sqlite_error(err: rusqlite::Error) -> SearchError {
    SearchError::Cache(format!("sqlite: {err}"))
}

fn to_sql_millis(millis: u64) -> i64 {
    i64::try_from(millis).unwrap_or(i64::MAX)
}

#[async_trait]
impl CacheStore for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let key = key.to_owned();
        let now = to_sql_millis(self.clock.now_millis());
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT value, expires_at_ms FROM cache_entries WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, i64>(1)?)),
                )
                .optional()?;
            match row {
                Some((_, expires_at)) if now > expires_at => {
                    conn.execute(
                        "DELETE FROM cache_entries WHERE key = ?1 AND expires_at_ms = ?2",
                        params![key, expires_at],
                    )?;
                    Ok(None)
                }
                Some((value, _)) => Ok(Some(value)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<()> {
        let key = key.to_owned();
        let expires_at = to_sql_millis(
            self.clock
                .now_millis()
                .saturating_add(ttl_seconds.saturating_mul(1000)),
        );
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO cache_entries (key, value, expires_at_ms) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                expires_at_ms = excluded.expires_at_ms",
                params![key, value, expires_at],
            )
            .map(|_| ())
        })
        .await
    }
}
