use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::logging::ts_epoch_ms;
use crate::pivot::{DatasetId, PivotTable};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("stored table could not be decoded: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cache connection poisoned")]
    Poisoned,
    #[error("cache task failed: {0}")]
    Task(String),
}

/// Durable store of built tables keyed by `(dataset_id, token)`.
///
/// Bodies are stored as inert JSON; loading goes through
/// [`PivotTable::restore`] so a cached table behaves exactly like a freshly
/// built one.
pub struct TableCache {
    conn: Mutex<Connection>,
}

impl TableCache {
    pub fn open(path: &str) -> Result<Self, CacheError> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, CacheError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, CacheError> {
        conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS pivot_cache (
                dataset_id INTEGER NOT NULL,
                token TEXT NOT NULL,
                body TEXT NOT NULL,
                stored_at INTEGER NOT NULL,
                PRIMARY KEY (dataset_id)
            );
            COMMIT;",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Returns the cached table for `id` only if it was stored under `token`.
    pub fn load(&self, id: DatasetId, token: &str) -> Result<Option<PivotTable>, CacheError> {
        let conn = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM pivot_cache WHERE dataset_id = ?1 AND token = ?2",
                params![id as i64, token],
                |row| row.get(0),
            )
            .optional()?;
        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    pub fn store(&self, token: &str, table: &PivotTable) -> Result<(), CacheError> {
        let body = serde_json::to_string(table)?;
        let conn = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        conn.execute(
            "INSERT OR REPLACE INTO pivot_cache (dataset_id, token, body, stored_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![table.dataset_id() as i64, token, body, ts_epoch_ms() as i64],
        )?;
        Ok(())
    }

    pub fn invalidate(&self, id: DatasetId) -> Result<(), CacheError> {
        let conn = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        conn.execute("DELETE FROM pivot_cache WHERE dataset_id = ?1", params![id as i64])?;
        Ok(())
    }

    pub fn len(&self) -> Result<usize, CacheError> {
        let conn = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM pivot_cache", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

/// Runs one cache operation on the blocking pool so SQLite IO never stalls
/// runtime workers.
pub async fn blocking<T, F>(cache: &Arc<TableCache>, op: F) -> Result<T, CacheError>
where
    F: FnOnce(&TableCache) -> Result<T, CacheError> + Send + 'static,
    T: Send + 'static,
{
    let cache = Arc::clone(cache);
    tokio::task::spawn_blocking(move || op(&cache))
        .await
        .map_err(|e| CacheError::Task(e.to_string()))?
}
