//! SQLite-backed cache store.
//!
//! One row per key. The whole payload is a single JSON column written by one statement,
//! so readers see either the old or the new entry. All database work runs on the blocking
//! pool.

use super::{BatchOutcome, CacheEntry, CacheKey, CacheStore};
use crate::error::CacheError;
use async_trait::async_trait;
use log::{debug, info, warn};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cache_entry (
    subject_id    TEXT    NOT NULL,
    scenario_id   TEXT    NOT NULL,
    model_version INTEGER NOT NULL,
    computed_at   TEXT    NOT NULL,
    entry_json    TEXT    NOT NULL,
    PRIMARY KEY (subject_id, scenario_id, model_version)
);
CREATE INDEX IF NOT EXISTS idx_cache_entry_version ON cache_entry (model_version);
";

#[derive(Clone)]
pub struct SqliteCacheStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCacheStore {
    /// Open (or create) the cache database at `path` and apply the schema
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        info!("Opened result cache at {}", path.as_ref().display());
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self, CacheError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, CacheError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, CacheError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| CacheError::Worker("connection mutex poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| CacheError::Worker(e.to_string()))?
    }
}

fn upsert_one(conn: &Connection, entry: &CacheEntry) -> Result<(), CacheError> {
    let json = serde_json::to_string(entry)?;
    conn.execute(
        "INSERT INTO cache_entry (subject_id, scenario_id, model_version, computed_at, entry_json)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (subject_id, scenario_id, model_version)
         DO UPDATE SET computed_at = excluded.computed_at, entry_json = excluded.entry_json",
        params![
            entry.key.subject_id,
            entry.key.scenario_id,
            entry.key.model_version,
            entry.computed_at.to_rfc3339(),
            json,
        ],
    )?;
    Ok(())
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let key = key.clone();
        self.with_conn(move |conn| {
            let json: Option<String> = conn
                .query_row(
                    "SELECT entry_json FROM cache_entry
                     WHERE subject_id = ?1 AND scenario_id = ?2 AND model_version = ?3",
                    params![key.subject_id, key.scenario_id, key.model_version],
                    |row| row.get(0),
                )
                .optional()?;
            match json {
                Some(json) => Ok(Some(serde_json::from_str(&json)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn upsert_batch(&self, entries: Vec<CacheEntry>) -> BatchOutcome {
        let keys: Vec<CacheKey> = entries.iter().map(|e| e.key.clone()).collect();
        let result = self
            .with_conn(move |conn| {
                let mut outcome = BatchOutcome::default();
                for entry in &entries {
                    match upsert_one(conn, entry) {
                        Ok(()) => outcome.succeeded.push(entry.key.clone()),
                        Err(e) => {
                            warn!("Cache write {} failed: {}", entry.key, e);
                            outcome.fail(entry.key.clone(), e.to_string());
                        }
                    }
                }
                Ok(outcome)
            })
            .await;

        match result {
            Ok(outcome) => {
                debug!("SQLite batch: {} rows written", outcome.succeeded.len());
                outcome
            }
            // Worker failure: nothing is known to have committed
            Err(e) => {
                let mut outcome = BatchOutcome::default();
                for key in keys {
                    outcome.fail(key, e.to_string());
                }
                outcome
            }
        }
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let key = key.clone();
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM cache_entry
                 WHERE subject_id = ?1 AND scenario_id = ?2 AND model_version = ?3",
                params![key.subject_id, key.scenario_id, key.model_version],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn purge_versions_below(&self, model_version: u32) -> Result<usize, CacheError> {
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM cache_entry WHERE model_version < ?1",
                params![model_version],
            )?;
            Ok(removed)
        })
        .await
    }

    async fn len(&self) -> Result<usize, CacheError> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM cache_entry", [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }
}
