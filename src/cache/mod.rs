//! Versioned result cache.
//!
//! Entries are keyed by subject (portfolio or ticker), scenario and model version. Only
//! entries of the current model version are served. Stores replace each entry whole, so a
//! reader never sees a half-written payload.

pub mod memory;
pub mod refresh;
pub mod sqlite;

pub use memory::MemoryCacheStore;
pub use refresh::{FailedTask, RefreshJob, RefreshSummary, RefreshTask};
pub use sqlite::SqliteCacheStore;

use crate::engine::{PortfolioProjection, ScenarioEvaluation};
use crate::error::{CacheError, EngineResult};
use crate::simulation::SimulationResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub subject_id: String,
    pub scenario_id: String,
    pub model_version: u32,
}

impl CacheKey {
    pub fn new(subject_id: &str, scenario_id: &str, model_version: u32) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            scenario_id: scenario_id.to_string(),
            model_version,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/v{}",
            self.subject_id, self.scenario_id, self.model_version
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "result", rename_all = "snake_case")]
pub enum CachedResult {
    Simulation(SimulationResult),
    Projection(Box<PortfolioProjection>),
    Evaluation(Box<ScenarioEvaluation>),
}

impl CachedResult {
    pub fn as_simulation(&self) -> Option<&SimulationResult> {
        match self {
            CachedResult::Simulation(result) => Some(result),
            _ => None,
        }
    }

    pub fn into_projection(self) -> Option<PortfolioProjection> {
        match self {
            CachedResult::Projection(projection) => Some(*projection),
            _ => None,
        }
    }

    pub fn into_evaluation(self) -> Option<ScenarioEvaluation> {
        match self {
            CachedResult::Evaluation(evaluation) => Some(*evaluation),
            _ => None,
        }
    }
}

/// What a cached result was computed from. A fresh entry is served only to callers whose
/// snapshot matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSnapshot {
    /// Normalized weight per ticker
    pub weights: BTreeMap<String, f64>,
    /// Digest of the remaining inputs: estimates, supplied volatilities, classes, policy
    #[serde(default)]
    pub fingerprint: String,
}

impl InputSnapshot {
    pub fn new(weights: BTreeMap<String, f64>, fingerprint: impl Into<String>) -> Self {
        Self {
            weights,
            fingerprint: fingerprint.into(),
        }
    }
}

impl From<BTreeMap<String, f64>> for InputSnapshot {
    fn from(weights: BTreeMap<String, f64>) -> Self {
        Self::new(weights, String::new())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub payload: CachedResult,
    pub computed_at: DateTime<Utc>,
    #[serde(default)]
    pub inputs: InputSnapshot,
}

impl CacheEntry {
    pub fn new(key: CacheKey, payload: CachedResult, inputs: impl Into<InputSnapshot>) -> Self {
        Self {
            key,
            payload,
            computed_at: Utc::now(),
            inputs: inputs.into(),
        }
    }

    pub fn version(&self) -> u32 {
        self.key.model_version
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedWrite {
    pub key: CacheKey,
    pub reason: String,
}

/// Per-key result of a batch write. Failures are reported here, never raised.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub succeeded: Vec<CacheKey>,
    pub failed: Vec<FailedWrite>,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn fail(&mut self, key: CacheKey, reason: impl Into<String>) {
        self.failed.push(FailedWrite {
            key,
            reason: reason.into(),
        });
    }

    pub fn merge(&mut self, other: BatchOutcome) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
    }
}

/// Durable storage for cache entries
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;

    /// Insert or replace every entry. Each entry is written atomically; one failing key
    /// does not prevent the others from committing.
    async fn upsert_batch(&self, entries: Vec<CacheEntry>) -> BatchOutcome;

    async fn delete(&self, key: &CacheKey) -> Result<bool, CacheError>;

    async fn purge_versions_below(&self, model_version: u32) -> Result<usize, CacheError>;

    async fn len(&self) -> Result<usize, CacheError>;
}

type KeyLocks = Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>;

/// Front end over a `CacheStore` that knows the current model version
pub struct ResultCache<S: CacheStore> {
    store: Arc<S>,
    model_version: u32,
    key_locks: KeyLocks,
}

impl<S: CacheStore> ResultCache<S> {
    pub fn new(store: Arc<S>, model_version: u32) -> Self {
        info!("Result cache serving model version v{}", model_version);
        Self {
            store,
            model_version,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn model_version(&self) -> u32 {
        self.model_version
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn key(&self, subject_id: &str, scenario_id: &str) -> CacheKey {
        CacheKey::new(subject_id, scenario_id, self.model_version)
    }

    pub fn is_fresh(&self, entry: &CacheEntry) -> bool {
        entry.version() == self.model_version
    }

    /// Current-version entry, if any
    pub async fn get(
        &self,
        subject_id: &str,
        scenario_id: &str,
    ) -> Result<Option<CacheEntry>, CacheError> {
        let key = self.key(subject_id, scenario_id);
        let entry = self.store.get(&key).await?;
        Ok(entry.filter(|e| self.is_fresh(e)))
    }

    /// Write entries, rejecting any computed under another model version
    pub async fn upsert_batch(&self, entries: Vec<CacheEntry>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let mut current = Vec::with_capacity(entries.len());

        for entry in entries {
            if self.is_fresh(&entry) {
                current.push(entry);
            } else {
                warn!(
                    "Rejecting stale cache write {} (current model v{})",
                    entry.key, self.model_version
                );
                let reason = format!(
                    "stale model version v{}, current is v{}",
                    entry.version(),
                    self.model_version
                );
                outcome.fail(entry.key, reason);
            }
        }

        if !current.is_empty() {
            outcome.merge(self.store.upsert_batch(current).await);
        }

        debug!(
            "Cache batch write: {} succeeded, {} failed",
            outcome.succeeded.len(),
            outcome.failed.len()
        );
        outcome
    }

    async fn lock_key(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn release_key(&self, key: &CacheKey, lock: Arc<Mutex<()>>) {
        let mut locks = self.key_locks.lock().await;
        // map + ours: nobody else is waiting
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(key);
        }
    }

    /// Serve a fresh entry or run `compute` and store its result.
    ///
    /// An entry computed from different inputs is recomputed. Concurrent callers for the same
    /// key wait on one another, so `compute` runs at most once while an entry is being
    /// produced. A failed write is logged and the computed result is still returned.
    pub async fn get_or_compute<F, Fut>(
        &self,
        subject_id: &str,
        scenario_id: &str,
        inputs: impl Into<InputSnapshot>,
        compute: F,
    ) -> EngineResult<CachedLookup>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = EngineResult<CachedResult>>,
    {
        self.get_or_compute_since(subject_id, scenario_id, inputs, None, compute)
            .await
    }

    /// `get_or_compute` that also treats entries computed up to `not_before` as missing.
    ///
    /// Forced refreshes pass their start time, so overlapping refreshes of one key still
    /// share a single computation.
    pub async fn get_or_compute_since<F, Fut>(
        &self,
        subject_id: &str,
        scenario_id: &str,
        inputs: impl Into<InputSnapshot>,
        not_before: Option<DateTime<Utc>>,
        compute: F,
    ) -> EngineResult<CachedLookup>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = EngineResult<CachedResult>>,
    {
        let key = self.key(subject_id, scenario_id);
        let lock = self.lock_key(&key).await;

        let result = {
            let _guard = lock.lock().await;
            self.lookup_or_compute(&key, inputs.into(), not_before, compute)
                .await
        };

        self.release_key(&key, lock).await;
        result
    }

    async fn lookup_or_compute<F, Fut>(
        &self,
        key: &CacheKey,
        inputs: InputSnapshot,
        not_before: Option<DateTime<Utc>>,
        compute: F,
    ) -> EngineResult<CachedLookup>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = EngineResult<CachedResult>>,
    {
        match self.store.get(key).await {
            Ok(Some(entry)) if self.is_fresh(&entry) => {
                if entry.inputs != inputs {
                    info!("Inputs changed since {} was cached, recomputing", key);
                } else if not_before.is_some_and(|t| entry.computed_at <= t) {
                    debug!("Entry {} predates the refresh, recomputing", key);
                } else {
                    debug!("Cache hit {}", key);
                    return Ok(CachedLookup {
                        entry,
                        computed: false,
                        write: BatchOutcome::default(),
                    });
                }
            }
            Ok(_) => debug!("Cache miss {}", key),
            Err(e) => warn!("Cache read for {} failed, recomputing: {}", key, e),
        }

        let payload = compute().await?;
        let entry = CacheEntry::new(key.clone(), payload, inputs);

        let write = self.store.upsert_batch(vec![entry.clone()]).await;
        for failure in &write.failed {
            warn!("Cache write {} failed: {}", failure.key, failure.reason);
        }

        Ok(CachedLookup {
            entry,
            computed: true,
            write,
        })
    }

    pub async fn invalidate(
        &self,
        subject_id: &str,
        scenario_id: &str,
    ) -> Result<bool, CacheError> {
        let key = self.key(subject_id, scenario_id);
        let removed = self.store.delete(&key).await?;
        if removed {
            info!("Invalidated cache entry {}", key);
        }
        Ok(removed)
    }

    /// Drop every entry from older model versions
    pub async fn purge_stale(&self) -> Result<usize, CacheError> {
        let purged = self.store.purge_versions_below(self.model_version).await?;
        if purged > 0 {
            info!(
                "Purged {} cache entries older than model v{}",
                purged, self.model_version
            );
        }
        Ok(purged)
    }
}

/// An entry plus whether it was produced by this call
#[derive(Debug, Clone, PartialEq)]
pub struct CachedLookup {
    pub entry: CacheEntry,
    pub computed: bool,
    /// Outcome of storing a computed entry; empty on a hit
    pub write: BatchOutcome,
}
