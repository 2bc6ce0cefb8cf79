use super::{BatchOutcome, CacheEntry, CacheKey, CacheStore};
use crate::error::CacheError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local store. Entries are swapped whole under the write lock.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn upsert_batch(&self, entries: Vec<CacheEntry>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let mut map = self.entries.write().await;
        for entry in entries {
            let key = entry.key.clone();
            map.insert(key.clone(), entry);
            outcome.succeeded.push(key);
        }
        outcome
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool, CacheError> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn purge_versions_below(&self, model_version: u32) -> Result<usize, CacheError> {
        let mut map = self.entries.write().await;
        let before = map.len();
        map.retain(|key, _| key.model_version >= model_version);
        Ok(before - map.len())
    }

    async fn len(&self) -> Result<usize, CacheError> {
        Ok(self.entries.read().await.len())
    }
}
