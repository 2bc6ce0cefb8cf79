use anyhow::Result;
use cycle_projection::cache::{
    CacheEntry, CacheKey, CacheStore, CachedResult, MemoryCacheStore, RefreshJob, RefreshTask,
    ResultCache, SqliteCacheStore,
};
use cycle_projection::simulation::SimulationResult;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[cfg(test)]
mod cache_tests {
    use super::*;

    fn payload(median: f64) -> CachedResult {
        CachedResult::Simulation(
            SimulationResult::new(median, median + 0.2, median - 0.2, 0.15, 1_000)
                .expect("valid result"),
        )
    }

    fn weights() -> BTreeMap<String, f64> {
        BTreeMap::from([("VTI".to_string(), 0.6), ("BND".to_string(), 0.4)])
    }

    async fn assert_idempotent_upsert<S: CacheStore>(store: S) -> Result<()> {
        let key = CacheKey::new("retirement", "global-financial-crisis", 1);
        store
            .upsert_batch(vec![CacheEntry::new(key.clone(), payload(0.01), weights())])
            .await;
        let outcome = store
            .upsert_batch(vec![CacheEntry::new(key.clone(), payload(0.02), weights())])
            .await;

        assert!(outcome.is_complete());
        assert_eq!(store.len().await?, 1);
        let entry = store.get(&key).await?.expect("entry stored");
        assert_eq!(entry.payload, payload(0.02));
        Ok(())
    }

    #[tokio::test]
    async fn test_memory_upsert_is_idempotent() -> Result<()> {
        assert_idempotent_upsert(MemoryCacheStore::new()).await
    }

    #[tokio::test]
    async fn test_sqlite_upsert_is_idempotent() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = SqliteCacheStore::open(dir.path().join("cache.db"))?;
        assert_idempotent_upsert(store).await
    }

    #[tokio::test]
    async fn test_sqlite_entries_survive_reopen() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("cache.db");

        {
            let cache = ResultCache::new(Arc::new(SqliteCacheStore::open(&path)?), 4);
            let entry = CacheEntry::new(cache.key("retirement", "base"), payload(0.05), weights());
            assert!(cache.upsert_batch(vec![entry]).await.is_complete());
        }

        let cache = ResultCache::new(Arc::new(SqliteCacheStore::open(&path)?), 4);
        let entry = cache.get("retirement", "base").await?.expect("persisted");
        assert_eq!(entry.payload, payload(0.05));
        assert_eq!(entry.inputs.weights, weights());

        // a model bump stops serving it
        let bumped = ResultCache::new(cache.store().clone(), 5);
        assert!(bumped.get("retirement", "base").await?.is_none());
        assert_eq!(bumped.purge_stale().await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_write_rejected_fresh_writes_commit() -> Result<()> {
        let cache = ResultCache::new(Arc::new(SqliteCacheStore::in_memory()?), 3);
        let entries = vec![
            CacheEntry::new(cache.key("a", "base"), payload(0.01), weights()),
            CacheEntry::new(CacheKey::new("b", "base", 2), payload(0.02), weights()),
            CacheEntry::new(cache.key("c", "base"), payload(0.03), weights()),
        ];

        let outcome = cache.upsert_batch(entries).await;
        assert_eq!(outcome.succeeded.len(), 2);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].key.subject_id, "b");
        assert!(cache.get("a", "base").await?.is_some());
        assert!(cache.get("c", "base").await?.is_some());
        assert_eq!(cache.store().len().await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_callers_compute_once() -> Result<()> {
        let cache = ResultCache::new(Arc::new(MemoryCacheStore::new()), 1);
        let calls = AtomicUsize::new(0);

        let lookups = join_all((0..8).map(|_| {
            cache.get_or_compute("retirement", "base", weights(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(payload(0.04))
            })
        }))
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let computed = lookups
            .into_iter()
            .map(|lookup| lookup.map(|l| l.computed))
            .collect::<Result<Vec<bool>, _>>()?;
        assert_eq!(computed.iter().filter(|c| **c).count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_distinct_keys_compute_independently() -> Result<()> {
        let cache = ResultCache::new(Arc::new(MemoryCacheStore::new()), 1);
        let calls = AtomicUsize::new(0);

        let scenarios = ["base", "covid-crash", "dotcom-bust"];
        let lookups = join_all(scenarios.iter().map(|scenario| {
            cache.get_or_compute("retirement", scenario, weights(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(payload(0.0))
            })
        }))
        .await;

        assert!(lookups.iter().all(|l| l.is_ok()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.store().len().await?, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_refresh_and_lookup_share_one_computation() -> Result<()> {
        let cache = ResultCache::new(Arc::new(SqliteCacheStore::in_memory()?), 1);
        let calls = AtomicUsize::new(0);
        let slow = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(payload(0.06))
        };

        let task = RefreshTask::new("retirement", "base").with_inputs(weights());
        let job = RefreshJob::new(&cache, 2);
        let (summary, lookup) = tokio::join!(
            job.run(vec![task], |_| slow()),
            cache.get_or_compute("retirement", "base", weights(), slow),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(summary.computed + usize::from(lookup?.computed), 1);
        assert!(summary.failed.is_empty());
        Ok(())
    }
}
