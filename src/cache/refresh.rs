use super::{BatchOutcome, CacheStore, CachedResult, InputSnapshot, ResultCache};
use crate::error::EngineResult;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use log::{info, warn};
use serde::Serialize;
use std::future::Future;

/// One `(subject, scenario)` pair to recompute
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshTask {
    pub subject_id: String,
    pub scenario_id: String,
    pub inputs: InputSnapshot,
}

impl RefreshTask {
    pub fn new(subject_id: &str, scenario_id: &str) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            scenario_id: scenario_id.to_string(),
            inputs: InputSnapshot::default(),
        }
    }

    pub fn with_inputs(mut self, inputs: impl Into<InputSnapshot>) -> Self {
        self.inputs = inputs.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedTask {
    pub subject_id: String,
    pub scenario_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RefreshSummary {
    pub computed: usize,
    pub reused: usize,
    pub failed: Vec<FailedTask>,
    pub write: BatchOutcome,
}

enum TaskOutcome {
    Computed(BatchOutcome),
    Reused,
    Failed(FailedTask),
}

/// Batch recompute of cached results with bounded concurrency.
///
/// Each task goes through the cache's per-key lock, so a key shared with another refresh or
/// a concurrent `get_or_compute` is computed once. An entry is reused when it is fresh and
/// was computed from the task's inputs; with `force` set it must also postdate the start of
/// this run. A failing task is recorded and the rest still run.
pub struct RefreshJob<'a, S: CacheStore> {
    cache: &'a ResultCache<S>,
    concurrency: usize,
    force: bool,
}

impl<'a, S: CacheStore> RefreshJob<'a, S> {
    pub fn new(cache: &'a ResultCache<S>, concurrency: usize) -> Self {
        Self {
            cache,
            concurrency: concurrency.max(1),
            force: false,
        }
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub async fn run<F, Fut>(&self, tasks: Vec<RefreshTask>, compute: F) -> RefreshSummary
    where
        F: Fn(RefreshTask) -> Fut,
        Fut: Future<Output = EngineResult<CachedResult>>,
    {
        let total = tasks.len();
        info!(
            "Refreshing {} cache entries (concurrency {}, model v{})",
            total,
            self.concurrency,
            self.cache.model_version()
        );

        let cache = self.cache;
        let compute = &compute;
        let not_before = self.force.then(Utc::now);

        let outcomes: Vec<TaskOutcome> = stream::iter(tasks)
            .map(|task| async move {
                let subject_id = task.subject_id.clone();
                let scenario_id = task.scenario_id.clone();
                let inputs = task.inputs.clone();

                let lookup = cache
                    .get_or_compute_since(&subject_id, &scenario_id, inputs, not_before, || {
                        compute(task)
                    })
                    .await;

                match lookup {
                    Ok(lookup) if lookup.computed => TaskOutcome::Computed(lookup.write),
                    Ok(_) => TaskOutcome::Reused,
                    Err(e) => {
                        warn!("Refresh of {}/{} failed: {}", subject_id, scenario_id, e);
                        TaskOutcome::Failed(FailedTask {
                            subject_id,
                            scenario_id,
                            reason: e.to_string(),
                        })
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut summary = RefreshSummary::default();
        for outcome in outcomes {
            match outcome {
                TaskOutcome::Computed(write) => {
                    summary.computed += 1;
                    summary.write.merge(write);
                }
                TaskOutcome::Reused => summary.reused += 1,
                TaskOutcome::Failed(failure) => summary.failed.push(failure),
            }
        }

        info!(
            "Refresh complete: {} computed, {} reused, {} failed, {} write failures",
            summary.computed,
            summary.reused,
            summary.failed.len(),
            summary.write.failed.len()
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheEntry, MemoryCacheStore};
    use crate::error::{DataGap, EngineError};
    use crate::simulation::SimulationResult;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn result(median: f64) -> CachedResult {
        CachedResult::Simulation(SimulationResult::new(median, 0.2, -0.1, 0.1, 100).unwrap())
    }

    #[tokio::test]
    async fn test_refresh_skips_fresh_and_isolates_failures() {
        let cache = ResultCache::new(Arc::new(MemoryCacheStore::new()), 1);
        cache
            .upsert_batch(vec![CacheEntry::new(
                cache.key("p1", "base"),
                result(0.01),
                InputSnapshot::default(),
            )])
            .await;

        let calls = AtomicUsize::new(0);
        let tasks = vec![
            RefreshTask::new("p1", "base"),
            RefreshTask::new("p2", "base"),
            RefreshTask::new("bad", "base"),
        ];
        let summary = RefreshJob::new(&cache, 2)
            .run(tasks, |task| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if task.subject_id == "bad" {
                        Err(EngineError::data_unavailable(
                            "bad",
                            DataGap::MissingYear1Return,
                        ))
                    } else {
                        Ok(result(0.02))
                    }
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(summary.reused, 1);
        assert_eq!(summary.computed, 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].subject_id, "bad");
        assert!(summary.write.is_complete());
        assert!(cache.get("p2", "base").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_forced_refresh_recomputes_everything() {
        let cache = ResultCache::new(Arc::new(MemoryCacheStore::new()), 1);
        cache
            .upsert_batch(vec![CacheEntry::new(
                cache.key("p1", "base"),
                result(0.01),
                InputSnapshot::default(),
            )])
            .await;

        let summary = RefreshJob::new(&cache, 4)
            .force(true)
            .run(vec![RefreshTask::new("p1", "base")], |_| async {
                Ok(result(0.05))
            })
            .await;
        assert_eq!(summary.computed, 1);
        assert_eq!(summary.reused, 0);

        let entry = cache.get("p1", "base").await.unwrap().unwrap();
        assert_eq!(entry.payload, result(0.05));
    }

    #[tokio::test]
    async fn test_changed_inputs_are_recomputed() {
        let cache = ResultCache::new(Arc::new(MemoryCacheStore::new()), 1);
        let held: BTreeMap<String, f64> = BTreeMap::from([("VTI".to_string(), 1.0)]);
        let rebalanced: BTreeMap<String, f64> = BTreeMap::from([("BND".to_string(), 1.0)]);
        cache
            .upsert_batch(vec![CacheEntry::new(cache.key("p1", "base"), result(0.01), held)])
            .await;

        let task = RefreshTask::new("p1", "base").with_inputs(rebalanced.clone());
        let summary = RefreshJob::new(&cache, 2)
            .run(vec![task], |_| async { Ok(result(0.03)) })
            .await;

        assert_eq!(summary.computed, 1);
        assert_eq!(summary.reused, 0);
        let entry = cache.get("p1", "base").await.unwrap().unwrap();
        assert_eq!(entry.inputs.weights, rebalanced);
    }

    #[tokio::test]
    async fn test_overlapping_refreshes_compute_once() {
        let cache = ResultCache::new(Arc::new(MemoryCacheStore::new()), 1);
        let calls = AtomicUsize::new(0);
        let compute = |_task: RefreshTask| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok(result(0.04))
            }
        };

        let first = RefreshJob::new(&cache, 2);
        let second = RefreshJob::new(&cache, 2);
        let (a, b) = tokio::join!(
            first.run(vec![RefreshTask::new("p1", "base")], compute),
            second.run(vec![RefreshTask::new("p1", "base")], compute),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.computed + b.computed, 1);
        assert_eq!(a.reused + b.reused, 1);
    }

    #[tokio::test]
    async fn test_overlapping_forced_refreshes_share_one_computation() {
        let cache = ResultCache::new(Arc::new(MemoryCacheStore::new()), 1);
        cache
            .upsert_batch(vec![CacheEntry::new(
                cache.key("p1", "base"),
                result(0.01),
                InputSnapshot::default(),
            )])
            .await;

        let calls = AtomicUsize::new(0);
        let compute = |_task: RefreshTask| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok(result(0.05))
            }
        };

        let first = RefreshJob::new(&cache, 1).force(true);
        let second = RefreshJob::new(&cache, 1).force(true);
        tokio::join!(
            first.run(vec![RefreshTask::new("p1", "base")], compute),
            second.run(vec![RefreshTask::new("p1", "base")], compute),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let entry = cache.get("p1", "base").await.unwrap().unwrap();
        assert_eq!(entry.payload, result(0.05));
    }
}
