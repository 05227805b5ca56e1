use crate::context::WorkerContext;
use crate::unit_of_work::UnitOfWork;
use reliable_fetch_core::{queue_key, Job, JobTypeRegistry, INTERRUPTIONS_UNLIMITED};
use std::collections::HashMap;
use tracing::{error, info, warn};

/// Return every still-outstanding unit of work to its source queue at
/// shutdown, with interruption accounting.
///
/// Jobs whose interruption budget is now exhausted are diverted to the
/// interrupted holding list (after their type's exhaustion callback, if
/// any) instead of going back into the live pipeline. Pushes are batched
/// per destination list and always happen before the matching
/// working-queue entries are dropped, so a failure at any point leaves
/// the job reachable by a later cleanup pass. Runs on the shutdown path,
/// so every failure is logged and skipped rather than propagated.
pub async fn bulk_requeue(units: Vec<UnitOfWork>, registry: &JobTypeRegistry, ctx: &WorkerContext) {
    let store = ctx.store();
    let mut batches: HashMap<String, (Vec<Vec<u8>>, Vec<&UnitOfWork>)> = HashMap::new();

    for unit in &units {
        let (dest, bytes) = match Job::from_bytes(unit.job_bytes()) {
            Ok(mut job) => {
                job.record_interruption();
                let max = registry.max_interruptions(&job.class);
                let bytes = job
                    .to_bytes()
                    .unwrap_or_else(|_| unit.job_bytes().to_vec());

                if max != INTERRUPTIONS_UNLIMITED && job.interrupted_count as i64 > max {
                    if let Some(callback) = registry.on_exhausted(&job.class) {
                        if let Err(e) = callback(&job) {
                            error!(
                                class = %job.class,
                                jid = %job.jid_display(),
                                error = %e,
                                "interruption-exhausted callback failed"
                            );
                        }
                    }
                    info!(
                        class = %job.class,
                        jid = %job.jid_display(),
                        interrupted_count = job.interrupted_count,
                        "job exceeded its interruption budget; moving to interrupted list"
                    );
                    (ctx.config().interrupted_key.clone(), bytes)
                } else {
                    info!(
                        class = %job.class,
                        jid = %job.jid_display(),
                        queue = unit.queue_name(),
                        interrupted_count = job.interrupted_count,
                        "requeueing interrupted job"
                    );
                    (queue_key(unit.queue_name()), bytes)
                }
            }
            Err(e) => {
                // Never drop bytes we cannot parse; send them back as-is.
                warn!(
                    queue = unit.queue_name(),
                    error = %e,
                    "unparseable job payload during bulk requeue; requeueing verbatim"
                );
                (queue_key(unit.queue_name()), unit.job_bytes().to_vec())
            }
        };

        let entry = batches.entry(dest).or_default();
        entry.0.push(bytes);
        entry.1.push(unit);
    }

    for (dest, (payloads, batch_units)) in batches {
        // Push before removing. A job present in both its destination and
        // its working queue is delivered twice at worst; a job in neither
        // is lost, and cleanup cannot get it back.
        if let Err(e) = store.push_many(&dest, &payloads).await {
            error!(
                destination = %dest,
                count = payloads.len(),
                error = %e,
                "bulk requeue push failed; jobs stay in their working queues"
            );
            continue;
        }

        // The heartbeat marker goes away on clean shutdown; leftovers in
        // the working queue would be recovered again by the next cleanup
        // pass and delivered twice.
        for unit in batch_units {
            if let Err(e) = store.remove(unit.working_queue_key(), unit.job_bytes()).await {
                warn!(
                    working_queue = unit.working_queue_key(),
                    error = %e,
                    "failed to drop requeued job from working queue"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchConfig;
    use async_trait::async_trait;
    use reliable_fetch_core::{JobTypeConfig, WorkerIdentity};
    use reliable_fetch_store::{ListStore, MemoryStore, StoreError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Delegates to a [`MemoryStore`] but fails every batch push.
    struct FailingPushStore(MemoryStore);

    #[async_trait]
    impl ListStore for FailingPushStore {
        async fn push(&self, key: &str, value: &[u8]) -> reliable_fetch_store::Result<()> {
            self.0.push(key, value).await
        }

        async fn push_many(
            &self,
            _key: &str,
            _values: &[Vec<u8>],
        ) -> reliable_fetch_store::Result<()> {
            Err(StoreError::Backend("push_many unavailable".to_string()))
        }

        async fn pop(&self, key: &str) -> reliable_fetch_store::Result<Option<Vec<u8>>> {
            self.0.pop(key).await
        }

        async fn pop_and_push(
            &self,
            source: &str,
            dest: &str,
        ) -> reliable_fetch_store::Result<Option<Vec<u8>>> {
            self.0.pop_and_push(source, dest).await
        }

        async fn blocking_pop(
            &self,
            keys: &[String],
            timeout: Duration,
        ) -> reliable_fetch_store::Result<Option<(String, Vec<u8>)>> {
            self.0.blocking_pop(keys, timeout).await
        }

        async fn remove(&self, key: &str, value: &[u8]) -> reliable_fetch_store::Result<u64> {
            self.0.remove(key, value).await
        }

        async fn list_len(&self, key: &str) -> reliable_fetch_store::Result<u64> {
            self.0.list_len(key).await
        }

        async fn rename(&self, from: &str, to: &str) -> reliable_fetch_store::Result<bool> {
            self.0.rename(from, to).await
        }

        async fn set_with_ttl(
            &self,
            key: &str,
            value: &[u8],
            ttl: Duration,
        ) -> reliable_fetch_store::Result<()> {
            self.0.set_with_ttl(key, value, ttl).await
        }

        async fn set_if_absent_with_ttl(
            &self,
            key: &str,
            value: &[u8],
            ttl: Duration,
        ) -> reliable_fetch_store::Result<bool> {
            self.0.set_if_absent_with_ttl(key, value, ttl).await
        }

        async fn exists(&self, key: &str) -> reliable_fetch_store::Result<bool> {
            self.0.exists(key).await
        }

        async fn delete(&self, key: &str) -> reliable_fetch_store::Result<()> {
            self.0.delete(key).await
        }

        async fn scan_keys(&self, pattern: &str) -> reliable_fetch_store::Result<Vec<String>> {
            self.0.scan_keys(pattern).await
        }
    }

    fn context(store: &Arc<dyn ListStore>) -> Arc<WorkerContext> {
        let config = FetchConfig {
            queues: vec!["foo".to_string()],
            ..FetchConfig::default()
        };
        let identity = WorkerIdentity::from_string("testhost-100-deadbeef");
        WorkerContext::with_identity(store.clone(), config, identity).unwrap()
    }

    async fn fetched_unit(
        store: &Arc<dyn ListStore>,
        ctx: &WorkerContext,
        payload: &[u8],
    ) -> UnitOfWork {
        let wq = ctx.working_queue("foo");
        store.push(&wq, payload).await.unwrap();
        UnitOfWork::new("foo".to_string(), wq, payload.to_vec(), store.clone())
    }

    #[tokio::test]
    async fn test_in_budget_job_goes_back_with_counter_bumped() {
        let store: Arc<dyn ListStore> = Arc::new(MemoryStore::new());
        let ctx = context(&store);
        let registry = JobTypeRegistry::new(3);

        let unit =
            fetched_unit(&store, &ctx, br#"{"class":"Bob","jid":1,"interrupted_count":1}"#).await;
        let wq = unit.working_queue_key().to_string();
        bulk_requeue(vec![unit], &registry, &ctx).await;

        assert_eq!(store.list_len(&wq).await.unwrap(), 0);
        let payload = store.pop("queue:foo").await.unwrap().unwrap();
        assert_eq!(Job::from_bytes(&payload).unwrap().interrupted_count, 2);
        assert_eq!(store.list_len("reliable-fetch:interrupted").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_job_is_diverted_to_interrupted_list() {
        let store: Arc<dyn ListStore> = Arc::new(MemoryStore::new());
        let ctx = context(&store);
        let registry = JobTypeRegistry::new(3);

        let unit =
            fetched_unit(&store, &ctx, br#"{"class":"Bob","jid":1,"interrupted_count":3}"#).await;
        let wq = unit.working_queue_key().to_string();
        bulk_requeue(vec![unit], &registry, &ctx).await;

        assert_eq!(store.list_len("queue:foo").await.unwrap(), 0);
        assert_eq!(store.list_len(&wq).await.unwrap(), 0);
        let payload = store
            .pop("reliable-fetch:interrupted")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(Job::from_bytes(&payload).unwrap().interrupted_count, 4);
    }

    #[tokio::test]
    async fn test_unlimited_sentinel_never_diverts() {
        let store: Arc<dyn ListStore> = Arc::new(MemoryStore::new());
        let ctx = context(&store);
        let registry = JobTypeRegistry::new(3);
        registry.register(
            "Bob",
            JobTypeConfig {
                max_interruptions: Some(INTERRUPTIONS_UNLIMITED),
                on_exhausted: None,
            },
        );

        let unit = fetched_unit(
            &store,
            &ctx,
            br#"{"class":"Bob","jid":1,"interrupted_count":99}"#,
        )
        .await;
        bulk_requeue(vec![unit], &registry, &ctx).await;

        assert_eq!(store.list_len("queue:foo").await.unwrap(), 1);
        assert_eq!(store.list_len("reliable-fetch:interrupted").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_exhaustion_callback_runs_and_failure_does_not_block_diversion() {
        let store: Arc<dyn ListStore> = Arc::new(MemoryStore::new());
        let ctx = context(&store);
        let registry = JobTypeRegistry::new(0);

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        registry.register(
            "Bob",
            JobTypeConfig {
                max_interruptions: None,
                on_exhausted: Some(Arc::new(move |_job| {
                    calls_clone.fetch_add(1, Ordering::SeqCst);
                    Err(anyhow::anyhow!("boom"))
                })),
            },
        );

        let unit = fetched_unit(&store, &ctx, br#"{"class":"Bob","jid":1}"#).await;
        bulk_requeue(vec![unit], &registry, &ctx).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.list_len("reliable-fetch:interrupted").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_bad_item_does_not_abort_the_batch() {
        let store: Arc<dyn ListStore> = Arc::new(MemoryStore::new());
        let ctx = context(&store);
        let registry = JobTypeRegistry::new(3);

        let bad = fetched_unit(&store, &ctx, b"not json").await;
        let good =
            fetched_unit(&store, &ctx, br#"{"class":"Bob","jid":2,"interrupted_count":0}"#).await;
        bulk_requeue(vec![bad, good], &registry, &ctx).await;

        // both land on the source queue: the good one updated, the bad
        // one verbatim
        assert_eq!(store.list_len("queue:foo").await.unwrap(), 2);
        let mut verbatim = 0;
        let mut updated = 0;
        while let Some(payload) = store.pop("queue:foo").await.unwrap() {
            match Job::from_bytes(&payload) {
                Ok(job) => {
                    assert_eq!(job.interrupted_count, 1);
                    updated += 1;
                }
                Err(_) => {
                    assert_eq!(payload, b"not json");
                    verbatim += 1;
                }
            }
        }
        assert_eq!((verbatim, updated), (1, 1));
    }

    #[tokio::test]
    async fn test_failed_push_leaves_jobs_in_working_queues() {
        let store: Arc<dyn ListStore> = Arc::new(FailingPushStore(MemoryStore::new()));
        let ctx = context(&store);
        let registry = JobTypeRegistry::new(3);

        let unit = fetched_unit(&store, &ctx, br#"{"class":"Bob","jid":1}"#).await;
        let wq = unit.working_queue_key().to_string();
        bulk_requeue(vec![unit], &registry, &ctx).await;

        // the push never landed, so the working-queue entry must survive
        // for the next cleanup pass to recover
        assert_eq!(store.list_len("queue:foo").await.unwrap(), 0);
        assert_eq!(store.list_len(&wq).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_configured_budget_drives_diversion() {
        let store: Arc<dyn ListStore> = Arc::new(MemoryStore::new());
        let config: FetchConfig =
            serde_yaml::from_str("queues: [foo]\nmax_interruptions: 1\n").unwrap();
        let registry = JobTypeRegistry::new(config.max_interruptions);
        let identity = WorkerIdentity::from_string("testhost-100-deadbeef");
        let ctx = WorkerContext::with_identity(store.clone(), config, identity).unwrap();

        let unit =
            fetched_unit(&store, &ctx, br#"{"class":"Bob","jid":1,"interrupted_count":1}"#).await;
        bulk_requeue(vec![unit], &registry, &ctx).await;

        // count 2 exceeds the configured budget of 1
        assert_eq!(store.list_len("queue:foo").await.unwrap(), 0);
        assert_eq!(store.list_len("reliable-fetch:interrupted").await.unwrap(), 1);
    }
}
