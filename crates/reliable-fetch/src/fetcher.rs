use crate::cleanup::OrphanCleaner;
use crate::config::Strategy;
use crate::context::WorkerContext;
use crate::error::Result;
use crate::unit_of_work::UnitOfWork;
use reliable_fetch_core::{queue_key, QUEUE_PREFIX};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Polling fetch primitive: each call tries to move one job from a source
/// queue into this process's working queue.
///
/// Callers run `retrieve_work` in a loop, checking their shutdown flag
/// between calls; `Ok(None)` means nothing was available within the
/// strategy's timeout, not an error. Every call opportunistically runs
/// orphan cleanup (lease-throttled, so usually a single store round trip)
/// and keeps the heartbeat loop alive.
pub struct Fetcher {
    ctx: Arc<WorkerContext>,
    cleaner: OrphanCleaner,
    rotation: AtomicUsize,
}

impl Fetcher {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        let cleaner = OrphanCleaner::new(
            ctx.store().clone(),
            ctx.config().clone(),
            ctx.identity().clone(),
        );
        Fetcher {
            ctx,
            cleaner,
            rotation: AtomicUsize::new(0),
        }
    }

    pub fn context(&self) -> &Arc<WorkerContext> {
        &self.ctx
    }

    /// Fetch one job, or `None` when every configured queue stayed empty
    /// for the strategy's timeout.
    pub async fn retrieve_work(&self) -> Result<Option<UnitOfWork>> {
        if let Err(e) = self.cleaner.clean_working_queues().await {
            // Cleanup failures must not stop this process from working.
            warn!(error = %e, "orphan cleanup failed");
        }
        self.ctx.ensure_heartbeat().await?;

        match self.ctx.config().strategy {
            Strategy::Reliable => self.retrieve_reliable().await,
            Strategy::SemiReliable => self.retrieve_semi_reliable().await,
        }
    }

    /// Queue order for one retrieval attempt: strict keeps the configured
    /// priority; otherwise the starting index rotates call-by-call so a
    /// busy high-priority queue cannot starve the rest.
    fn ordered_queues(&self) -> Vec<&str> {
        let queues = &self.ctx.config().queues;
        if self.ctx.config().strict {
            return queues.iter().map(String::as_str).collect();
        }
        let start = self.rotation.fetch_add(1, Ordering::Relaxed) % queues.len();
        queues[start..]
            .iter()
            .chain(queues[..start].iter())
            .map(String::as_str)
            .collect()
    }

    /// One non-blocking atomic-move pass over the queues. The move is a
    /// single store operation, so there is no instant at which a fetched
    /// job is in neither list.
    async fn retrieve_reliable(&self) -> Result<Option<UnitOfWork>> {
        let store = self.ctx.store();
        for queue in self.ordered_queues() {
            let working_queue = self.ctx.working_queue(queue);
            if let Some(payload) = store.pop_and_push(&queue_key(queue), &working_queue).await? {
                return Ok(Some(UnitOfWork::new(
                    queue.to_string(),
                    working_queue,
                    payload,
                    store.clone(),
                )));
            }
        }
        tokio::time::sleep(self.ctx.config().reliable_idle_wait()).await;
        Ok(None)
    }

    /// Blocking multi-queue pop, then a separate working-queue push.
    ///
    /// Known gap: a crash between the pop and the push leaves the job in
    /// neither list, where cleanup cannot see it. That window is the
    /// documented trade-off of this strategy and is deliberately not
    /// patched over.
    async fn retrieve_semi_reliable(&self) -> Result<Option<UnitOfWork>> {
        let store = self.ctx.store();
        let keys: Vec<String> = self.ordered_queues().iter().map(|q| queue_key(q)).collect();

        let popped = store
            .blocking_pop(&keys, self.ctx.config().semi_reliable_timeout())
            .await?;
        let Some((key, payload)) = popped else {
            return Ok(None);
        };

        let queue = key
            .strip_prefix(&format!("{}:", QUEUE_PREFIX))
            .unwrap_or(&key)
            .to_string();
        let working_queue = self.ctx.working_queue(&queue);
        store.push(&working_queue, &payload).await?;

        Ok(Some(UnitOfWork::new(
            queue,
            working_queue,
            payload,
            store.clone(),
        )))
    }
}
