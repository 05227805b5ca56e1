use crate::config::FetchConfig;
use crate::error::Result;
use reliable_fetch_core::{
    heartbeat_key, identity_from_key, queue_key, working_queue_pattern, Job, WorkerIdentity,
};
use reliable_fetch_store::ListStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Fleet-wide mutual-exclusion key serializing cleanup passes.
pub const CLEANUP_LEASE_KEY: &str = "reliable-fetch:cleanup-lease";

/// Marks a working queue claimed by a cleaner; the claiming cleaner's
/// identity follows, so peers can tell an in-progress drain from one
/// abandoned by a crash.
const CLAIM_INFIX: &str = ":cleanup:";

/// Scanner that returns the contents of dead workers' working queues to
/// their source queues.
///
/// A queue is reclaimed only when its embedded identity has no live
/// heartbeat; working queues of live identities are never touched. The
/// whole pass runs under a lease so at most one process in the fleet
/// scans per configured interval.
pub struct OrphanCleaner {
    store: Arc<dyn ListStore>,
    config: FetchConfig,
    identity: WorkerIdentity,
}

impl OrphanCleaner {
    pub fn new(store: Arc<dyn ListStore>, config: FetchConfig, identity: WorkerIdentity) -> Self {
        OrphanCleaner {
            store,
            config,
            identity,
        }
    }

    /// Run one lease-gated cleanup pass over every configured queue.
    ///
    /// Returns whether a scan actually ran. A `false` is the expected
    /// common case: another process holds the lease, or a pass completed
    /// within the last cleanup interval.
    pub async fn clean_working_queues(&self) -> Result<bool> {
        let acquired = self
            .store
            .set_if_absent_with_ttl(CLEANUP_LEASE_KEY, b"1", self.config.lease_ttl())
            .await?;
        if !acquired {
            return Ok(false);
        }

        for queue in &self.config.queues {
            self.clean_queue(queue).await?;
        }

        // A completed pass throttles the fleet for the full interval; the
        // shorter acquisition TTL above only covers a cleaner that dies
        // mid-pass.
        self.store
            .set_with_ttl(CLEANUP_LEASE_KEY, b"1", self.config.cleanup_interval())
            .await?;
        Ok(true)
    }

    async fn clean_queue(&self, queue: &str) -> Result<()> {
        let pattern = working_queue_pattern(queue);
        for key in self.store.scan_keys(&pattern).await? {
            if let Some((base, claimant)) = key.split_once(CLAIM_INFIX) {
                // Another cleaner's claim. Live claimant means a drain is
                // in progress; a dead one died mid-drain and its claim
                // would otherwise strand its contents forever.
                let claimant = WorkerIdentity::from_string(claimant);
                if self.store.exists(&heartbeat_key(&claimant)).await? {
                    continue;
                }
                self.requeue_working_queue(queue, &key, &self.claim_key(base))
                    .await?;
                continue;
            }

            let Some(identity) = identity_from_key(queue, &key) else {
                debug!(key, "skipping working-queue key with unrecognized format");
                continue;
            };
            if self.store.exists(&heartbeat_key(&identity)).await? {
                continue;
            }
            self.requeue_working_queue(queue, &key, &self.claim_key(&key))
                .await?;
        }
        Ok(())
    }

    fn claim_key(&self, key: &str) -> String {
        format!("{}{}{}", key, CLAIM_INFIX, self.identity)
    }

    /// Claim a working queue by renaming it, then drain it back onto the
    /// source queue with the interruption counter bumped.
    async fn requeue_working_queue(&self, queue: &str, key: &str, claim_key: &str) -> Result<()> {
        if !self.store.rename(key, claim_key).await? {
            // A concurrent cleaner claimed it first.
            debug!(key, "working queue vanished before rename");
            return Ok(());
        }

        let source = queue_key(queue);
        let mut requeued = 0u64;
        while let Some(payload) = self.store.pop(claim_key).await? {
            let bytes = match Job::from_bytes(&payload) {
                Ok(mut job) => {
                    job.record_interruption();
                    job.to_bytes().unwrap_or(payload)
                }
                Err(e) => {
                    warn!(queue, error = %e, "unparseable job payload; requeueing verbatim");
                    payload
                }
            };
            self.store.push(&source, &bytes).await?;
            requeued += 1;
        }

        info!(
            queue,
            working_queue = key,
            requeued,
            "recovered jobs from dead worker"
        );
        Ok(())
    }
}
