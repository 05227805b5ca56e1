use crate::error::Result;
use reliable_fetch_core::{heartbeat_key, WorkerIdentity};
use reliable_fetch_store::ListStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Periodic publisher of this process's liveness marker.
///
/// The marker's absence is the only death signal other processes have, so
/// the TTL is kept well above the publish interval: a couple of missed
/// ticks must not read as a dead worker.
pub struct Heartbeat;

impl Heartbeat {
    /// Write the marker once. Exposed separately so tests can tick the
    /// heartbeat deterministically instead of sleeping through intervals.
    pub async fn publish_once(
        store: &Arc<dyn ListStore>,
        identity: &WorkerIdentity,
        ttl: Duration,
    ) -> Result<()> {
        store
            .set_with_ttl(&heartbeat_key(identity), b"1", ttl)
            .await?;
        Ok(())
    }

    /// Spawn the background publish loop. The first marker is written on
    /// the first tick, which fires immediately.
    pub fn spawn(
        store: Arc<dyn ListStore>,
        identity: WorkerIdentity,
        interval: Duration,
        ttl: Duration,
    ) -> HeartbeatHandle {
        let token = CancellationToken::new();
        let loop_token = token.clone();
        let loop_store = store.clone();
        let key = heartbeat_key(&identity);

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = Heartbeat::publish_once(&loop_store, &identity, ttl).await {
                            warn!(identity = %identity, error = %e, "failed to publish heartbeat");
                        } else {
                            debug!(identity = %identity, "heartbeat published");
                        }
                    }
                }
            }
        });

        HeartbeatHandle {
            token,
            join,
            store,
            key,
        }
    }
}

/// Handle over a running heartbeat loop.
pub struct HeartbeatHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
    store: Arc<dyn ListStore>,
    key: String,
}

impl HeartbeatHandle {
    /// Clean shutdown: stop the loop and proactively delete the marker so
    /// peers do not wait a full TTL to observe this process as gone.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.join.await {
            warn!(error = %e, "heartbeat loop did not stop cleanly");
        }
        if let Err(e) = self.store.delete(&self.key).await {
            warn!(error = %e, "failed to delete heartbeat marker");
        }
    }

    /// Stop the loop without touching the marker, leaving it to expire.
    /// Used to simulate a crashed process.
    #[cfg(test)]
    pub(crate) fn abort(self) {
        self.join.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reliable_fetch_store::MemoryStore;

    fn identity() -> WorkerIdentity {
        WorkerIdentity::from_string("testhost-100-deadbeef")
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_once_sets_marker_with_ttl() {
        let store: Arc<dyn ListStore> = Arc::new(MemoryStore::new());
        let identity = identity();

        Heartbeat::publish_once(&store, &identity, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(store.exists(&heartbeat_key(&identity)).await.unwrap());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!store.exists(&heartbeat_key(&identity)).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_keeps_marker_alive_past_ttl() {
        let store: Arc<dyn ListStore> = Arc::new(MemoryStore::new());
        let identity = identity();
        let handle = Heartbeat::spawn(
            store.clone(),
            identity.clone(),
            Duration::from_secs(10),
            Duration::from_secs(60),
        );

        // Well past the TTL; the loop keeps refreshing.
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(store.exists(&heartbeat_key(&identity)).await.unwrap());

        handle.stop().await;
        assert!(!store.exists(&heartbeat_key(&identity)).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_loop_lets_marker_expire() {
        let store: Arc<dyn ListStore> = Arc::new(MemoryStore::new());
        let identity = identity();
        let handle = Heartbeat::spawn(
            store.clone(),
            identity.clone(),
            Duration::from_secs(10),
            Duration::from_secs(60),
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.abort();

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!store.exists(&heartbeat_key(&identity)).await.unwrap());
    }
}
