use crate::config::FetchConfig;
use crate::error::Result;
use crate::heartbeat::{Heartbeat, HeartbeatHandle};
use parking_lot::Mutex;
use reliable_fetch_core::{working_queue_key, WorkerIdentity};
use reliable_fetch_store::ListStore;
use std::sync::Arc;

/// Per-process runtime state shared by the fetch strategies, cleanup
/// scanner and shutdown path.
///
/// Constructed once at process start and passed around explicitly, so a
/// test run can host several simulated "processes" against one store.
pub struct WorkerContext {
    store: Arc<dyn ListStore>,
    config: FetchConfig,
    identity: WorkerIdentity,
    heartbeat: Mutex<Option<HeartbeatHandle>>,
}

impl WorkerContext {
    /// Build the context for this process, using the memoized process
    /// identity.
    pub fn new(store: Arc<dyn ListStore>, config: FetchConfig) -> Result<Arc<Self>> {
        Self::with_identity(store, config, WorkerIdentity::for_process().clone())
    }

    /// Build a context with an explicit identity (simulated processes).
    pub fn with_identity(
        store: Arc<dyn ListStore>,
        config: FetchConfig,
        identity: WorkerIdentity,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(WorkerContext {
            store,
            config,
            identity,
            heartbeat: Mutex::new(None),
        }))
    }

    pub fn store(&self) -> &Arc<dyn ListStore> {
        &self.store
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    /// Working-queue key for one of this process's source queues.
    pub fn working_queue(&self, queue: &str) -> String {
        working_queue_key(queue, &self.identity)
    }

    /// Start the heartbeat loop if it is not already running. The first
    /// marker is written before this returns, so a fetch immediately
    /// after cannot race a concurrent cleanup pass.
    pub async fn ensure_heartbeat(&self) -> Result<()> {
        {
            let heartbeat = self.heartbeat.lock();
            if heartbeat.is_some() {
                return Ok(());
            }
        }

        Heartbeat::publish_once(&self.store, &self.identity, self.config.heartbeat_ttl()).await?;

        let mut heartbeat = self.heartbeat.lock();
        if heartbeat.is_none() {
            *heartbeat = Some(Heartbeat::spawn(
                self.store.clone(),
                self.identity.clone(),
                self.config.heartbeat_interval(),
                self.config.heartbeat_ttl(),
            ));
        }
        Ok(())
    }

    /// Clean shutdown of the heartbeat: stops the loop and deletes the
    /// marker. A no-op when the loop never started.
    pub async fn stop_heartbeat(&self) {
        let handle = self.heartbeat.lock().take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }

    /// Kill the heartbeat loop leaving the marker to expire, as a crashed
    /// process would.
    #[cfg(test)]
    pub(crate) fn abort_heartbeat(&self) {
        if let Some(handle) = self.heartbeat.lock().take() {
            handle.abort();
        }
    }
}
