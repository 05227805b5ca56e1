use crate::error::Result;
use reliable_fetch_core::{queue_key, Job};
use reliable_fetch_store::ListStore;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Handle over one fetched job sitting in this process's working queue.
///
/// The handle holds no state of its own beyond the raw payload; the job
/// lives in the store until [`UnitOfWork::acknowledge`] removes it or
/// [`UnitOfWork::requeue`] sends it back to its source queue.
pub struct UnitOfWork {
    queue: String,
    working_queue: String,
    payload: Vec<u8>,
    store: Arc<dyn ListStore>,
}

impl UnitOfWork {
    pub(crate) fn new(
        queue: String,
        working_queue: String,
        payload: Vec<u8>,
        store: Arc<dyn ListStore>,
    ) -> Self {
        UnitOfWork {
            queue,
            working_queue,
            payload,
            store,
        }
    }

    /// Source queue this job came from.
    pub fn queue_name(&self) -> &str {
        &self.queue
    }

    /// Raw payload bytes, exactly as fetched.
    pub fn job_bytes(&self) -> &[u8] {
        &self.payload
    }

    /// Decode the payload. Fails only on malformed payloads; the raw
    /// bytes remain available either way.
    pub fn job(&self) -> Result<Job> {
        Ok(Job::from_bytes(&self.payload)?)
    }

    pub fn working_queue_key(&self) -> &str {
        &self.working_queue
    }

    /// Success path: remove this job from the working queue. Exactly one
    /// matching entry is removed; a second call finds nothing and is a
    /// no-op.
    pub async fn acknowledge(&self) -> Result<()> {
        let removed = self.store.remove(&self.working_queue, &self.payload).await?;
        debug!(
            queue = %self.queue,
            removed,
            "acknowledged unit of work"
        );
        Ok(())
    }

    /// Explicit abort path: push the payload back onto the source queue
    /// untouched (no interruption accounting, unlike crash recovery) and
    /// drop it from the working queue.
    pub async fn requeue(&self) -> Result<()> {
        self.store.push(&queue_key(&self.queue), &self.payload).await?;
        self.store.remove(&self.working_queue, &self.payload).await?;
        debug!(queue = %self.queue, "requeued unit of work");
        Ok(())
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("queue", &self.queue)
            .field("working_queue", &self.working_queue)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reliable_fetch_store::MemoryStore;

    fn unit(store: &Arc<dyn ListStore>, payload: &[u8]) -> UnitOfWork {
        UnitOfWork::new(
            "foo".to_string(),
            "working:queue:foo:testhost-100-deadbeef".to_string(),
            payload.to_vec(),
            store.clone(),
        )
    }

    #[tokio::test]
    async fn test_acknowledge_removes_exactly_one_entry() {
        let store: Arc<dyn ListStore> = Arc::new(MemoryStore::new());
        let payload = br#"{"class":"Bob","jid":55}"#;
        let wq = "working:queue:foo:testhost-100-deadbeef";

        store.push(wq, payload).await.unwrap();
        store.push(wq, payload).await.unwrap();
        store.push("queue:foo", b"other").await.unwrap();

        let unit = unit(&store, payload);
        unit.acknowledge().await.unwrap();

        assert_eq!(store.list_len(wq).await.unwrap(), 1);
        // source queue unaffected
        assert_eq!(store.list_len("queue:foo").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_double_acknowledge_is_a_noop() {
        let store: Arc<dyn ListStore> = Arc::new(MemoryStore::new());
        let payload = br#"{"class":"Bob"}"#;
        let wq = "working:queue:foo:testhost-100-deadbeef";
        store.push(wq, payload).await.unwrap();

        let unit = unit(&store, payload);
        unit.acknowledge().await.unwrap();
        unit.acknowledge().await.unwrap();
        assert_eq!(store.list_len(wq).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_requeue_round_trip_leaves_bytes_unchanged() {
        let store: Arc<dyn ListStore> = Arc::new(MemoryStore::new());
        let payload = br#"{"class":"Bob","jid":55,"interrupted_count":1}"#;
        let wq = "working:queue:foo:testhost-100-deadbeef";
        store.push(wq, payload).await.unwrap();

        let unit = unit(&store, payload);
        unit.requeue().await.unwrap();

        assert_eq!(store.list_len(wq).await.unwrap(), 0);
        assert_eq!(store.list_len("queue:foo").await.unwrap(), 1);
        // explicit requeue does not touch the interruption counter
        assert_eq!(
            store.pop("queue:foo").await.unwrap(),
            Some(payload.to_vec())
        );
    }

    #[tokio::test]
    async fn test_job_accessor_decodes_payload() {
        let store: Arc<dyn ListStore> = Arc::new(MemoryStore::new());
        let unit = unit(&store, br#"{"class":"Bob","jid":55}"#);
        let job = unit.job().unwrap();
        assert_eq!(job.class, "Bob");
        assert_eq!(unit.queue_name(), "foo");
    }
}
