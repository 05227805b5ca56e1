use once_cell::sync::Lazy;
use std::fmt;
use uuid::Uuid;

/// Prefix for per-worker working queues.
pub const WORKING_QUEUE_PREFIX: &str = "working";

/// Prefix for source queue keys.
pub const QUEUE_PREFIX: &str = "queue";

/// Prefix for worker heartbeat keys.
pub const HEARTBEAT_PREFIX: &str = "reliable-fetch:heartbeat";

static PROCESS_IDENTITY: Lazy<WorkerIdentity> = Lazy::new(WorkerIdentity::generate);

/// Unique identity of one running worker process.
///
/// Composed from hostname, pid and a random nonce so two processes on the
/// same host (or a recycled pid) never collide. Names both the working
/// queues and the heartbeat key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerIdentity(String);

impl WorkerIdentity {
    /// Generate a fresh identity. Prefer [`WorkerIdentity::for_process`]
    /// outside of tests.
    pub fn generate() -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        let pid = std::process::id();
        let nonce = Uuid::new_v4().simple().to_string();

        WorkerIdentity(format!("{}-{}-{}", host, pid, &nonce[..8]))
    }

    /// The identity of this process, generated once and stable for the
    /// process lifetime.
    pub fn for_process() -> &'static WorkerIdentity {
        &PROCESS_IDENTITY
    }

    /// Wrap an existing identity string (used by the cleanup scanner and
    /// by tests simulating several processes).
    pub fn from_string(s: impl Into<String>) -> Self {
        WorkerIdentity(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Store key of a source queue.
pub fn queue_key(queue: &str) -> String {
    format!("{}:{}", QUEUE_PREFIX, queue)
}

/// Store key of the working queue for `(queue, identity)`.
pub fn working_queue_key(queue: &str, identity: &WorkerIdentity) -> String {
    format!("{}:{}:{}", WORKING_QUEUE_PREFIX, queue_key(queue), identity)
}

/// Scan pattern matching every working queue derived from `queue`.
pub fn working_queue_pattern(queue: &str) -> String {
    format!("{}:{}:*", WORKING_QUEUE_PREFIX, queue_key(queue))
}

/// Store key of the heartbeat marker for `identity`.
pub fn heartbeat_key(identity: &WorkerIdentity) -> String {
    format!("{}:{}", HEARTBEAT_PREFIX, identity)
}

/// Parse the worker identity embedded in a working-queue key.
///
/// Returns `None` for keys that do not match the current naming pattern;
/// the cleanup scanner skips those instead of erroring so old or foreign
/// key formats never break a scan.
pub fn identity_from_key(queue: &str, key: &str) -> Option<WorkerIdentity> {
    let prefix = format!("{}:{}:", WORKING_QUEUE_PREFIX, queue_key(queue));
    let identity = key.strip_prefix(&prefix)?;

    // hostname-pid-nonce; hostnames may themselves contain dashes.
    let mut parts = identity.rsplitn(3, '-');
    let nonce = parts.next()?;
    let pid = parts.next()?;
    let host = parts.next()?;

    if host.is_empty() || pid.parse::<u32>().is_err() {
        return None;
    }
    if nonce.is_empty() || !nonce.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    Some(WorkerIdentity(identity.to_string()))
}
