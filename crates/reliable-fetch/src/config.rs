use crate::error::{FetchError, Result};
use reliable_fetch_core::DEFAULT_MAX_INTERRUPTIONS;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable overriding the semi-reliable blocking timeout,
/// in seconds.
pub const SEMI_RELIABLE_FETCH_TIMEOUT_ENV: &str = "SEMI_RELIABLE_FETCH_TIMEOUT";

/// Which fetch algorithm a worker process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Atomic source-to-working-queue move; zero crash window.
    Reliable,
    /// Blocking pop followed by a separate working-queue push. A crash
    /// between the two steps loses visibility of the job until it is
    /// re-enqueued by an operator; this window is an accepted trade-off,
    /// not equivalent to [`Strategy::Reliable`].
    SemiReliable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Source queue names to service, in priority order.
    pub queues: Vec<String>,

    /// Strict priority (configured order always wins) vs round-robin
    /// rotation of the starting queue.
    pub strict: bool,

    pub strategy: Strategy,

    pub heartbeat_interval_secs: u64,
    pub heartbeat_ttl_secs: u64,

    /// Minimum time between two full orphan-cleanup passes, fleet-wide.
    pub cleanup_interval_secs: u64,

    /// How long the cleanup lease outlives a cleaner that crashed
    /// mid-pass before peers may retry.
    pub lease_ttl_secs: u64,

    pub semi_reliable_timeout_secs: u64,

    /// Pause after a fully-empty reliable pass before returning control
    /// to the caller.
    pub reliable_idle_wait_ms: u64,

    /// Global fallback interruption budget for job types without an
    /// explicit registry entry.
    pub max_interruptions: i64,

    /// Holding list for jobs that exceeded their interruption budget.
    pub interrupted_key: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            queues: Vec::new(),
            strict: false,
            strategy: Strategy::Reliable,
            heartbeat_interval_secs: 10,
            heartbeat_ttl_secs: 60,
            cleanup_interval_secs: 60,
            lease_ttl_secs: 30,
            semi_reliable_timeout_secs: 5,
            reliable_idle_wait_ms: 500,
            max_interruptions: DEFAULT_MAX_INTERRUPTIONS,
            interrupted_key: "reliable-fetch:interrupted".to_string(),
        }
    }
}

impl FetchConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: FetchConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queues.is_empty() {
            return Err(FetchError::Config("queue list is empty".to_string()));
        }
        if self.heartbeat_ttl_secs <= self.heartbeat_interval_secs {
            return Err(FetchError::Config(format!(
                "heartbeat TTL ({}s) must exceed the heartbeat interval ({}s)",
                self.heartbeat_ttl_secs, self.heartbeat_interval_secs
            )));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(FetchError::Config(
                "heartbeat interval must be non-zero".to_string(),
            ));
        }
        if self.lease_ttl_secs == 0 || self.cleanup_interval_secs == 0 {
            return Err(FetchError::Config(
                "cleanup interval and lease TTL must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn heartbeat_ttl(&self) -> Duration {
        Duration::from_secs(self.heartbeat_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }

    /// Semi-reliable blocking timeout; the environment variable wins over
    /// the configured value. Keep this below the store client's read
    /// timeout so the server-side timeout fires first.
    pub fn semi_reliable_timeout(&self) -> Duration {
        let secs = std::env::var(SEMI_RELIABLE_FETCH_TIMEOUT_ENV)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(self.semi_reliable_timeout_secs);
        Duration::from_secs(secs.max(1))
    }

    pub fn reliable_idle_wait(&self) -> Duration {
        Duration::from_millis(self.reliable_idle_wait_ms)
    }
}
