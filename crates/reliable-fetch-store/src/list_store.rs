use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Port over the key/value store operations the fetch layer consumes.
///
/// Lists are FIFO: `push` adds at the head, `pop` and `pop_and_push`
/// remove from the tail. The fetch strategies, cleanup scanner and
/// heartbeat publisher depend only on this trait, never on a concrete
/// backend client.
#[async_trait]
pub trait ListStore: Send + Sync {
    /// Push one value onto the head of a list.
    async fn push(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Push a batch of values onto the head of a list.
    async fn push_many(&self, key: &str, values: &[Vec<u8>]) -> Result<()>;

    /// Pop one value from the tail of a list.
    async fn pop(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Atomically move the tail of `source` onto the head of `dest`.
    async fn pop_and_push(&self, source: &str, dest: &str) -> Result<Option<Vec<u8>>>;

    /// Block until one of `keys` is non-empty or the timeout elapses,
    /// then pop from the tail of the first non-empty list. Returns the
    /// key the value came from.
    async fn blocking_pop(
        &self,
        keys: &[String],
        timeout: Duration,
    ) -> Result<Option<(String, Vec<u8>)>>;

    /// Remove at most one entry matching `value` from a list; returns the
    /// number of entries removed.
    async fn remove(&self, key: &str, value: &[u8]) -> Result<u64>;

    /// Length of a list (0 for a missing key).
    async fn list_len(&self, key: &str) -> Result<u64>;

    /// Atomically rename a key. Returns `false` when the source key does
    /// not exist (e.g. a concurrent claimant got there first).
    async fn rename(&self, from: &str, to: &str) -> Result<bool>;

    /// Set a string key with an expiry.
    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Set a string key with an expiry only if it does not already exist.
    /// Returns whether the key was set.
    async fn set_if_absent_with_ttl(&self, key: &str, value: &[u8], ttl: Duration)
        -> Result<bool>;

    /// Whether a key currently exists (expired keys count as absent).
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Delete a key of any type.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Enumerate keys matching a glob pattern.
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>>;
}
