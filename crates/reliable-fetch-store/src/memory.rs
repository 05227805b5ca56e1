use crate::{ListStore, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

const BLOCKING_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Default)]
struct Inner {
    lists: HashMap<String, VecDeque<Vec<u8>>>,
    strings: HashMap<String, StringEntry>,
}

struct StringEntry {
    #[allow(dead_code)]
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StringEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// In-process adapter for the [`ListStore`] port.
///
/// Backs tests and local development: single-process, deterministic, TTLs
/// driven by the tokio clock so paused-time tests can advance expiry
/// without sleeping wall-clock time.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn purge_expired(inner: &mut Inner) {
        let now = Instant::now();
        inner.strings.retain(|_, entry| !entry.is_expired(now));
    }
}

#[async_trait]
impl ListStore for MemoryStore {
    async fn push(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        inner
            .lists
            .entry(key.to_string())
            .or_default()
            .push_front(value.to_vec());
        Ok(())
    }

    async fn push_many(&self, key: &str, values: &[Vec<u8>]) -> Result<()> {
        let mut inner = self.inner.lock();
        let list = inner.lists.entry(key.to_string()).or_default();
        for value in values {
            list.push_front(value.clone());
        }
        Ok(())
    }

    async fn pop(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut inner = self.inner.lock();
        let value = inner.lists.get_mut(key).and_then(|l| l.pop_back());
        if matches!(inner.lists.get(key), Some(l) if l.is_empty()) {
            inner.lists.remove(key);
        }
        Ok(value)
    }

    async fn pop_and_push(&self, source: &str, dest: &str) -> Result<Option<Vec<u8>>> {
        let mut inner = self.inner.lock();
        let value = inner.lists.get_mut(source).and_then(|l| l.pop_back());
        if matches!(inner.lists.get(source), Some(l) if l.is_empty()) {
            inner.lists.remove(source);
        }
        if let Some(value) = &value {
            inner
                .lists
                .entry(dest.to_string())
                .or_default()
                .push_front(value.clone());
        }
        Ok(value)
    }

    async fn blocking_pop(
        &self,
        keys: &[String],
        timeout: Duration,
    ) -> Result<Option<(String, Vec<u8>)>> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut inner = self.inner.lock();
                for key in keys {
                    if let Some(value) = inner.lists.get_mut(key).and_then(|l| l.pop_back()) {
                        if matches!(inner.lists.get(key), Some(l) if l.is_empty()) {
                            inner.lists.remove(key);
                        }
                        return Ok(Some((key.clone(), value)));
                    }
                }
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(BLOCKING_POLL_INTERVAL).await;
        }
    }

    async fn remove(&self, key: &str, value: &[u8]) -> Result<u64> {
        let mut inner = self.inner.lock();
        let Some(list) = inner.lists.get_mut(key) else {
            return Ok(0);
        };
        let before = list.len();
        if let Some(pos) = list.iter().position(|v| v == value) {
            list.remove(pos);
        }
        let removed = (before - list.len()) as u64;
        if list.is_empty() {
            inner.lists.remove(key);
        }
        Ok(removed)
    }

    async fn list_len(&self, key: &str) -> Result<u64> {
        let inner = self.inner.lock();
        Ok(inner.lists.get(key).map(|l| l.len() as u64).unwrap_or(0))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<bool> {
        let mut inner = self.inner.lock();
        match inner.lists.remove(from) {
            Some(list) => {
                inner.lists.insert(to.to_string(), list);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.strings.insert(
            key.to_string(),
            StringEntry {
                value: value.to_vec(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool> {
        let mut inner = self.inner.lock();
        Self::purge_expired(&mut inner);
        if inner.strings.contains_key(key) {
            return Ok(false);
        }
        inner.strings.insert(
            key.to_string(),
            StringEntry {
                value: value.to_vec(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut inner = self.inner.lock();
        Self::purge_expired(&mut inner);
        Ok(inner.strings.contains_key(key) || inner.lists.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.strings.remove(key);
        inner.lists.remove(key);
        Ok(())
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut inner = self.inner.lock();
        Self::purge_expired(&mut inner);
        let mut keys: Vec<String> = inner
            .lists
            .keys()
            .chain(inner.strings.keys())
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// Minimal glob matcher: `*` matches any run of characters.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let mut pos = 0;
    if !text.starts_with(parts[0]) {
        return false;
    }
    pos += parts[0].len();

    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match text[pos..].find(part) {
            Some(offset) => pos += offset + part.len(),
            None => return false,
        }
    }

    let last = parts[parts.len() - 1];
    last.is_empty() || text[pos..].ends_with(last)
}
