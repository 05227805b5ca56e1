use crate::{ListStore, Result, StoreError};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tracing::debug;

/// Redis adapter for the [`ListStore`] port.
///
/// Non-blocking commands share one multiplexed connection; blocking pops
/// open a dedicated connection per call so they never stall commands
/// issued by other tasks. Keep the client read timeout above the blocking
/// timeout passed to [`ListStore::blocking_pop`], otherwise the client
/// side races the server-side timeout.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    conn: MultiplexedConnection,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        debug!(url, "connected to redis");
        Ok(RedisStore { client, conn })
    }
}

#[async_trait]
impl ListStore for RedisStore {
    async fn push(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("LPUSH")
            .arg(key)
            .arg(value)
            .query_async::<_, i64>(&mut conn)
            .await?;
        Ok(())
    }

    async fn push_many(&self, key: &str, values: &[Vec<u8>]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("LPUSH");
        cmd.arg(key);
        for value in values {
            cmd.arg(value.as_slice());
        }
        cmd.query_async::<_, i64>(&mut conn).await?;
        Ok(())
    }

    async fn pop(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = redis::cmd("RPOP")
            .arg(key)
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn pop_and_push(&self, source: &str, dest: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = redis::cmd("RPOPLPUSH")
            .arg(source)
            .arg(dest)
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn blocking_pop(
        &self,
        keys: &[String],
        timeout: Duration,
    ) -> Result<Option<(String, Vec<u8>)>> {
        // Dedicated connection; BRPOP would block the shared one.
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let mut cmd = redis::cmd("BRPOP");
        for key in keys {
            cmd.arg(key);
        }
        cmd.arg(timeout.as_secs_f64());
        let value: Option<(String, Vec<u8>)> = cmd.query_async(&mut conn).await?;
        Ok(value)
    }

    async fn remove(&self, key: &str, value: &[u8]) -> Result<u64> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("LREM")
            .arg(key)
            .arg(1)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(removed as u64)
    }

    async fn list_len(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let len: i64 = redis::cmd("LLEN").arg(key).query_async(&mut conn).await?;
        Ok(len as u64)
    }

    async fn rename(&self, from: &str, to: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        match redis::cmd("RENAME")
            .arg(from)
            .arg(to)
            .query_async::<_, ()>(&mut conn)
            .await
        {
            Ok(()) => Ok(true),
            // Source vanished between scan and rename; benign race.
            Err(e) if e.to_string().contains("no such key") => Ok(false),
            Err(e) => Err(StoreError::Redis(e)),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let n: i64 = redis::cmd("EXISTS").arg(key).query_async(&mut conn).await?;
        Ok(n > 0)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, i64>(&mut conn)
            .await?;
        Ok(())
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(keys)
    }
}
