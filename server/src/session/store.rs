//! The key-value backend `Session` is layered over: a thin trait around
//! Redis hash commands (`hset`/`hget`/`hgetall`/`expire`/`del`), plus an
//! in-memory test double. Grounded in the teacher's own pattern of
//! trait-abstracting a storage backend (`RepositoryProvider` in
//! `crates/git-http`) so protocol and builder tests don't need a live
//! Redis.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn hset(&self, key: &str, field: &str, value: String) -> Result<()>;
    async fn hset_many(&self, key: &str, fields: &[(&str, String)]) -> Result<()>;
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<()>;
    async fn del(&self, key: &str) -> Result<()>;
}

/// Redis-backed implementation. Uses `connection-manager` so a single
/// clonable handle survives reconnects, the same choice
/// `other_examples/manifests/dkod-io-dkod-engine` makes.
#[derive(Clone)]
pub struct RedisKvStore {
    conn: ConnectionManager,
}

impl RedisKvStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("invalid redis URL")?;
        let conn = client
            .get_connection_manager()
            .await
            .context("failed to connect to redis")?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn hset(&self, key: &str, field: &str, value: String) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset(key, field, value).await.context("redis HSET failed")?;
        Ok(())
    }

    async fn hset_many(&self, key: &str, fields: &[(&str, String)]) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () =
            conn.hset_multiple(key, fields).await.context("redis HSET (multi) failed")?;
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.hget(key, field).await.context("redis HGET failed")
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        conn.hgetall(key).await.context("redis HGETALL failed")
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () =
            conn.expire(key, ttl_secs as i64).await.context("redis EXPIRE failed")?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await.context("redis DEL failed")?;
        Ok(())
    }
}

#[derive(Default)]
struct InMemoryState {
    hashes: HashMap<String, HashMap<String, String>>,
    expires_at: HashMap<String, Instant>,
}

/// Test double for `KvStore`. Expiry is tracked but never swept in the
/// background; reads simply treat an expired key as absent, which is
/// sufficient for the builder/protocol tests that use it.
pub struct InMemoryKvStore {
    state: Mutex<InMemoryState>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self { state: Mutex::new(InMemoryState::default()) }
    }

    fn is_live(state: &InMemoryState, key: &str) -> bool {
        match state.expires_at.get(key) {
            Some(at) => Instant::now() < *at,
            None => true,
        }
    }
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn hset(&self, key: &str, field: &str, value: String) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.hashes.entry(key.to_string()).or_default().insert(field.to_string(), value);
        Ok(())
    }

    async fn hset_many(&self, key: &str, fields: &[(&str, String)]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let entry = state.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            entry.insert(field.to_string(), value.clone());
        }
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let state = self.state.lock().unwrap();
        if !Self::is_live(&state, key) {
            return Ok(None);
        }
        Ok(state.hashes.get(key).and_then(|h| h.get(field).cloned()))
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let state = self.state.lock().unwrap();
        if !Self::is_live(&state, key) {
            return Ok(HashMap::new());
        }
        Ok(state.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.expires_at.insert(key.to_string(), Instant::now() + Duration::from_secs(ttl_secs));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.hashes.remove(key);
        state.expires_at.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_roundtrips_fields() {
        let kv = InMemoryKvStore::new();
        kv.hset("k", "a", "1".to_string()).await.unwrap();
        kv.hset("k", "b", "2".to_string()).await.unwrap();
        let all = kv.hgetall("k").await.unwrap();
        assert_eq!(all.get("a"), Some(&"1".to_string()));
        assert_eq!(all.get("b"), Some(&"2".to_string()));
    }

    #[tokio::test]
    async fn del_removes_hash() {
        let kv = InMemoryKvStore::new();
        kv.hset("k", "a", "1".to_string()).await.unwrap();
        kv.del("k").await.unwrap();
        assert_eq!(kv.hget("k", "a").await.unwrap(), None);
    }
}
