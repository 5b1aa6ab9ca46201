//! In-memory `KeyValueStore` backed by `moka`'s TTL cache.
//!
//! Grounded in `adapters/cache/cached_agent_repository.rs`'s use of
//! `moka::future::Cache` for TTL-bounded caching; applied here to the
//! state facade instead of a repository decorator. Per-entry TTL (rather
//! than one TTL for the whole cache) is implemented by storing an expiry
//! alongside the value, since `moka` sets one eviction policy per cache
//! instance.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;

use crate::error::OrchestratorResult;
use crate::ports::kv_store::KeyValueStore;

#[derive(Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

pub struct MemoryKeyValueStore {
    cache: Cache<String, Arc<Entry>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self {
            cache: Cache::builder().max_capacity(10_000).build(),
        }
    }
}

impl Default for MemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> OrchestratorResult<Option<String>> {
        match self.cache.get(key).await {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                self.cache.invalidate(key).await;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> OrchestratorResult<()> {
        let entry = Arc::new(Entry { value, expires_at: Instant::now() + ttl });
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> OrchestratorResult<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn exists(&self, key: &str) -> OrchestratorResult<bool> {
        Ok(self.get(key).await?.is_some())
    }
}
