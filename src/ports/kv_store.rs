//! Key-value store port backing [`crate::services::state_store::StateStore`].

use async_trait::async_trait;
use std::time::Duration;

use crate::error::OrchestratorResult;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> OrchestratorResult<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> OrchestratorResult<()>;

    async fn delete(&self, key: &str) -> OrchestratorResult<()>;

    async fn exists(&self, key: &str) -> OrchestratorResult<bool>;
}
