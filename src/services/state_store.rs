//! `StateStore`: JSON-serializes a [`GenerationState`] into a
//! [`KeyValueStore`], keyed `generation:<project_id>`, with a 7-day TTL.
//!
//! Ported from `state.py::GenerationStateStore`, generalized from a
//! Redis-specific client to the `KeyValueStore` port so tests can back it
//! with [`crate::infrastructure::MemoryKeyValueStore`] and a production
//! binary can back it with Redis-over-HTTP.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::state::GenerationState;
use crate::error::OrchestratorResult;
use crate::ports::kv_store::KeyValueStore;

pub struct StateStore {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl StateStore {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn key(project_id: &str) -> String {
        format!("generation:{project_id}")
    }

    pub async fn save(&self, state: &GenerationState) -> OrchestratorResult<()> {
        let json = serde_json::to_string(state)?;
        self.store.set(&Self::key(&state.project_id), json, self.ttl).await
    }

    pub async fn load(&self, project_id: &str) -> OrchestratorResult<Option<GenerationState>> {
        let Some(raw) = self.store.get(&Self::key(project_id)).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub async fn delete(&self, project_id: &str) -> OrchestratorResult<()> {
        self.store.delete(&Self::key(project_id)).await
    }

    pub async fn exists(&self, project_id: &str) -> OrchestratorResult<bool> {
        self.store.exists(&Self::key(project_id)).await
    }
}
