//! Event sink port: best-effort delivery of structured events to an
//! external consumer (UI, audit log).
//!
//! Callers never propagate a sink error; see
//! [`crate::services::orchestrator`] and
//! [`crate::services::merge_serializer`] for the swallow-and-log pattern.

use async_trait::async_trait;

use crate::domain::Event;

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: Event) -> anyhow::Result<()>;
}

/// Sink that discards every event; useful in tests that only assert on
/// return values.
#[derive(Debug, Default)]
pub struct NullEventSink;

#[async_trait]
impl EventSink for NullEventSink {
    async fn emit(&self, _event: Event) -> anyhow::Result<()> {
        Ok(())
    }
}
