//! TaskAgentDriver contract: the orchestrator's only dependency for
//! actually generating code. It is deliberately opaque — the core does not
//! know or care whether the driver calls an LM, a scripted fixture, or a
//! human in the loop.

use async_trait::async_trait;

use crate::domain::graph::TaskContext;

/// Everything the driver needs to attempt one task.
#[derive(Debug, Clone)]
pub struct DriverTask {
    pub project_id: String,
    pub task_id: String,
    pub branch: String,
    pub description: String,
    pub implementation_details: Option<String>,
    pub context: TaskContext,
    /// `0` on first attempt, incremented on each retry.
    pub retry_count: u32,
}

/// Outcome of one driver attempt. A driver never returns an `Err`: failure
/// is represented by `success: false` plus `error`, since a failed attempt
/// is expected, retryable orchestrator-level behavior, not an exceptional
/// condition.
#[derive(Debug, Clone, Default)]
pub struct DriverResult {
    pub success: bool,
    pub files_created: Vec<String>,
    pub files_modified: Vec<String>,
    pub error: String,
    pub iterations: u32,
}

#[async_trait]
pub trait TaskDriver: Send + Sync {
    async fn run(&self, task: DriverTask) -> DriverResult;
}
