//! Structured events emitted by the orchestrator and merge serializer.
//!
//! Delivered through the [`crate::ports::event_sink::EventSink`] port;
//! delivery failures are logged and swallowed — the callback is
//! best-effort, never allowed to abort a generation.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    GenerationStarted { project_id: String, total_tasks: usize },
    GraphBuilt { project_id: String, levels: usize },
    RepoCreated { project_id: String, repo_name: String },
    ScaffoldComplete { project_id: String },
    ScaffoldFailed { project_id: String, error: String },
    ScaffoldSkipped { project_id: String },
    TaskStarted { project_id: String, task_id: String, branch: String },
    TaskComplete { project_id: String, task_id: String, files: Vec<String> },
    TaskFailed { project_id: String, task_id: String, error: String },
    TaskRetryScheduled { project_id: String, task_id: String, attempt: u32, backoff_secs: u64 },
    TaskBlocked { project_id: String, task_id: String },
    TaskMerged { project_id: String, task_id: String, commit_sha: String, conflicts_resolved: u32 },
    IntegrationStarted { project_id: String },
    IntegrationComplete { project_id: String },
    IntegrationWarning { project_id: String, message: String },
    GenerationComplete { project_id: String },
    GenerationError { project_id: String, error: String },
    GenerationCancelled { project_id: String },
}
