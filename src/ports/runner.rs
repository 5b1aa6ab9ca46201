//! Test-runner service port.

use async_trait::async_trait;

use crate::error::OrchestratorResult;

/// Status union returned by the runner, mirroring `_run_tests`'s polling
/// loop in `merge_agent.py`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Passed,
    Failed,
    Completed,
    Error,
    Timeout,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub passed: bool,
    pub output: String,
}

#[async_trait]
pub trait RunnerService: Send + Sync {
    /// Submits `command` against `branch` and returns a run id to poll.
    async fn submit_run(&self, project_id: &str, branch: &str, command: &str) -> OrchestratorResult<String>;

    /// Polls a submitted run to completion, applying the same 60-attempts
    /// / 5-second-interval bound the original polling loop uses before
    /// giving up with a timeout outcome.
    async fn poll_run(&self, run_id: &str) -> OrchestratorResult<RunOutcome>;

    /// The shell command to run tests for a given tech stack, e.g.
    /// `npm test` for `nodejs-api`, `pytest` for `python-api`.
    fn test_command(&self, tech_stack: &str) -> &'static str {
        match tech_stack {
            "python-api" => "pytest",
            _ => "npm test",
        }
    }
}
