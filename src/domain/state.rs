//! Generation state: the persisted record of one code-generation run.
//!
//! Ported from `state.py::GenerationState`/`GenerationStatus`. Mutated only
//! by the orchestrator's single dispatch-loop task; the `StateStore`
//! facade in [`crate::services::state_store`] is what actually persists it
//! between runs.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `PENDING → INITIALIZING → GENERATING → INTEGRATING → COMPLETE`, with a
/// `FAILED`/`CANCELLED` escape from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Pending,
    Initializing,
    Generating,
    Integrating,
    Complete,
    Failed,
    Cancelled,
}

impl GenerationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Persisted state for a code generation run; stored with a 7-day TTL by
/// [`crate::services::state_store::StateStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationState {
    pub project_id: String,
    pub status: GenerationStatus,
    pub tech_stack: String,
    pub generation_id: String,
    #[serde(default)]
    pub repo_url: String,

    pub total_tasks: usize,
    #[serde(default)]
    pub completed_tasks: Vec<String>,
    #[serde(default)]
    pub current_tasks: Vec<String>,
    #[serde(default)]
    pub failed_tasks: HashMap<String, String>,
    #[serde(default)]
    pub blocked_tasks: Vec<String>,

    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default = "default_main_branch")]
    pub main_branch: String,
    #[serde(default)]
    pub active_branches: Vec<String>,

    pub last_error: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub additional_retries: u32,
}

fn default_main_branch() -> String {
    "main".to_string()
}

fn default_max_retries() -> u32 {
    3
}

impl GenerationState {
    pub fn new(project_id: impl Into<String>, tech_stack: impl Into<String>, total_tasks: usize) -> Self {
        Self {
            project_id: project_id.into(),
            status: GenerationStatus::Pending,
            tech_stack: tech_stack.into(),
            generation_id: short_id(),
            repo_url: String::new(),
            total_tasks,
            completed_tasks: Vec::new(),
            current_tasks: Vec::new(),
            failed_tasks: HashMap::new(),
            blocked_tasks: Vec::new(),
            started_at: None,
            updated_at: None,
            completed_at: None,
            main_branch: default_main_branch(),
            active_branches: Vec::new(),
            last_error: None,
            retry_count: 0,
            max_retries: default_max_retries(),
            additional_retries: 0,
        }
    }

    /// Versioned repository name: multiple generation attempts for one
    /// project can coexist, so the repo is keyed by both ids.
    pub fn repo_name(&self) -> String {
        format!("{}-{}", self.project_id, self.generation_id)
    }

    pub fn progress_percent(&self) -> f64 {
        if self.total_tasks == 0 {
            return 0.0;
        }
        (self.completed_tasks.len() as f64 / self.total_tasks as f64) * 100.0
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries + self.additional_retries
    }

    fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }

    pub fn start(&mut self) {
        self.status = GenerationStatus::Initializing;
        let now = Utc::now();
        self.started_at = Some(now);
        self.updated_at = Some(now);
    }

    pub fn start_generating(&mut self) {
        self.status = GenerationStatus::Generating;
        self.touch();
    }

    pub fn start_integrating(&mut self) {
        self.status = GenerationStatus::Integrating;
        self.touch();
    }

    pub fn complete(&mut self) {
        self.status = GenerationStatus::Complete;
        let now = Utc::now();
        self.completed_at = Some(now);
        self.updated_at = Some(now);
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = GenerationStatus::Failed;
        self.last_error = Some(error.into());
        self.touch();
    }

    pub fn cancel(&mut self) {
        self.status = GenerationStatus::Cancelled;
        self.touch();
    }

    pub fn start_task(&mut self, task_id: impl Into<String>, branch: impl Into<String>) {
        let task_id = task_id.into();
        let branch = branch.into();
        if !self.current_tasks.contains(&task_id) {
            self.current_tasks.push(task_id);
        }
        if !self.active_branches.contains(&branch) {
            self.active_branches.push(branch);
        }
        self.touch();
    }

    pub fn complete_task(&mut self, task_id: &str, branch: &str) {
        self.current_tasks.retain(|t| t != task_id);
        if !self.completed_tasks.iter().any(|t| t == task_id) {
            self.completed_tasks.push(task_id.to_string());
        }
        self.active_branches.retain(|b| b != branch);
        self.touch();
    }

    pub fn fail_task(&mut self, task_id: &str, error: impl Into<String>) {
        self.current_tasks.retain(|t| t != task_id);
        self.failed_tasks.insert(task_id.to_string(), error.into());
        self.retry_count += 1;
        self.touch();
    }

    pub fn block_task(&mut self, task_id: impl Into<String>) {
        let task_id = task_id.into();
        if !self.blocked_tasks.contains(&task_id) {
            self.blocked_tasks.push(task_id);
        }
        self.touch();
    }

    pub fn add_retries(&mut self, count: u32) {
        self.additional_retries += count;
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_percent_is_zero_with_no_tasks() {
        let state = GenerationState::new("proj", "nodejs-api", 0);
        assert_eq!(state.progress_percent(), 0.0);
    }

    #[test]
    fn progress_percent_tracks_completed_tasks() {
        let mut state = GenerationState::new("proj", "nodejs-api", 4);
        state.complete_task("a", "task/aaaaaaaa");
        assert_eq!(state.progress_percent(), 25.0);
    }

    #[test]
    fn can_retry_accounts_for_additional_retries() {
        let mut state = GenerationState::new("proj", "nodejs-api", 1);
        state.retry_count = 3;
        assert!(!state.can_retry());
        state.add_retries(3);
        assert!(state.can_retry());
    }

    #[test]
    fn start_task_then_complete_task_clears_branch() {
        let mut state = GenerationState::new("proj", "nodejs-api", 1);
        state.start_task("t1", "task/aaaaaaaa");
        assert_eq!(state.current_tasks, vec!["t1".to_string()]);
        assert_eq!(state.active_branches, vec!["task/aaaaaaaa".to_string()]);

        state.complete_task("t1", "task/aaaaaaaa");
        assert!(state.current_tasks.is_empty());
        assert!(state.active_branches.is_empty());
        assert_eq!(state.completed_tasks, vec!["t1".to_string()]);
    }

    #[test]
    fn fail_task_increments_retry_count() {
        let mut state = GenerationState::new("proj", "nodejs-api", 1);
        state.start_task("t1", "task/aaaaaaaa");
        state.fail_task("t1", "boom");
        assert_eq!(state.retry_count, 1);
        assert_eq!(state.failed_tasks.get("t1"), Some(&"boom".to_string()));
        assert!(state.current_tasks.is_empty());
    }

    #[test]
    fn repo_name_combines_project_and_generation_id() {
        let state = GenerationState::new("proj", "nodejs-api", 1);
        assert!(state.repo_name().starts_with("proj-"));
        assert_eq!(state.repo_name().len(), "proj-".len() + 8);
    }
}
