//! Workspace service port: the only way the core ever touches a repository.
//!
//! One Non-goal of this crate is reading or writing files itself — every
//! filesystem and git operation goes through this trait, implemented by an
//! HTTP adapter in the production binary and by in-memory fakes in tests.

use async_trait::async_trait;

use crate::error::OrchestratorResult;

/// Outcome of asking the workspace service to update a branch from main.
#[derive(Debug, Clone)]
pub struct UpdateFromMainResult {
    pub has_conflicts: bool,
    pub conflicted_files: Vec<String>,
}

/// Outcome of asking the workspace service to merge a branch into main.
#[derive(Debug, Clone)]
pub struct MergeToMainResult {
    pub ok: bool,
    pub commit_sha: String,
    pub error: String,
}

#[async_trait]
pub trait WorkspaceService: Send + Sync {
    /// Creates the repository backing `project_id`. Implementations should
    /// treat "already exists" (HTTP 409 in the reference adapter) as
    /// success, per `generator.py::_create_repository`.
    async fn create_repo(&self, project_id: &str, repo_name: &str, tech_stack: &str) -> OrchestratorResult<()>;

    /// Whether `project_id`'s repository exists at all (any branch).
    async fn repo_exists(&self, project_id: &str) -> OrchestratorResult<bool>;

    /// Lists file names under `path` matching `pattern` on `branch`.
    async fn list_files(&self, project_id: &str, branch: &str, path: &str, pattern: &str) -> OrchestratorResult<Vec<String>>;

    async fn read_file(&self, project_id: &str, branch: &str, path: &str) -> OrchestratorResult<String>;

    async fn write_file(&self, project_id: &str, branch: &str, path: &str, content: &str) -> OrchestratorResult<()>;

    /// Searches file contents on `branch`, returning matching paths.
    async fn grep(&self, project_id: &str, branch: &str, pattern: &str) -> OrchestratorResult<Vec<String>>;

    async fn commit(&self, project_id: &str, branch: &str, message: &str) -> OrchestratorResult<String>;

    async fn update_from_main(&self, project_id: &str, branch: &str) -> OrchestratorResult<UpdateFromMainResult>;

    /// Merges `branch` into `target` (normally `main`) with the given
    /// merge-commit message, `style: merge` (never squash or rebase — the
    /// workspace service must preserve per-task commit history).
    async fn merge(&self, project_id: &str, branch: &str, target: &str, message: &str) -> OrchestratorResult<MergeToMainResult>;
}
