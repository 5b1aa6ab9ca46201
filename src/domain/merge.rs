//! Domain types for the per-project merge serializer.
//!
//! Ported from `merge_agent.py::MergeRequest`/`MergeResult`.

use serde::{Deserialize, Serialize};

/// A request to merge one task's branch into the project's main branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequest {
    pub project_id: String,
    pub branch: String,
    pub task_id: String,
    pub task_description: String,
    #[serde(default = "default_tech_stack")]
    pub tech_stack: String,
    #[serde(default)]
    pub files_created: Vec<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
}

fn default_tech_stack() -> String {
    "nodejs-api".to_string()
}

impl MergeRequest {
    pub fn new(project_id: impl Into<String>, branch: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            branch: branch.into(),
            task_id: task_id.into(),
            task_description: String::new(),
            tech_stack: default_tech_stack(),
            files_created: Vec::new(),
            files_modified: Vec::new(),
        }
    }

    /// The additive-only fast path applies when a task only creates new
    /// files and never touches an existing one.
    pub fn is_new_files_only(&self) -> bool {
        !self.files_created.is_empty() && self.files_modified.is_empty()
    }
}

/// Outcome of a merge attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeResult {
    pub ok: bool,
    pub branch: String,
    #[serde(default)]
    pub commit_sha: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub conflicts_resolved: u32,
    #[serde(default)]
    pub tests_rerun: bool,
}

impl MergeResult {
    pub fn success(branch: impl Into<String>, commit_sha: impl Into<String>, conflicts_resolved: u32, tests_rerun: bool) -> Self {
        Self {
            ok: true,
            branch: branch.into(),
            commit_sha: commit_sha.into(),
            error: String::new(),
            conflicts_resolved,
            tests_rerun,
        }
    }

    pub fn failure(branch: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            branch: branch.into(),
            commit_sha: String::new(),
            error: error.into(),
            conflicts_resolved: 0,
            tests_rerun: false,
        }
    }
}

/// Substrings that mark a merge-to-main failure as a transient race rather
/// than a fatal error worth giving up on immediately, ported verbatim from
/// `merge_agent.py::_process_merge`'s error-message sniffing.
pub const MERGE_RACE_MARKERS: &[&str] = &["conflict", "not mergeable", "405", "diverged", "out of date"];

pub fn looks_like_merge_race(error: &str) -> bool {
    let lower = error.to_lowercase();
    MERGE_RACE_MARKERS.iter().any(|marker| lower.contains(marker))
}
