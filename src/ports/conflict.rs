//! Ports the merge serializer delegates its two LM-backed steps to, kept
//! free of prompt text: resolution and fix-generation logic belongs to a
//! collaborator, not the serializer. Grounded in
//! `merge_agent.py::_resolve_conflicts` and `_fix_test_failures`.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::OrchestratorResult;

/// Resolves a set of conflicted files given their current (conflict-marker)
/// content and a description of the task that produced them.
#[async_trait]
pub trait ConflictResolver: Send + Sync {
    /// Returns the resolved content for each file it could fix. A file
    /// missing from the result is treated as unresolved this attempt.
    async fn resolve(
        &self,
        task_description: &str,
        conflicted_files: &HashMap<String, String>,
    ) -> OrchestratorResult<HashMap<String, String>>;
}

/// Rewrites files to fix a failing test run.
#[async_trait]
pub trait FixAgent: Send + Sync {
    /// Returns rewritten content for each file it chose to touch, parsed
    /// from a `FILE: <path>` + fenced-block protocol response, per
    /// `merge_agent.py::_parse_file_fixes`.
    async fn fix(&self, test_output: &str, files: &HashMap<String, String>) -> OrchestratorResult<HashMap<String, String>>;
}
