//! Per-project merge serializer: the critical section every task's branch
//! passes through before landing on main.
//!
//! Ported from `merge_agent.py::MergeAgent._process_merge`. The per-project
//! lock table grows without eviction, same as the original's class-level
//! `_locks` dict — an accepted limitation rather than a bug, since projects
//! are expected to be finite and long-lived within a process.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::domain::merge::{looks_like_merge_race, MergeRequest, MergeResult};
use crate::ports::conflict::{ConflictResolver, FixAgent};
use crate::ports::runner::RunnerService;
use crate::ports::workspace::WorkspaceService;

/// Times to retry the full update/resolve/merge cycle when the merge step
/// itself reports a conflict (main moved while we were testing).
const MAX_MERGE_RETRY_ATTEMPTS: u32 = 3;

pub struct MergeSerializer {
    workspace: Arc<dyn WorkspaceService>,
    runner: Arc<dyn RunnerService>,
    conflict_resolver: Arc<dyn ConflictResolver>,
    fix_agent: Arc<dyn FixAgent>,
    max_conflict_resolution_attempts: u32,
    max_test_fix_attempts: u32,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MergeSerializer {
    pub fn new(
        workspace: Arc<dyn WorkspaceService>,
        runner: Arc<dyn RunnerService>,
        conflict_resolver: Arc<dyn ConflictResolver>,
        fix_agent: Arc<dyn FixAgent>,
        max_conflict_resolution_attempts: u32,
        max_test_fix_attempts: u32,
    ) -> Self {
        Self {
            workspace,
            runner,
            conflict_resolver,
            fix_agent,
            max_conflict_resolution_attempts,
            max_test_fix_attempts,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn project_lock(&self, project_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(project_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Serializes merges for `request.project_id`: only one merge per
    /// project runs at a time, other projects proceed concurrently.
    pub async fn request_merge(&self, request: MergeRequest) -> MergeResult {
        let lock = self.project_lock(&request.project_id).await;
        let _guard = lock.lock().await;
        tracing::info!(project_id = %request.project_id, branch = %request.branch, "acquired merge lock");
        self.process_merge(&request).await
    }

    async fn process_merge(&self, request: &MergeRequest) -> MergeResult {
        let mut conflicts_resolved = 0u32;
        let is_fast_path = request.is_new_files_only();

        for attempt in 0..MAX_MERGE_RETRY_ATTEMPTS {
            let mut had_conflicts = false;

            if is_fast_path && attempt == 0 {
                tracing::info!(branch = %request.branch, "fast path: skipping update from main (new files only)");
            } else {
                let update = match self.workspace.update_from_main(&request.project_id, &request.branch).await {
                    Ok(update) => update,
                    Err(err) => return MergeResult::failure(&request.branch, format!("failed to update from main: {err}")),
                };

                if update.has_conflicts {
                    had_conflicts = true;
                    let resolved = self.resolve_conflicts(request, &update.conflicted_files).await;
                    match resolved {
                        Ok(count) => conflicts_resolved += count,
                        Err(error) => return MergeResult::failure(&request.branch, error),
                    }
                }
            }

            if had_conflicts {
                tracing::info!(branch = %request.branch, "running tests after conflict resolution");
                let test_command = self.runner.test_command(&request.tech_stack).to_string();
                let run_id = match self.runner.submit_run(&request.project_id, &request.branch, &test_command).await {
                    Ok(id) => id,
                    Err(err) => return MergeResult::failure(&request.branch, format!("failed to submit test run: {err}")),
                };
                let outcome = match self.runner.poll_run(&run_id).await {
                    Ok(outcome) => outcome,
                    Err(err) => return MergeResult::failure(&request.branch, format!("failed to poll test run: {err}")),
                };

                if !outcome.passed {
                    tracing::info!(branch = %request.branch, "tests failed after merge, attempting fixes");
                    if let Err(error) = self.fix_test_failures(request, &outcome.output).await {
                        return MergeResult::failure(&request.branch, format!("tests failed after merge: {error}"));
                    }
                }
            } else {
                tracing::info!(branch = %request.branch, "skipping tests (clean merge, no conflicts)");
            }

            let merge = match self
                .workspace
                .merge(&request.project_id, &request.branch, "main", &format!("Merge {}: {}", request.task_id, request.task_description))
                .await
            {
                Ok(merge) => merge,
                Err(err) => return MergeResult::failure(&request.branch, format!("failed to merge to main: {err}")),
            };

            if merge.ok {
                tracing::info!(branch = %request.branch, "merged to main");
                return MergeResult::success(&request.branch, merge.commit_sha, conflicts_resolved, had_conflicts);
            }

            if looks_like_merge_race(&merge.error) && attempt + 1 < MAX_MERGE_RETRY_ATTEMPTS {
                tracing::warn!(branch = %request.branch, attempt, "merge to main raced with another writer, retrying");
                continue;
            }

            return MergeResult::failure(&request.branch, format!("failed to merge: {}", merge.error));
        }

        MergeResult::failure(&request.branch, format!("failed to merge after {MAX_MERGE_RETRY_ATTEMPTS} attempts"))
    }

    async fn resolve_conflicts(&self, request: &MergeRequest, conflicted_files: &[String]) -> Result<u32, String> {
        for attempt in 0..self.max_conflict_resolution_attempts {
            let mut contents = HashMap::new();
            for path in conflicted_files {
                match self.workspace.read_file(&request.project_id, &request.branch, path).await {
                    Ok(content) => {
                        contents.insert(path.clone(), content);
                    }
                    Err(err) => return Err(format!("failed to read conflicted file {path}: {err}")),
                }
            }

            let resolved = match self.conflict_resolver.resolve(&request.task_description, &contents).await {
                Ok(resolved) => resolved,
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "conflict resolution attempt failed");
                    continue;
                }
            };

            if conflicted_files.iter().all(|f| resolved.contains_key(f)) {
                for (path, content) in &resolved {
                    if let Err(err) = self.workspace.write_file(&request.project_id, &request.branch, path, content).await {
                        return Err(format!("failed to write resolved file {path}: {err}"));
                    }
                }
                let message = format!("Resolve merge conflicts: {}", request.task_description);
                if let Err(err) = self.workspace.commit(&request.project_id, &request.branch, &message).await {
                    return Err(format!("failed to commit conflict resolution: {err}"));
                }
                return Ok(conflicted_files.len() as u32);
            }
        }

        Err("failed to resolve merge conflicts during update from main".to_string())
    }

    async fn fix_test_failures(&self, request: &MergeRequest, initial_output: &str) -> Result<(), String> {
        let mut test_output = initial_output.to_string();

        for attempt in 0..self.max_test_fix_attempts {
            let mut files = HashMap::new();
            for path in request.files_created.iter().chain(request.files_modified.iter()) {
                if let Ok(content) = self.workspace.read_file(&request.project_id, &request.branch, path).await {
                    files.insert(path.clone(), content);
                }
            }

            let fixes = match self.fix_agent.fix(&test_output, &files).await {
                Ok(fixes) => fixes,
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "fix attempt failed");
                    continue;
                }
            };

            for (path, content) in &fixes {
                if let Err(err) = self.workspace.write_file(&request.project_id, &request.branch, path, content).await {
                    return Err(format!("failed to write fix for {path}: {err}"));
                }
            }
            let message = format!("Fix test failures: {}", request.task_description);
            if let Err(err) = self.workspace.commit(&request.project_id, &request.branch, &message).await {
                return Err(format!("failed to commit fix: {err}"));
            }

            let test_command = self.runner.test_command(&request.tech_stack).to_string();
            let run_id = self
                .runner
                .submit_run(&request.project_id, &request.branch, &test_command)
                .await
                .map_err(|e| e.to_string())?;
            let outcome = self.runner.poll_run(&run_id).await.map_err(|e| e.to_string())?;
            if outcome.passed {
                return Ok(());
            }
            test_output = outcome.output;
        }

        Err(test_output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CleanWorkspace;

    #[async_trait]
    impl WorkspaceService for CleanWorkspace {
        async fn create_repo(&self, _p: &str, _r: &str, _t: &str) -> crate::error::OrchestratorResult<()> {
            Ok(())
        }
        async fn repo_exists(&self, _p: &str) -> crate::error::OrchestratorResult<bool> {
            Ok(true)
        }
        async fn list_files(&self, _p: &str, _b: &str, _path: &str, _pattern: &str) -> crate::error::OrchestratorResult<Vec<String>> {
            Ok(vec![])
        }
        async fn read_file(&self, _p: &str, _b: &str, _path: &str) -> crate::error::OrchestratorResult<String> {
            Ok(String::new())
        }
        async fn write_file(&self, _p: &str, _b: &str, _path: &str, _content: &str) -> crate::error::OrchestratorResult<()> {
            Ok(())
        }
        async fn grep(&self, _p: &str, _b: &str, _pattern: &str) -> crate::error::OrchestratorResult<Vec<String>> {
            Ok(vec![])
        }
        async fn commit(&self, _p: &str, _b: &str, _m: &str) -> crate::error::OrchestratorResult<String> {
            Ok("sha123".to_string())
        }
        async fn update_from_main(&self, _p: &str, _b: &str) -> crate::error::OrchestratorResult<crate::ports::workspace::UpdateFromMainResult> {
            Ok(crate::ports::workspace::UpdateFromMainResult { has_conflicts: false, conflicted_files: vec![] })
        }
        async fn merge(&self, _p: &str, _b: &str, _t: &str, _m: &str) -> crate::error::OrchestratorResult<crate::ports::workspace::MergeToMainResult> {
            Ok(crate::ports::workspace::MergeToMainResult { ok: true, commit_sha: "merged123".to_string(), error: String::new() })
        }
    }

    struct NeverCalledRunner;

    #[async_trait]
    impl RunnerService for NeverCalledRunner {
        async fn submit_run(&self, _p: &str, _b: &str, _c: &str) -> crate::error::OrchestratorResult<String> {
            panic!("runner should not be invoked on a clean fast-path merge");
        }
        async fn poll_run(&self, _id: &str) -> crate::error::OrchestratorResult<crate::ports::runner::RunOutcome> {
            panic!("runner should not be invoked on a clean fast-path merge");
        }
    }

    struct NoopConflictResolver;
    #[async_trait]
    impl ConflictResolver for NoopConflictResolver {
        async fn resolve(&self, _d: &str, _f: &HashMap<String, String>) -> crate::error::OrchestratorResult<HashMap<String, String>> {
            Ok(HashMap::new())
        }
    }

    struct NoopFixAgent;
    #[async_trait]
    impl FixAgent for NoopFixAgent {
        async fn fix(&self, _o: &str, _f: &HashMap<String, String>) -> crate::error::OrchestratorResult<HashMap<String, String>> {
            Ok(HashMap::new())
        }
    }

    fn serializer(workspace: Arc<dyn WorkspaceService>, runner: Arc<dyn RunnerService>) -> MergeSerializer {
        MergeSerializer::new(workspace, runner, Arc::new(NoopConflictResolver), Arc::new(NoopFixAgent), 3, 2)
    }

    #[tokio::test]
    async fn fast_path_additive_merge_skips_update_and_tests() {
        let merger = serializer(Arc::new(CleanWorkspace), Arc::new(NeverCalledRunner));
        let mut request = MergeRequest::new("proj", "task/aaaaaaaa", "t1");
        request.files_created.push("src/new.rs".to_string());

        let result = merger.request_merge(request).await;
        assert!(result.ok);
        assert!(!result.tests_rerun);
        assert_eq!(result.conflicts_resolved, 0);
    }

    #[tokio::test]
    async fn non_additive_clean_merge_skips_tests_but_checks_conflicts() {
        let merger = serializer(Arc::new(CleanWorkspace), Arc::new(NeverCalledRunner));
        let mut request = MergeRequest::new("proj", "task/aaaaaaaa", "t1");
        request.files_modified.push("src/existing.rs".to_string());

        let result = merger.request_merge(request).await;
        assert!(result.ok);
        assert!(!result.tests_rerun);
    }

    struct ConflictingThenCleanWorkspace {
        conflict_calls: AtomicU32,
    }

    #[async_trait]
    impl WorkspaceService for ConflictingThenCleanWorkspace {
        async fn create_repo(&self, _p: &str, _r: &str, _t: &str) -> crate::error::OrchestratorResult<()> {
            Ok(())
        }
        async fn repo_exists(&self, _p: &str) -> crate::error::OrchestratorResult<bool> {
            Ok(true)
        }
        async fn list_files(&self, _p: &str, _b: &str, _path: &str, _pattern: &str) -> crate::error::OrchestratorResult<Vec<String>> {
            Ok(vec![])
        }
        async fn read_file(&self, _p: &str, _b: &str, _path: &str) -> crate::error::OrchestratorResult<String> {
            Ok("<<<<<<< HEAD\nours\n=======\ntheirs\n>>>>>>>".to_string())
        }
        async fn write_file(&self, _p: &str, _b: &str, _path: &str, _content: &str) -> crate::error::OrchestratorResult<()> {
            Ok(())
        }
        async fn grep(&self, _p: &str, _b: &str, _pattern: &str) -> crate::error::OrchestratorResult<Vec<String>> {
            Ok(vec![])
        }
        async fn commit(&self, _p: &str, _b: &str, _m: &str) -> crate::error::OrchestratorResult<String> {
            Ok("sha456".to_string())
        }
        async fn update_from_main(&self, _p: &str, _b: &str) -> crate::error::OrchestratorResult<crate::ports::workspace::UpdateFromMainResult> {
            self.conflict_calls.fetch_add(1, Ordering::SeqCst);
            Ok(crate::ports::workspace::UpdateFromMainResult { has_conflicts: true, conflicted_files: vec!["src/a.rs".to_string()] })
        }
        async fn merge(&self, _p: &str, _b: &str, _t: &str, _m: &str) -> crate::error::OrchestratorResult<crate::ports::workspace::MergeToMainResult> {
            Ok(crate::ports::workspace::MergeToMainResult { ok: true, commit_sha: "merged456".to_string(), error: String::new() })
        }
    }

    struct PassingRunner;
    #[async_trait]
    impl RunnerService for PassingRunner {
        async fn submit_run(&self, _p: &str, _b: &str, _c: &str) -> crate::error::OrchestratorResult<String> {
            Ok("run-1".to_string())
        }
        async fn poll_run(&self, _id: &str) -> crate::error::OrchestratorResult<crate::ports::runner::RunOutcome> {
            Ok(crate::ports::runner::RunOutcome { passed: true, output: String::new() })
        }
    }

    struct EchoingConflictResolver;
    #[async_trait]
    impl ConflictResolver for EchoingConflictResolver {
        async fn resolve(&self, _d: &str, files: &HashMap<String, String>) -> crate::error::OrchestratorResult<HashMap<String, String>> {
            Ok(files.keys().map(|k| (k.clone(), "resolved".to_string())).collect())
        }
    }

    #[tokio::test]
    async fn conflicted_merge_resolves_and_reruns_tests() {
        let workspace = Arc::new(ConflictingThenCleanWorkspace { conflict_calls: AtomicU32::new(0) });
        let merger = MergeSerializer::new(workspace, Arc::new(PassingRunner), Arc::new(EchoingConflictResolver), Arc::new(NoopFixAgent), 3, 2);

        let mut request = MergeRequest::new("proj", "task/bbbbbbbb", "t2");
        request.files_modified.push("src/a.rs".to_string());

        let result = merger.request_merge(request).await;
        assert!(result.ok);
        assert!(result.tests_rerun);
        assert_eq!(result.conflicts_resolved, 1);
    }
}
