//! Integration coverage for the MergeSerializer's merge-to-main race retry
//! (spec P5 concurrency, error handling §7 "conflict at merge time").

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use abathur_orchestrator::domain::MergeRequest;
use abathur_orchestrator::error::OrchestratorResult;
use abathur_orchestrator::ports::conflict::{ConflictResolver, FixAgent};
use abathur_orchestrator::ports::runner::{RunOutcome, RunnerService};
use abathur_orchestrator::ports::workspace::{MergeToMainResult, UpdateFromMainResult, WorkspaceService};
use abathur_orchestrator::services::MergeSerializer;
use async_trait::async_trait;

/// Reports the branch as out-of-date with main on the first merge attempt,
/// then succeeds on the retry.
struct FlakyMergeWorkspace {
    attempts: AtomicU32,
}

#[async_trait]
impl WorkspaceService for FlakyMergeWorkspace {
    async fn create_repo(&self, _p: &str, _r: &str, _t: &str) -> OrchestratorResult<()> {
        Ok(())
    }
    async fn repo_exists(&self, _p: &str) -> OrchestratorResult<bool> {
        Ok(true)
    }
    async fn list_files(&self, _p: &str, _b: &str, _path: &str, _pattern: &str) -> OrchestratorResult<Vec<String>> {
        Ok(vec![])
    }
    async fn read_file(&self, _p: &str, _b: &str, _path: &str) -> OrchestratorResult<String> {
        Ok(String::new())
    }
    async fn write_file(&self, _p: &str, _b: &str, _path: &str, _content: &str) -> OrchestratorResult<()> {
        Ok(())
    }
    async fn grep(&self, _p: &str, _b: &str, _pattern: &str) -> OrchestratorResult<Vec<String>> {
        Ok(vec![])
    }
    async fn commit(&self, _p: &str, _b: &str, _m: &str) -> OrchestratorResult<String> {
        Ok("sha".to_string())
    }
    async fn update_from_main(&self, _p: &str, _b: &str) -> OrchestratorResult<UpdateFromMainResult> {
        Ok(UpdateFromMainResult { has_conflicts: false, conflicted_files: vec![] })
    }
    async fn merge(&self, _p: &str, branch: &str, _t: &str, _m: &str) -> OrchestratorResult<MergeToMainResult> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt == 0 {
            Ok(MergeToMainResult { ok: false, commit_sha: String::new(), error: "branch is out of date with main".to_string() })
        } else {
            Ok(MergeToMainResult { ok: true, commit_sha: format!("sha-{branch}"), error: String::new() })
        }
    }
}

struct UnusedRunner;
#[async_trait]
impl RunnerService for UnusedRunner {
    async fn submit_run(&self, _p: &str, _b: &str, _c: &str) -> OrchestratorResult<String> {
        panic!("no test run expected on a clean fast-path merge");
    }
    async fn poll_run(&self, _id: &str) -> OrchestratorResult<RunOutcome> {
        panic!("no test run expected on a clean fast-path merge");
    }
}

struct UnusedConflictResolver;
#[async_trait]
impl ConflictResolver for UnusedConflictResolver {
    async fn resolve(&self, _d: &str, _f: &HashMap<String, String>) -> OrchestratorResult<HashMap<String, String>> {
        Ok(HashMap::new())
    }
}

struct UnusedFixAgent;
#[async_trait]
impl FixAgent for UnusedFixAgent {
    async fn fix(&self, _o: &str, _f: &HashMap<String, String>) -> OrchestratorResult<HashMap<String, String>> {
        Ok(HashMap::new())
    }
}

#[tokio::test]
async fn merge_to_main_race_triggers_a_full_retry_and_eventually_succeeds() {
    let workspace = Arc::new(FlakyMergeWorkspace { attempts: AtomicU32::new(0) });
    let serializer = MergeSerializer::new(workspace, Arc::new(UnusedRunner), Arc::new(UnusedConflictResolver), Arc::new(UnusedFixAgent), 3, 2);

    let mut request = MergeRequest::new("proj", "task/aaaaaaaa", "t1");
    request.files_created.push("src/new.rs".to_string());

    let result = serializer.request_merge(request).await;
    assert!(result.ok, "expected the retried merge to eventually succeed: {:?}", result.error);
}

/// Two concurrent merges for different projects should both complete
/// without blocking on each other's lock (P5 only serializes per project).
#[tokio::test]
async fn merges_for_different_projects_run_concurrently() {
    let workspace = Arc::new(FlakyMergeWorkspace { attempts: AtomicU32::new(1) });
    let serializer = Arc::new(MergeSerializer::new(workspace, Arc::new(UnusedRunner), Arc::new(UnusedConflictResolver), Arc::new(UnusedFixAgent), 3, 2));

    let mut req_a = MergeRequest::new("proj-a", "task/aaaaaaaa", "t1");
    req_a.files_created.push("src/a.rs".to_string());
    let mut req_b = MergeRequest::new("proj-b", "task/bbbbbbbb", "t2");
    req_b.files_created.push("src/b.rs".to_string());

    let (a, b) = tokio::join!(serializer.request_merge(req_a), serializer.request_merge(req_b));
    assert!(a.ok);
    assert!(b.ok);
}
