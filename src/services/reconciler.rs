//! Reconciles persisted state with workspace reality so a generation can
//! resume after a crash instead of trusting in-memory state blindly.
//!
//! Ported from `reconciler.py::GenerationReconciler`. The known limitation
//! documented there carries over unchanged: "merged" task ids come from the
//! `StateStore`, not from inspecting git history — a more sophisticated
//! approach would grep the git log, but that needs workspace-service
//! endpoints this crate's `WorkspaceService` port does not expose.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::domain::graph::DependencyGraph;
use crate::domain::reconcile::{ReconciliationResult, ResumeFrom};
use crate::domain::state::GenerationState;
use crate::domain::task::Task;
use crate::error::OrchestratorResult;
use crate::ports::workspace::WorkspaceService;
use crate::services::state_store::StateStore;

pub struct Reconciler {
    workspace: Arc<dyn WorkspaceService>,
    state_store: Arc<StateStore>,
    scaffold_markers: Vec<String>,
}

impl Reconciler {
    pub fn new(workspace: Arc<dyn WorkspaceService>, state_store: Arc<StateStore>, scaffold_markers: Vec<String>) -> Self {
        Self { workspace, state_store, scaffold_markers }
    }

    pub async fn reconcile(&self, project_id: &str, tasks: &[Task]) -> OrchestratorResult<ReconciliationResult> {
        let task_ids: BTreeSet<String> = tasks.iter().map(|t| t.id.clone()).collect();
        tracing::info!(project_id, task_count = task_ids.len(), "reconciling project state");

        let repo_exists = self.workspace.repo_exists(project_id).await.unwrap_or(false);
        if !repo_exists {
            tracing::info!(project_id, "repo does not exist, starting from scratch");
            return Ok(ReconciliationResult {
                repo_exists: false,
                scaffold_complete: false,
                completed_task_ids: BTreeSet::new(),
                pending_task_ids: tasks.iter().map(|t| t.id.clone()).collect(),
                failed_task_ids: BTreeSet::new(),
                blocked_task_ids: BTreeSet::new(),
                can_resume: true,
                resume_from: ResumeFrom::Scaffold,
            });
        }

        let scaffold_complete = self.check_scaffold_exists(project_id).await;
        let merged_task_ids = self.merged_task_ids(project_id).await?;
        let completed: BTreeSet<String> = merged_task_ids.intersection(&task_ids).cloned().collect();
        tracing::info!(project_id, completed = completed.len(), "found completed tasks in persisted state");

        let graph = DependencyGraph::from_tasks(tasks);

        let mut pending = Vec::new();
        let mut blocked = BTreeSet::new();
        for task in tasks {
            if completed.contains(&task.id) {
                continue;
            }
            // Matches the original reconciler: dependency satisfaction is
            // checked against the raw depends_on list, not filtered to
            // dependencies present in this graph.
            let deps = graph.get(&task.id).map(|n| n.depends_on.clone()).unwrap_or_default();
            let deps_met = deps.iter().all(|d| completed.contains(d));
            if deps_met {
                pending.push(task.id.clone());
            } else {
                blocked.insert(task.id.clone());
            }
        }

        let state = self.state_store.load(project_id).await?;
        let mut failed = BTreeSet::new();
        if let Some(state) = &state {
            if !state.failed_tasks.is_empty() {
                failed = state.failed_tasks.keys().cloned().collect::<BTreeSet<_>>().difference(&completed).cloned().collect();
                pending.retain(|t| !failed.contains(t));
            }
        }

        let resume_from = if !scaffold_complete {
            ResumeFrom::Scaffold
        } else if !pending.is_empty() || !failed.is_empty() || !blocked.is_empty() {
            ResumeFrom::Generating
        } else {
            ResumeFrom::Integration
        };

        let can_resume =
            !pending.is_empty() || !failed.is_empty() || !scaffold_complete || matches!(resume_from, ResumeFrom::Integration);

        let result = ReconciliationResult {
            repo_exists: true,
            scaffold_complete,
            completed_task_ids: completed,
            pending_task_ids: pending,
            failed_task_ids: failed,
            blocked_task_ids: blocked,
            can_resume,
            resume_from,
        };

        tracing::info!(
            project_id,
            completed = result.completed_task_ids.len(),
            pending = result.pending_task_ids.len(),
            failed = result.failed_task_ids.len(),
            blocked = result.blocked_task_ids.len(),
            "reconciliation complete"
        );

        Ok(result)
    }

    async fn check_scaffold_exists(&self, project_id: &str) -> bool {
        let Ok(files) = self.workspace.list_files(project_id, "main", ".", "*").await else {
            return false;
        };
        files.iter().any(|f| {
            let name = f.rsplit('/').next().unwrap_or(f);
            self.scaffold_markers.iter().any(|m| m == name)
        })
    }

    /// Best-effort: trusts the persisted state's `completed_tasks` list as
    /// the source of truth, per the documented limitation above.
    async fn merged_task_ids(&self, project_id: &str) -> OrchestratorResult<BTreeSet<String>> {
        let state = self.state_store.load(project_id).await?;
        Ok(state.map(|s| s.completed_tasks.into_iter().collect()).unwrap_or_default())
    }

    /// Recomputes persisted state from a fresh reconciliation: useful when
    /// state has drifted out of sync with the workspace.
    pub async fn repair_state(&self, project_id: &str, tasks: &[Task]) -> OrchestratorResult<GenerationState> {
        let result = self.reconcile(project_id, tasks).await?;

        let mut state = self
            .state_store
            .load(project_id)
            .await?
            .unwrap_or_else(|| GenerationState::new(project_id, "unknown", tasks.len()));

        state.completed_tasks = result.completed_task_ids.iter().cloned().collect();
        state.total_tasks = tasks.len();
        state.failed_tasks.retain(|k, _| !result.completed_task_ids.contains(k));
        state.blocked_tasks = result.blocked_task_ids.iter().cloned().collect();

        self.state_store.save(&state).await?;
        tracing::info!(project_id, completed = state.completed_tasks.len(), "repaired state");
        Ok(state)
    }
}
