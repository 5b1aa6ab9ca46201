//! The dispatch loop: event-driven task scheduling, retry-with-backoff,
//! and the three-phase scaffold/generation/integration sequence.
//!
//! Ported in control-flow intent from `generator.py::generate` /
//! `_process_tasks` / `_handle_task_failure` / `_process_single_task`.
//! Dispatch is event-driven rather than wave-barriered: a task starts the
//! instant its dependencies are satisfied, regardless of which level it
//! sits at, using `tokio::task::JoinSet` as the "await first completion"
//! primitive in place of Python's `asyncio.wait(..., FIRST_COMPLETED)`.
//!
//! [`GenerationState`] is mutated only from this loop, never from inside a
//! spawned task: each dispatched task runs the driver call as a pure
//! function over cloned inputs and reports its outcome back for the loop
//! to apply.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::domain::event::Event;
use crate::domain::graph::{CompletedTaskOutput, DependencyGraph};
use crate::domain::state::{GenerationState, GenerationStatus};
use crate::domain::task::Task;
use crate::error::OrchestratorResult;
use crate::ports::driver::{DriverResult, DriverTask, TaskDriver};
use crate::ports::event_sink::EventSink;
use crate::ports::workspace::WorkspaceService;
use crate::services::state_store::StateStore;

/// Tunables the dispatch loop needs; a subset of
/// [`crate::infrastructure::config::OrchestratorConfig`] so tests can
/// construct one without pulling in the figment loader.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_parallel_tasks: usize,
    pub max_consecutive_failures: u32,
    pub tech_stack: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self { max_parallel_tasks: 3, max_consecutive_failures: 5, tech_stack: "nodejs-api".to_string() }
    }
}

pub struct Orchestrator {
    workspace: Arc<dyn WorkspaceService>,
    driver: Arc<dyn TaskDriver>,
    state_store: Arc<StateStore>,
    event_sink: Arc<dyn EventSink>,
    settings: OrchestratorSettings,
}

/// Outcome of one dispatched attempt, reported back to the loop.
struct AttemptOutcome {
    task_id: String,
    retry_count: u32,
    branch: String,
    result: DriverResult,
}

impl Orchestrator {
    pub fn new(
        workspace: Arc<dyn WorkspaceService>,
        driver: Arc<dyn TaskDriver>,
        state_store: Arc<StateStore>,
        event_sink: Arc<dyn EventSink>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self { workspace, driver, state_store, event_sink, settings }
    }

    async fn save_and_emit(&self, state: &GenerationState, event: Event) -> OrchestratorResult<()> {
        self.state_store.save(state).await?;
        if let Err(err) = self.event_sink.emit(event).await {
            tracing::error!(error = %err, "failed to emit event");
        }
        Ok(())
    }

    /// Runs the full scaffold → generation → integration pipeline for a
    /// fresh or resumed project, returning the final state.
    pub async fn generate(&self, project_id: &str, tasks: &[Task]) -> OrchestratorResult<GenerationState> {
        self.generate_resuming(project_id, tasks, false, &HashSet::new()).await
    }

    /// As [`Self::generate`], but allows a caller (typically
    /// [`crate::services::reconciler::Reconciler`]'s output) to skip the
    /// scaffold phase and mark a set of task ids pre-completed.
    pub async fn generate_resuming(
        &self,
        project_id: &str,
        tasks: &[Task],
        skip_scaffold: bool,
        skip_task_ids: &HashSet<String>,
    ) -> OrchestratorResult<GenerationState> {
        let mut state = self
            .state_store
            .load(project_id)
            .await?
            .unwrap_or_else(|| GenerationState::new(project_id, &self.settings.tech_stack, tasks.len()));

        state.start();
        self.save_and_emit(&state, Event::GenerationStarted { project_id: project_id.to_string(), total_tasks: tasks.len() })
            .await?;

        let graph = DependencyGraph::from_tasks(tasks);
        state.total_tasks = graph.len();
        self.save_and_emit(&state, Event::GraphBuilt { project_id: project_id.to_string(), levels: graph.level_count() }).await?;

        if let Err(err) = self.run_phases(&mut state, &graph, tasks, skip_scaffold, skip_task_ids).await {
            state.fail(err.to_string());
            self.save_and_emit(&state, Event::GenerationError { project_id: project_id.to_string(), error: err.to_string() }).await?;
            return Ok(state);
        }

        if state.status != GenerationStatus::Failed {
            state.complete();
            self.save_and_emit(&state, Event::GenerationComplete { project_id: project_id.to_string() }).await?;
        }

        Ok(state)
    }

    async fn run_phases(
        &self,
        state: &mut GenerationState,
        graph: &DependencyGraph,
        tasks: &[Task],
        skip_scaffold: bool,
        skip_task_ids: &HashSet<String>,
    ) -> OrchestratorResult<()> {
        if skip_scaffold {
            self.save_and_emit(state, Event::ScaffoldSkipped { project_id: state.project_id.clone() }).await?;
        } else {
            self.create_repository(state).await?;
            self.run_scaffold(state, tasks).await?;
        }

        state.start_generating();
        for task_id in skip_task_ids {
            if !state.completed_tasks.iter().any(|t| t == task_id) {
                state.completed_tasks.push(task_id.clone());
            }
        }

        self.process_tasks(state, graph).await?;

        if state.status == GenerationStatus::Failed {
            return Ok(());
        }

        state.start_integrating();
        self.save_and_emit(state, Event::IntegrationStarted { project_id: state.project_id.clone() }).await?;
        self.run_integration(state, graph).await?;

        Ok(())
    }

    async fn create_repository(&self, state: &mut GenerationState) -> OrchestratorResult<()> {
        // create_repo's adapter contract is to treat "already exists" as
        // success, matching the HTTP-409-is-fine handling in
        // generator.py::_create_repository.
        self.workspace.create_repo(&state.project_id, &state.repo_name(), &self.settings.tech_stack).await?;
        self.save_and_emit(state, Event::RepoCreated { project_id: state.project_id.clone(), repo_name: state.repo_name() }).await
    }

    async fn run_scaffold(&self, state: &mut GenerationState, tasks: &[Task]) -> OrchestratorResult<()> {
        let summaries: Vec<String> = tasks
            .iter()
            .take(20)
            .map(|t| {
                let mut summary: String = t.description.chars().take(100).collect();
                if let Some(details) = &t.implementation_details {
                    let truncated: String = details.chars().take(50).collect();
                    summary.push_str(&format!(" ({truncated}...)"));
                }
                summary
            })
            .collect();

        let scaffold_task = DriverTask {
            project_id: state.project_id.clone(),
            task_id: "scaffold".to_string(),
            branch: state.main_branch.clone(),
            description: format!("Scaffold a {} project: {}", self.settings.tech_stack, summaries.join("; ")),
            implementation_details: None,
            context: crate::domain::graph::TaskContext::default(),
            retry_count: 0,
        };

        let result = self.driver.run(scaffold_task).await;
        if !result.success {
            state.fail(format!("scaffold failed: {}", result.error));
            self.save_and_emit(state, Event::ScaffoldFailed { project_id: state.project_id.clone(), error: result.error.clone() }).await?;
            return Err(crate::error::OrchestratorError::CollaboratorFailed {
                collaborator: "scaffold",
                message: result.error,
            });
        }

        self.save_and_emit(state, Event::ScaffoldComplete { project_id: state.project_id.clone() }).await
    }

    /// The event-driven dispatch loop. Mirrors `_process_tasks`: maintains
    /// `completed`/`in_progress`/`retry_counts`/`completed_results`,
    /// dispatches everything ready up to `max_parallel_tasks`, and after
    /// every batch of completions dispatches whatever became newly ready.
    async fn process_tasks(&self, state: &mut GenerationState, graph: &DependencyGraph) -> OrchestratorResult<()> {
        let mut completed: HashSet<String> = state.completed_tasks.iter().cloned().collect();
        let mut in_progress: HashSet<String> = HashSet::new();
        let mut retry_counts: HashMap<String, u32> = HashMap::new();
        let mut completed_results: HashMap<String, CompletedTaskOutput> = HashMap::new();

        let mut pending: JoinSet<AttemptOutcome> = JoinSet::new();

        self.dispatch_ready(state, graph, &mut completed, &mut in_progress, &completed_results, &mut pending, 0).await?;

        if pending.is_empty() && !graph.is_empty() {
            tracing::error!(project_id = %state.project_id, "no tasks ready to process - check dependency graph");
            state.fail("no tasks could be processed - dependency issue");
            return Ok(());
        }

        while let Some(joined) = pending.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(join_err) => {
                    tracing::error!(error = %join_err, "dispatched task panicked");
                    continue;
                }
            };

            in_progress.remove(&outcome.task_id);

            if outcome.result.success {
                completed.insert(outcome.task_id.clone());
                retry_counts.remove(&outcome.task_id);

                let mut files = outcome.result.files_created.clone();
                files.extend(outcome.result.files_modified.clone());
                completed_results.insert(outcome.task_id.clone(), CompletedTaskOutput { files: files.clone(), code: None });

                state.complete_task(&outcome.task_id, &outcome.branch);
                self.save_and_emit(
                    state,
                    Event::TaskComplete { project_id: state.project_id.clone(), task_id: outcome.task_id.clone(), files },
                )
                .await?;
                self.save_and_emit(
                    state,
                    Event::TaskMerged {
                        project_id: state.project_id.clone(),
                        task_id: outcome.task_id.clone(),
                        commit_sha: String::new(),
                        conflicts_resolved: 0,
                    },
                )
                .await?;
            } else {
                state.fail_task(&outcome.task_id, outcome.result.error.clone());
                self.save_and_emit(
                    state,
                    Event::TaskFailed { project_id: state.project_id.clone(), task_id: outcome.task_id.clone(), error: outcome.result.error.clone() },
                )
                .await?;
                self.handle_task_failure(state, graph, &outcome.task_id, &mut retry_counts, &mut in_progress, &completed_results, &mut pending)
                    .await?;
            }

            self.dispatch_ready(state, graph, &mut completed, &mut in_progress, &completed_results, &mut pending, 0).await?;

            let total_handled = completed.len() + state.blocked_tasks.len();
            if total_handled >= graph.len() && pending.is_empty() {
                break;
            }
        }

        let blocked_count = state.blocked_tasks.len();
        if blocked_count > 0 {
            tracing::warn!(project_id = %state.project_id, blocked_count, "generation complete with blocked tasks");
            state.fail(format!("{blocked_count} tasks could not be completed"));
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn dispatch_ready(
        &self,
        state: &mut GenerationState,
        graph: &DependencyGraph,
        completed: &mut HashSet<String>,
        in_progress: &mut HashSet<String>,
        completed_results: &HashMap<String, CompletedTaskOutput>,
        pending: &mut JoinSet<AttemptOutcome>,
        retry_count: u32,
    ) -> OrchestratorResult<()> {
        let available_slots = self.settings.max_parallel_tasks.saturating_sub(in_progress.len());
        if available_slots == 0 {
            return Ok(());
        }

        let ready: Vec<String> = graph
            .ready_tasks(completed)
            .into_iter()
            .filter(|node| !in_progress.contains(&node.id) && !state.blocked_tasks.contains(&node.id))
            .take(available_slots)
            .map(|node| node.id.clone())
            .collect();

        for task_id in ready {
            let Some(node) = graph.get(&task_id) else { continue };
            let branch = branch_name(&task_id, retry_count);
            let context = graph.context_for_task(&task_id, completed_results).unwrap_or_default();

            in_progress.insert(task_id.clone());
            state.start_task(&task_id, &branch);
            self.save_and_emit(
                state,
                Event::TaskStarted { project_id: state.project_id.clone(), task_id: task_id.clone(), branch: branch.clone() },
            )
            .await?;

            let driver_task = DriverTask {
                project_id: state.project_id.clone(),
                task_id: task_id.clone(),
                branch: branch.clone(),
                description: node.description.clone(),
                implementation_details: node.implementation_details.clone(),
                context,
                retry_count,
            };
            let driver = Arc::clone(&self.driver);

            pending.spawn(async move {
                let result = driver.run(driver_task).await;
                AttemptOutcome { task_id, retry_count, branch, result }
            });
        }
        Ok(())
    }

    /// Increments the retry counter; blocks the task after
    /// `max_consecutive_failures` attempts, otherwise schedules a delayed
    /// retry with `min(5 * 2^(n-1), 30)` second backoff.
    async fn handle_task_failure(
        &self,
        state: &mut GenerationState,
        graph: &DependencyGraph,
        task_id: &str,
        retry_counts: &mut HashMap<String, u32>,
        in_progress: &mut HashSet<String>,
        completed_results: &HashMap<String, CompletedTaskOutput>,
        pending: &mut JoinSet<AttemptOutcome>,
    ) -> OrchestratorResult<()> {
        let retry_count = retry_counts.entry(task_id.to_string()).and_modify(|n| *n += 1).or_insert(1);
        let retry_count = *retry_count;

        if retry_count >= self.settings.max_consecutive_failures {
            tracing::error!(project_id = %state.project_id, task_id, retry_count, "task exceeded failure budget, blocking");
            state.block_task(task_id.to_string());
            self.save_and_emit(state, Event::TaskBlocked { project_id: state.project_id.clone(), task_id: task_id.to_string() }).await?;
            return Ok(());
        }

        let backoff_secs = (5u64.saturating_mul(1u64 << (retry_count - 1))).min(30);
        self.save_and_emit(
            state,
            Event::TaskRetryScheduled { project_id: state.project_id.clone(), task_id: task_id.to_string(), attempt: retry_count, backoff_secs },
        )
        .await?;

        let Some(node) = graph.get(task_id) else { return Ok(()) };
        let branch = branch_name(task_id, retry_count);
        let context = graph.context_for_task(task_id, completed_results).unwrap_or_default();
        let driver_task = DriverTask {
            project_id: state.project_id.clone(),
            task_id: task_id.to_string(),
            branch: branch.clone(),
            description: node.description.clone(),
            implementation_details: node.implementation_details.clone(),
            context,
            retry_count,
        };
        let driver = Arc::clone(&self.driver);
        let task_id_owned = task_id.to_string();

        in_progress.insert(task_id.to_string());
        state.start_task(task_id, &branch);
        self.save_and_emit(
            state,
            Event::TaskStarted { project_id: state.project_id.clone(), task_id: task_id.to_string(), branch: branch.clone() },
        )
        .await?;

        pending.spawn(async move {
            tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
            let result = driver.run(driver_task).await;
            AttemptOutcome { task_id: task_id_owned, retry_count, branch, result }
        });

        Ok(())
    }

    async fn run_integration(&self, state: &mut GenerationState, graph: &DependencyGraph) -> OrchestratorResult<()> {
        let completed_descriptions: Vec<String> = state
            .completed_tasks
            .iter()
            .filter_map(|id| graph.get(id))
            .map(|n| n.description.clone())
            .collect();

        let integration_task = DriverTask {
            project_id: state.project_id.clone(),
            task_id: "integration".to_string(),
            branch: state.main_branch.clone(),
            description: format!("Integrate {} completed tasks", completed_descriptions.len()),
            implementation_details: None,
            context: crate::domain::graph::TaskContext::default(),
            retry_count: 0,
        };

        let result = self.driver.run(integration_task).await;
        if result.success {
            self.save_and_emit(state, Event::IntegrationComplete { project_id: state.project_id.clone() }).await
        } else {
            self.save_and_emit(state, Event::IntegrationWarning { project_id: state.project_id.clone(), message: result.error }).await
        }
    }
}

/// First attempt: `task/<id8>`. Retry n: `task/<id8>-r<n>` — the suffix is
/// essential to avoid git ref collisions between attempts.
fn branch_name(task_id: &str, retry_count: u32) -> String {
    let short: String = task_id.chars().take(8).collect();
    if retry_count > 0 {
        format!("task/{short}-r{retry_count}")
    } else {
        format!("task/{short}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory_kv_store::MemoryKeyValueStore;
    use crate::ports::event_sink::NullEventSink;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct FakeWorkspace;

    #[async_trait]
    impl WorkspaceService for FakeWorkspace {
        async fn create_repo(&self, _project_id: &str, _repo_name: &str, _tech_stack: &str) -> OrchestratorResult<()> {
            Ok(())
        }
        async fn repo_exists(&self, _project_id: &str) -> OrchestratorResult<bool> {
            Ok(true)
        }
        async fn list_files(&self, _project_id: &str, _branch: &str, _path: &str, _pattern: &str) -> OrchestratorResult<Vec<String>> {
            Ok(vec!["Cargo.toml".to_string()])
        }
        async fn read_file(&self, _project_id: &str, _branch: &str, _path: &str) -> OrchestratorResult<String> {
            Ok(String::new())
        }
        async fn write_file(&self, _project_id: &str, _branch: &str, _path: &str, _content: &str) -> OrchestratorResult<()> {
            Ok(())
        }
        async fn grep(&self, _project_id: &str, _branch: &str, _pattern: &str) -> OrchestratorResult<Vec<String>> {
            Ok(vec![])
        }
        async fn commit(&self, _project_id: &str, _branch: &str, _message: &str) -> OrchestratorResult<String> {
            Ok("deadbeef".to_string())
        }
        async fn update_from_main(&self, _project_id: &str, _branch: &str) -> OrchestratorResult<crate::ports::workspace::UpdateFromMainResult> {
            Ok(crate::ports::workspace::UpdateFromMainResult { has_conflicts: false, conflicted_files: vec![] })
        }
        async fn merge(&self, _project_id: &str, branch: &str, _target: &str, _message: &str) -> OrchestratorResult<crate::ports::workspace::MergeToMainResult> {
            Ok(crate::ports::workspace::MergeToMainResult { ok: true, commit_sha: format!("deadbeef-{branch}"), error: String::new() })
        }
    }

    /// Always succeeds, recording which task ids it was asked to run.
    struct AlwaysSucceedsDriver {
        calls: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl TaskDriver for AlwaysSucceedsDriver {
        async fn run(&self, task: DriverTask) -> DriverResult {
            self.calls.lock().unwrap().push(task.task_id.clone());
            DriverResult { success: true, files_created: vec![format!("{}.rs", task.task_id)], files_modified: vec![], error: String::new(), iterations: 1 }
        }
    }

    /// Fails every task a fixed number of times, then succeeds.
    struct FlakyDriver {
        fail_until: u32,
        attempts: StdMutex<HashMap<String, u32>>,
    }

    #[async_trait]
    impl TaskDriver for FlakyDriver {
        async fn run(&self, task: DriverTask) -> DriverResult {
            if task.task_id == "scaffold" || task.task_id == "integration" {
                return DriverResult { success: true, ..Default::default() };
            }
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(task.task_id.clone()).and_modify(|n| *n += 1).or_insert(1);
            if *count <= self.fail_until {
                DriverResult { success: false, error: "flaky failure".to_string(), ..Default::default() }
            } else {
                DriverResult { success: true, files_created: vec![format!("{}.rs", task.task_id)], ..Default::default() }
            }
        }
    }

    fn orchestrator(driver: Arc<dyn TaskDriver>) -> Orchestrator {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let state_store = Arc::new(StateStore::new(kv, Duration::from_secs(86_400 * 7)));
        Orchestrator::new(Arc::new(FakeWorkspace), driver, state_store, Arc::new(NullEventSink), OrchestratorSettings::default())
    }

    #[tokio::test]
    async fn happy_path_completes_all_tasks() {
        let driver = Arc::new(AlwaysSucceedsDriver { calls: StdMutex::new(Vec::new()) });
        let orch = orchestrator(driver);

        let tasks = vec![Task::new("a", "build a"), Task::new("b", "build b").depends_on("a")];
        let state = orch.generate("proj-happy", &tasks).await.unwrap();

        assert_eq!(state.status, GenerationStatus::Complete);
        assert_eq!(state.completed_tasks.len(), 2);
        assert!(state.failed_tasks.is_empty());
    }

    #[tokio::test]
    async fn diamond_dependency_dispatches_fan_out_tasks_concurrently() {
        let driver = Arc::new(AlwaysSucceedsDriver { calls: StdMutex::new(Vec::new()) });
        let orch = orchestrator(driver.clone());

        let tasks = vec![
            Task::new("a", "root"),
            Task::new("b", "left").depends_on("a"),
            Task::new("c", "right").depends_on("a"),
            Task::new("d", "join").depends_on("b").depends_on("c"),
        ];
        let state = orch.generate("proj-diamond", &tasks).await.unwrap();

        assert_eq!(state.status, GenerationStatus::Complete);
        assert_eq!(state.completed_tasks.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn flaky_task_retries_then_succeeds() {
        let driver = Arc::new(FlakyDriver { fail_until: 2, attempts: StdMutex::new(HashMap::new()) });
        let orch = orchestrator(driver);

        let tasks = vec![Task::new("a", "flaky")];
        let state = orch.generate("proj-flaky", &tasks).await.unwrap();

        assert_eq!(state.status, GenerationStatus::Complete);
        assert_eq!(state.completed_tasks, vec!["a".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn permanently_failing_task_gets_blocked_and_generation_fails() {
        let driver = Arc::new(FlakyDriver { fail_until: 999, attempts: StdMutex::new(HashMap::new()) });
        let orch = orchestrator(driver);

        let tasks = vec![Task::new("a", "always fails")];
        let state = orch.generate("proj-blocked", &tasks).await.unwrap();

        assert_eq!(state.status, GenerationStatus::Failed);
        assert_eq!(state.blocked_tasks, vec!["a".to_string()]);
    }

    #[test]
    fn branch_name_uses_short_id_and_retry_suffix() {
        assert_eq!(branch_name("abcdefgh12345", 0), "task/abcdefgh");
        assert_eq!(branch_name("abcdefgh12345", 2), "task/abcdefgh-r2");
    }
}
