//! Demo CLI: runs a generation against a task list loaded from a JSON or
//! YAML file, using in-memory stand-ins for every external collaborator.
//!
//! A production deployment would replace [`DemoWorkspace`] and
//! [`abathur_orchestrator::services::ScriptedDriver`] with HTTP-backed
//! adapters implementing [`WorkspaceService`]/[`TaskDriver`] and the state
//! store's [`KeyValueStore`] with a Redis-over-HTTP client; this binary
//! exists to exercise the core end to end without any of that wiring.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use abathur_orchestrator::domain::Task;
use abathur_orchestrator::infrastructure::{ConfigLoader, MemoryKeyValueStore};
use abathur_orchestrator::ports::event_sink::NullEventSink;
use abathur_orchestrator::ports::workspace::{MergeToMainResult, UpdateFromMainResult, WorkspaceService};
use abathur_orchestrator::services::{Orchestrator, OrchestratorSettings, ScriptedDriver, StateStore};
use abathur_orchestrator::OrchestratorResult;
use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "orchestratorctl", about = "Run a code-generation task graph through the orchestrator")]
struct Cli {
    /// Path to a JSON or YAML file containing a list of tasks.
    #[arg(long)]
    tasks: PathBuf,

    /// Project id to generate under.
    #[arg(long, default_value = "demo-project")]
    project_id: String,

    /// Tech stack passed to the scaffold step.
    #[arg(long, default_value = "nodejs-api")]
    tech_stack: String,
}

/// An in-process `WorkspaceService` that accepts every repo/file/merge
/// operation unconditionally, for exercising the dispatch loop without a
/// real workspace backend.
struct DemoWorkspace {
    files: Mutex<HashMap<String, String>>,
}

impl DemoWorkspace {
    fn new() -> Self {
        Self { files: Mutex::new(HashMap::new()) }
    }
}

#[async_trait]
impl WorkspaceService for DemoWorkspace {
    async fn create_repo(&self, _project_id: &str, _repo_name: &str, _tech_stack: &str) -> OrchestratorResult<()> {
        Ok(())
    }

    async fn repo_exists(&self, _project_id: &str) -> OrchestratorResult<bool> {
        Ok(true)
    }

    async fn list_files(&self, _project_id: &str, _branch: &str, _path: &str, _pattern: &str) -> OrchestratorResult<Vec<String>> {
        Ok(self.files.lock().unwrap().keys().cloned().collect())
    }

    async fn read_file(&self, _project_id: &str, _branch: &str, path: &str) -> OrchestratorResult<String> {
        Ok(self.files.lock().unwrap().get(path).cloned().unwrap_or_default())
    }

    async fn write_file(&self, _project_id: &str, _branch: &str, path: &str, content: &str) -> OrchestratorResult<()> {
        self.files.lock().unwrap().insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn grep(&self, _project_id: &str, _branch: &str, _pattern: &str) -> OrchestratorResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn commit(&self, _project_id: &str, _branch: &str, _message: &str) -> OrchestratorResult<String> {
        Ok("demo-commit".to_string())
    }

    async fn update_from_main(&self, _project_id: &str, _branch: &str) -> OrchestratorResult<UpdateFromMainResult> {
        Ok(UpdateFromMainResult { has_conflicts: false, conflicted_files: Vec::new() })
    }

    async fn merge(&self, _project_id: &str, branch: &str, _target: &str, _message: &str) -> OrchestratorResult<MergeToMainResult> {
        Ok(MergeToMainResult { ok: true, commit_sha: format!("demo-merge-{branch}"), error: String::new() })
    }
}

fn load_tasks(path: &PathBuf) -> Result<Vec<Task>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read tasks file {}", path.display()))?;
    let tasks = if path.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::from_str(&raw).context("failed to parse tasks as JSON")?
    } else {
        serde_yaml::from_str(&raw).context("failed to parse tasks as YAML")?
    };
    Ok(tasks)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::load().unwrap_or_default();
    abathur_orchestrator::infrastructure::logging::init(&config);

    let tasks = load_tasks(&cli.tasks)?;
    tracing::info!(count = tasks.len(), "loaded tasks");

    let kv_store = Arc::new(MemoryKeyValueStore::new());
    let state_store = Arc::new(StateStore::new(kv_store, config.state_ttl()));
    let workspace = Arc::new(DemoWorkspace::new());
    let driver = Arc::new(ScriptedDriver::new());
    let settings = OrchestratorSettings {
        max_parallel_tasks: config.max_parallel_tasks,
        max_consecutive_failures: config.max_consecutive_failures,
        tech_stack: cli.tech_stack,
    };

    let orchestrator = Orchestrator::new(workspace, driver, state_store, Arc::new(NullEventSink), settings);
    let state = orchestrator.generate(&cli.project_id, &tasks).await?;

    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}
