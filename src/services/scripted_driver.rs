//! Reference [`TaskDriver`] implementation that replays a scripted sequence
//! of outcomes instead of calling out to a language model.
//!
//! Used by this crate's own integration tests and by the demo binary, in
//! place of a real driver (which would own calling an LM, a runner, and a
//! [`crate::services::merge_serializer::MergeSerializer`], per spec §4.5 —
//! all of which sit outside this crate's Non-goals).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::ports::driver::{DriverResult, DriverTask, TaskDriver};

/// One scripted response to a single driver invocation.
#[derive(Debug, Clone)]
pub struct ScriptedOutcome {
    pub success: bool,
    pub files_created: Vec<String>,
    pub files_modified: Vec<String>,
    pub error: String,
}

impl ScriptedOutcome {
    pub fn success(files_created: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            success: true,
            files_created: files_created.into_iter().map(Into::into).collect(),
            files_modified: Vec::new(),
            error: String::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self { success: false, files_created: Vec::new(), files_modified: Vec::new(), error: error.into() }
    }
}

/// Replays a per-task queue of [`ScriptedOutcome`]s, one per invocation;
/// a task with an exhausted queue keeps returning its last outcome.
pub struct ScriptedDriver {
    scripts: Mutex<HashMap<String, Vec<ScriptedOutcome>>>,
    default_outcome: ScriptedOutcome,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self { scripts: Mutex::new(HashMap::new()), default_outcome: ScriptedOutcome::success(Vec::<String>::new()) }
    }

    /// Queues outcomes for `task_id`, in the order they'll be returned
    /// across successive invocations (e.g. a failure then a success to
    /// script a single retry-then-succeed task).
    pub fn script(&self, task_id: impl Into<String>, outcomes: impl IntoIterator<Item = ScriptedOutcome>) {
        self.scripts.lock().unwrap().insert(task_id.into(), outcomes.into_iter().collect());
    }
}

impl Default for ScriptedDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskDriver for ScriptedDriver {
    async fn run(&self, task: DriverTask) -> DriverResult {
        let mut scripts = self.scripts.lock().unwrap();
        let outcome = match scripts.get_mut(&task.task_id) {
            Some(queue) if queue.len() > 1 => queue.remove(0),
            Some(queue) if queue.len() == 1 => queue[0].clone(),
            _ => self.default_outcome.clone(),
        };

        DriverResult {
            success: outcome.success,
            files_created: outcome.files_created,
            files_modified: outcome.files_modified,
            error: outcome.error,
            iterations: 1,
        }
    }
}
