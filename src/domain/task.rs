//! Task and TaskNode domain models.
//!
//! A [`Task`] is the caller-supplied unit of work; a [`TaskNode`] is the
//! graph-internal view built by [`crate::domain::graph::DependencyGraph`],
//! augmented with reverse edges and a computed level.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A unit of code-generation work, as supplied by the caller of `generate`.
///
/// `depends_on` ids that are not present in the current task set are
/// treated as satisfied externally: the graph only ever considers
/// dependencies it can see.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub implementation_details: Option<String>,
    #[serde(default)]
    pub story_points: Option<u32>,
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
    #[serde(default)]
    pub story_id: Option<String>,
    #[serde(default)]
    pub epic_id: Option<String>,
    /// Derived at graph-construction time; any value supplied here is
    /// overwritten by [`crate::domain::graph::extract_keywords`].
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            implementation_details: None,
            story_points: None,
            depends_on: BTreeSet::new(),
            story_id: None,
            epic_id: None,
            keywords: Vec::new(),
        }
    }

    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.depends_on.insert(id.into());
        self
    }

    pub fn with_story_points(mut self, points: u32) -> Self {
        self.story_points = Some(points);
        self
    }

    pub fn with_implementation_details(mut self, details: impl Into<String>) -> Self {
        self.implementation_details = Some(details.into());
        self
    }
}

/// Graph-internal view of a [`Task`], with reverse edges and a computed
/// execution level.
///
/// Invariant: for every edge `a -> b` in the owning graph, `a.level <
/// b.level`, unless the graph contains a cycle through `{a, b}`, in which
/// case both land on the same cycle-break level.
#[derive(Debug, Clone)]
pub struct TaskNode {
    pub id: String,
    pub description: String,
    pub implementation_details: Option<String>,
    pub story_points: Option<u32>,
    pub depends_on: BTreeSet<String>,
    pub dependents: BTreeSet<String>,
    pub keywords: Vec<String>,
    pub level: usize,
}

impl TaskNode {
    pub(crate) fn from_task(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            description: task.description.clone(),
            implementation_details: task.implementation_details.clone(),
            story_points: task.story_points,
            depends_on: task.depends_on.clone(),
            dependents: BTreeSet::new(),
            keywords: task.keywords.clone(),
            level: 0,
        }
    }

    /// Whether every dependency that is actually present in the owning
    /// graph is contained in `completed`. Dependencies dangling outside the
    /// graph are ignored — treated as satisfied externally.
    pub fn is_ready(&self, completed: &std::collections::HashSet<String>, in_graph: impl Fn(&str) -> bool) -> bool {
        self.depends_on
            .iter()
            .filter(|d| in_graph(d))
            .all(|d| completed.contains(d))
    }
}
