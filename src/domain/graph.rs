//! Dependency graph: builds execution levels from a flat task list and
//! answers readiness/context queries during dispatch.
//!
//! Ported from `dependency_graph.py::TaskDependencyGraph`. Cycle handling
//! is a diagnostic, not a hard failure: nodes that never become ready are
//! dumped into the current level so the graph always finishes construction
//! (see `calculate_levels` below).

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::domain::task::{Task, TaskNode};

/// Fixed vocabulary used for keyword-based context bundling. Kept verbatim
/// from the source pipeline rather than re-derived, since the overlap
/// threshold in `context_for_task` is tuned against this exact list.
const TECH_PATTERNS: &[&str] = &[
    "api", "endpoint", "route", "handler", "controller", "model", "schema", "database",
    "migration", "query", "service", "repository", "client", "provider", "component", "view",
    "page", "form", "modal", "test", "spec", "fixture", "mock", "auth", "authentication",
    "authorization", "jwt", "oauth", "event", "command", "aggregate", "projection", "websocket",
    "socket", "stream", "queue", "message", "cache", "redis", "storage", "file", "validation",
    "error", "exception", "logging",
];

/// Extracts keywords from a task's description and implementation details:
/// every matching entry of [`TECH_PATTERNS`] found as a substring, plus up
/// to five `path/like.ext`-shaped tokens.
pub fn extract_keywords(description: &str, implementation_details: Option<&str>) -> Vec<String> {
    let text = format!("{description} {}", implementation_details.unwrap_or(""));
    let text_lower = text.to_lowercase();

    let mut keywords: Vec<String> = TECH_PATTERNS
        .iter()
        .filter(|pattern| text_lower.contains(*pattern))
        .map(|pattern| (*pattern).to_string())
        .collect();

    keywords.extend(file_path_tokens(&text).into_iter().take(5));
    keywords
}

/// Minimal stand-in for `re.findall(r'[\w/]+\.\w+', text)`: a run of word
/// characters and slashes, a literal dot, then a run of word characters.
fn file_path_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let is_word_or_slash = |c: char| c.is_alphanumeric() || c == '_' || c == '/';

    let mut i = 0;
    while i < chars.len() {
        if !is_word_or_slash(chars[i]) {
            i += 1;
            continue;
        }
        let start = i;
        while i < chars.len() && is_word_or_slash(chars[i]) {
            i += 1;
        }
        if i < chars.len() && chars[i] == '.' {
            let dot = i;
            let mut j = dot + 1;
            while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
                j += 1;
            }
            if j > dot + 1 {
                tokens.push(chars[start..j].iter().collect());
                i = j;
                continue;
            }
        }
        // No extension after this run; fall through without re-scanning the
        // same characters as a malformed match.
    }
    tokens
}

/// Context bundled for a task about to be dispatched: its own description
/// plus files/code contributed by completed dependencies and
/// keyword-related completed tasks.
#[derive(Debug, Default, Clone)]
pub struct TaskContext {
    pub description: String,
    pub implementation_details: Option<String>,
    pub related_files: Vec<String>,
    pub related_code: Vec<String>,
}

/// Per-task outcome the graph consults when building context for a
/// not-yet-dispatched task: the files and code a completed task produced.
#[derive(Debug, Default, Clone)]
pub struct CompletedTaskOutput {
    pub files: Vec<String>,
    pub code: Option<String>,
}

/// Immutable, `Arc`-shared DAG over a task set. Construction never fails:
/// a cycle degrades into "remaining nodes dumped at the current level"
/// rather than an error, matching `_calculate_levels`'s behavior.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: HashMap<String, TaskNode>,
    levels: Vec<Vec<String>>,
    execution_order: Vec<String>,
}

impl DependencyGraph {
    /// Builds a graph from a flat task list: create nodes, wire reverse
    /// edges, assign levels, then order each level by story points
    /// (smaller first, ties broken by id) for a reproducible dispatch
    /// order. The input order is threaded through level assignment so two
    /// calls with the same task list always produce the same
    /// `execution_order`, regardless of `HashMap` iteration order.
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut nodes: HashMap<String, TaskNode> = HashMap::new();
        let input_order: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
        for task in tasks {
            let mut node = TaskNode::from_task(task);
            node.keywords = extract_keywords(&task.description, task.implementation_details.as_deref());
            nodes.insert(task.id.clone(), node);
        }

        Self::build_dependents(&mut nodes);
        let levels = Self::calculate_levels(&mut nodes, &input_order);
        let execution_order = Self::topological_sort(&nodes, &levels);

        Self {
            nodes,
            levels,
            execution_order,
        }
    }

    fn build_dependents(nodes: &mut HashMap<String, TaskNode>) {
        let edges: Vec<(String, String)> = nodes
            .values()
            .flat_map(|node| node.depends_on.iter().map(move |dep| (dep.clone(), node.id.clone())))
            .collect();
        for (dep_id, task_id) in edges {
            if let Some(dep_node) = nodes.get_mut(&dep_id) {
                dep_node.dependents.insert(task_id);
            }
        }
    }

    fn deps_in_graph<'a>(node: &'a TaskNode, nodes: &HashMap<String, TaskNode>) -> Vec<&'a String> {
        node.depends_on.iter().filter(|d| nodes.contains_key(*d)).collect()
    }

    /// Level 0 is every task whose in-graph dependencies are empty. Each
    /// subsequent round promotes tasks whose in-graph dependencies are all
    /// already processed. A round that makes no progress means the
    /// remaining nodes form a cycle: they are all dumped at the current
    /// level rather than looping forever, an intentional, non-failing
    /// diagnostic rather than a construction error.
    ///
    /// `order` fixes the scan order within each round to the caller's input
    /// order rather than `HashMap` iteration order, so level contents are
    /// reproducible across runs of the same task list.
    fn calculate_levels(nodes: &mut HashMap<String, TaskNode>, order: &[String]) -> Vec<Vec<String>> {
        let mut processed: HashSet<String> = HashSet::new();
        let mut levels: Vec<Vec<String>> = Vec::new();

        let mut current_level: Vec<String> = Vec::new();
        let ids: &[String] = order;
        for id in ids {
            let no_deps = Self::deps_in_graph(&nodes[id], nodes).is_empty();
            if no_deps {
                nodes.get_mut(id).unwrap().level = 0;
                current_level.push(id.clone());
                processed.insert(id.clone());
            }
        }
        if !current_level.is_empty() {
            levels.push(current_level);
        }

        let max_iterations = nodes.len() + 1;
        let mut iteration = 0;
        while processed.len() < nodes.len() && iteration < max_iterations {
            iteration += 1;
            let level_num = levels.len();
            let mut next_level: Vec<String> = Vec::new();

            for id in ids {
                if processed.contains(id) {
                    continue;
                }
                let deps = Self::deps_in_graph(&nodes[id], nodes);
                if deps.iter().all(|d| processed.contains(*d)) {
                    nodes.get_mut(id).unwrap().level = level_num;
                    next_level.push(id.clone());
                    processed.insert(id.clone());
                }
            }

            if next_level.is_empty() && processed.len() < nodes.len() {
                for id in ids {
                    if !processed.contains(id) {
                        nodes.get_mut(id).unwrap().level = level_num;
                        next_level.push(id.clone());
                        processed.insert(id.clone());
                    }
                }
            }

            if !next_level.is_empty() {
                levels.push(next_level);
            }
        }

        levels
    }

    /// Within each level, orders by story points ascending (smaller first),
    /// ties broken by id so the result is fully deterministic rather than
    /// merely stable-with-respect-to-an-unstable input order.
    fn topological_sort(nodes: &HashMap<String, TaskNode>, levels: &[Vec<String>]) -> Vec<String> {
        let mut order = Vec::new();
        for level in levels {
            let mut sorted_level = level.clone();
            sorted_level.sort_by_key(|id| (nodes[id].story_points.unwrap_or(99), id.clone()));
            order.extend(sorted_level);
        }
        order
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, task_id: &str) -> Option<&TaskNode> {
        self.nodes.get(task_id)
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.nodes.contains_key(task_id)
    }

    pub fn all_task_ids(&self) -> &[String] {
        &self.execution_order
    }

    pub fn tasks_at_level(&self, level: usize) -> Vec<&TaskNode> {
        self.levels
            .get(level)
            .map(|ids| ids.iter().filter_map(|id| self.nodes.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Tasks whose in-graph dependencies are all in `completed` and which
    /// are not themselves already completed, in `execution_order` (level,
    /// then story points, then id) so dispatch always picks the same next
    /// task given the same graph and completed set.
    pub fn ready_tasks(&self, completed: &HashSet<String>) -> Vec<&TaskNode> {
        self.execution_order
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .filter(|node| !completed.contains(&node.id))
            .filter(|node| {
                Self::deps_in_graph(node, &self.nodes)
                    .iter()
                    .all(|d| completed.contains(*d))
            })
            .collect()
    }

    /// Tasks transitively downstream of a failed dependency, found via a
    /// DFS per root guarded by a visited set so cycles cannot recurse
    /// forever.
    pub fn blocked_tasks(&self, failed: &HashSet<String>) -> BTreeSet<String> {
        let mut blocked = BTreeSet::new();

        fn check_blocked(
            task_id: &str,
            nodes: &HashMap<String, TaskNode>,
            failed: &HashSet<String>,
            blocked: &mut BTreeSet<String>,
            checked: &mut HashSet<String>,
        ) -> bool {
            if checked.contains(task_id) {
                return blocked.contains(task_id);
            }
            checked.insert(task_id.to_string());

            let Some(node) = nodes.get(task_id) else {
                return false;
            };

            for dep in &node.depends_on {
                if nodes.contains_key(dep)
                    && (failed.contains(dep) || check_blocked(dep, nodes, failed, blocked, checked))
                {
                    blocked.insert(task_id.to_string());
                    return true;
                }
            }
            false
        }

        for id in self.nodes.keys() {
            let mut checked = HashSet::new();
            check_blocked(id, &self.nodes, failed, &mut blocked, &mut checked);
        }
        blocked
    }

    /// Context for `task_id`: its own description/details, plus files and
    /// code from direct dependencies, plus up to two files each from other
    /// completed tasks sharing at least two keywords, deduplicated and
    /// capped at ten files total.
    pub fn context_for_task(
        &self,
        task_id: &str,
        completed: &HashMap<String, CompletedTaskOutput>,
    ) -> Option<TaskContext> {
        let node = self.nodes.get(task_id)?;
        let mut ctx = TaskContext {
            description: node.description.clone(),
            implementation_details: node.implementation_details.clone(),
            related_files: Vec::new(),
            related_code: Vec::new(),
        };

        for dep_id in &node.depends_on {
            if let Some(result) = completed.get(dep_id) {
                ctx.related_files.extend(result.files.iter().cloned());
                if let Some(code) = &result.code {
                    ctx.related_code.push(code.clone());
                }
            }
        }

        for (other_id, other_result) in completed {
            if other_id == task_id || node.depends_on.contains(other_id) {
                continue;
            }
            let Some(other_node) = self.nodes.get(other_id) else {
                continue;
            };
            let overlap = node
                .keywords
                .iter()
                .filter(|k| other_node.keywords.contains(k))
                .count();
            if overlap >= 2 {
                ctx.related_files.extend(other_result.files.iter().take(2).cloned());
            }
        }

        let mut seen = HashSet::new();
        ctx.related_files.retain(|f| seen.insert(f.clone()));
        ctx.related_files.truncate(10);

        Some(ctx)
    }
}
