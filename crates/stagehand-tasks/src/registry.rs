//! Named task registry and plan resolution

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, RwLock};

use tracing::{debug, instrument};

use crate::error::{Result, TaskError};
use crate::task::{Task, TaskBody};

/// A task tree with every name resolved to its definition.
///
/// Built in full before anything runs, so unknown names and cycles are
/// reported before the first body starts.
#[derive(Clone)]
pub struct PlanNode {
    /// Task name, or a description for anonymous nodes
    pub label: String,
    pub kind: PlanKind,
}

/// What a plan node does
#[derive(Clone)]
pub enum PlanKind {
    Leaf(Arc<dyn TaskBody>),
    Series(Vec<PlanNode>),
    Parallel(Vec<PlanNode>),
}

impl PlanNode {
    /// Number of leaf tasks in the tree
    pub fn leaf_count(&self) -> usize {
        match &self.kind {
            PlanKind::Leaf(_) => 1,
            PlanKind::Series(children) | PlanKind::Parallel(children) => {
                children.iter().map(PlanNode::leaf_count).sum()
            }
        }
    }

    /// Human-readable tree of the plan
    pub fn execution_plan(&self) -> String {
        let mut plan = String::new();
        self.render(&mut plan, 0);
        plan
    }

    fn render(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        match &self.kind {
            PlanKind::Leaf(body) => {
                let description = body.describe();
                if description == self.label {
                    let _ = writeln!(out, "{}{}", indent, self.label);
                } else {
                    let _ = writeln!(out, "{}{} -> {}", indent, self.label, description);
                }
            }
            PlanKind::Series(children) | PlanKind::Parallel(children) => {
                let kind = if matches!(self.kind, PlanKind::Series(_)) {
                    "series"
                } else {
                    "parallel"
                };
                if self.label == kind {
                    let _ = writeln!(out, "{}{}:", indent, kind);
                } else {
                    let _ = writeln!(out, "{}{} ({}):", indent, self.label, kind);
                }
                for child in children {
                    child.render(out, depth + 1);
                }
            }
        }
    }
}

/// Stores named tasks.
///
/// Registration goes through a shared reference so a registry behind an
/// `Arc` can be updated while runs are in flight; runs keep whatever bodies
/// they resolved.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, Task>>,
    descriptions: RwLock<HashMap<String, String>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a task under `name`, replacing and returning any previous one
    pub fn register(&self, name: impl Into<String>, task: impl Into<Task>) -> Option<Task> {
        let name = name.into();
        debug!(task = %name, "registering task");
        self.tasks
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name, task.into())
    }

    /// Store a body under `name`
    pub fn register_body<B: TaskBody + 'static>(
        &self,
        name: impl Into<String>,
        body: B,
    ) -> Option<Task> {
        self.register(name, Task::inline(body))
    }

    /// Attach a description shown when listing tasks
    pub fn describe(&self, name: impl Into<String>, description: impl Into<String>) {
        self.descriptions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name.into(), description.into());
    }

    /// Description of a task, if one was attached
    pub fn description(&self, name: &str) -> Option<String> {
        self.descriptions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
    }

    /// Get the definition registered under `name`
    pub fn get(&self, name: &str) -> Option<Task> {
        self.tasks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(name)
    }

    /// All registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tasks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tasks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve every name in `task`, failing on unknown names and cycles
    #[instrument(skip_all, fields(task = %task))]
    pub fn resolve(&self, task: &Task) -> Result<PlanNode> {
        let tasks = self
            .tasks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut stack = Vec::new();
        let plan = resolve_node(&tasks, task, None, &mut stack)?;
        debug!(leaves = plan.leaf_count(), "task resolved");
        Ok(plan)
    }

    /// Check that every name reachable from `task` is registered
    pub fn validate(&self, task: &Task) -> Result<()> {
        self.resolve(task).map(|_| ())
    }
}

fn resolve_node(
    tasks: &HashMap<String, Task>,
    task: &Task,
    label: Option<&str>,
    stack: &mut Vec<String>,
) -> Result<PlanNode> {
    match task {
        Task::Named(name) => {
            if stack.iter().any(|seen| seen == name) {
                let mut path = stack.clone();
                path.push(name.clone());
                return Err(TaskError::Cycle(path.join(" -> ")));
            }
            let definition = tasks
                .get(name)
                .ok_or_else(|| TaskError::UnknownTask(name.clone()))?;

            stack.push(name.clone());
            let node = resolve_node(tasks, definition, Some(name), stack);
            stack.pop();
            node
        }
        Task::Inline(body) => Ok(PlanNode {
            label: label.map(str::to_string).unwrap_or_else(|| body.describe()),
            kind: PlanKind::Leaf(body.clone()),
        }),
        Task::Series(children) => Ok(PlanNode {
            label: label.unwrap_or("series").to_string(),
            kind: PlanKind::Series(resolve_children(tasks, children, stack)?),
        }),
        Task::Parallel(children) => Ok(PlanNode {
            label: label.unwrap_or("parallel").to_string(),
            kind: PlanKind::Parallel(resolve_children(tasks, children, stack)?),
        }),
    }
}

fn resolve_children(
    tasks: &HashMap<String, Task>,
    children: &[Task],
    stack: &mut Vec<String>,
) -> Result<Vec<PlanNode>> {
    children
        .iter()
        .map(|child| resolve_node(tasks, child, None, stack))
        .collect()
}
