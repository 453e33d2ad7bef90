//! Decomposition data types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use taskweave_core::{Metadata, MetadataValue, Task, TaskId};

use crate::error::DecomposeError;
use crate::graph::DependencyGraph;

/// Metadata keys written onto decomposition results and converted subtasks.
pub mod keys {
    pub const SUB_TASK_COUNT: &str = "sub_task_count";
    pub const MAX_LEVEL: &str = "max_level";
    pub const EXTERNAL_DEPENDENCY_COUNT: &str = "external_dependency_count";
    pub const PARENT_ID: &str = "parent_id";
    pub const LEVEL: &str = "level";
}

/// A unit of work produced by decomposing a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTask {
    pub id: TaskId,

    /// Task this was split from. `None` for a verbatim copy of the original.
    pub parent_id: Option<TaskId>,

    #[serde(rename = "type")]
    pub task_type: String,

    #[serde(default)]
    pub description: String,

    pub priority: i32,

    /// Sibling subtask IDs, or IDs of tasks outside this decomposition.
    #[serde(default)]
    pub dependencies: Vec<TaskId>,

    #[serde(default)]
    pub capabilities: Vec<String>,

    #[serde(default)]
    pub requirements: Metadata,

    /// Depth in the dependency graph, written back after decomposition.
    #[serde(default)]
    pub level: usize,

    #[serde(default)]
    pub metadata: Metadata,
}

impl SubTask {
    /// Create a subtask of `parent` inheriting its priority.
    pub fn new(id: impl Into<TaskId>, parent: &Task, task_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: Some(parent.id.clone()),
            task_type: task_type.into(),
            description: String::new(),
            priority: parent.priority,
            dependencies: Vec::new(),
            capabilities: Vec::new(),
            requirements: Metadata::new(),
            level: 0,
            metadata: Metadata::new(),
        }
    }

    /// Verbatim copy of `task`, keeping its ID and external dependencies.
    pub fn from_task(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            parent_id: None,
            task_type: task.task_type.clone(),
            description: task.description.clone(),
            priority: task.priority,
            dependencies: task.dependencies.clone(),
            capabilities: task.required_capabilities.clone(),
            requirements: task.requirements.clone(),
            level: 0,
            metadata: task.metadata.clone(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependency(mut self, dependency: impl Into<TaskId>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    pub fn with_level(mut self, level: usize) -> Self {
        self.level = level;
        self
    }

    /// Convert into a pending [`Task`] ready for submission.
    ///
    /// Adds `parent_id` (when set) and `level` to the task metadata.
    pub fn into_task(self) -> Task {
        let mut task = Task::new(self.id, self.task_type)
            .with_description(self.description)
            .with_priority(self.priority);
        task.required_capabilities = self.capabilities;
        task.dependencies = self.dependencies;
        task.requirements = self.requirements;
        task.metadata = self.metadata;
        if let Some(parent_id) = self.parent_id {
            task.metadata
                .insert(keys::PARENT_ID.into(), MetadataValue::from(parent_id.into_inner()));
        }
        task.metadata
            .insert(keys::LEVEL.into(), MetadataValue::from(self.level));
        task
    }
}

/// Output of a decomposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionResult {
    pub original_task: Task,
    pub sub_tasks: Vec<SubTask>,
    #[serde(rename = "dependency_graph")]
    pub graph: DependencyGraph,
    pub strategy: DecompositionStrategy,
    pub metadata: Metadata,
}

impl DecompositionResult {
    /// Subtask IDs grouped by level, lowest level first.
    pub fn parallel_groups(&self) -> Vec<Vec<TaskId>> {
        self.graph.parallel_groups()
    }

    pub fn max_level(&self) -> usize {
        self.sub_tasks.iter().map(|s| s.level).max().unwrap_or(0)
    }

    /// Subtasks as tasks in level order, stable within a level.
    pub fn into_tasks(self) -> Vec<Task> {
        let mut sub_tasks = self.sub_tasks;
        sub_tasks.sort_by_key(|s| s.level);
        sub_tasks.into_iter().map(SubTask::into_task).collect()
    }
}

/// How a task is split into subtasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecompositionStrategy {
    /// One subtask per dependency plus a main subtask.
    Dependency,
    /// Preparation, execution and verification phases.
    Priority,
    /// One subtask per required capability plus an aggregate.
    Capability,
    /// Registered rules first, then a strategy chosen by complexity.
    #[default]
    Hybrid,
}

impl DecompositionStrategy {
    pub const ALL: [DecompositionStrategy; 4] = [
        Self::Dependency,
        Self::Priority,
        Self::Capability,
        Self::Hybrid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dependency => "DEPENDENCY",
            Self::Priority => "PRIORITY",
            Self::Capability => "CAPABILITY",
            Self::Hybrid => "HYBRID",
        }
    }
}

impl fmt::Display for DecompositionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecompositionStrategy {
    type Err = DecomposeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DecomposeError::UnknownStrategy(s.to_string()))
    }
}

/// Complexity band of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskComplexity {
    Simple,
    Moderate,
    Complex,
    VeryComplex,
}

impl TaskComplexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "SIMPLE",
            Self::Moderate => "MODERATE",
            Self::Complex => "COMPLEX",
            Self::VeryComplex => "VERY_COMPLEX",
        }
    }
}

impl fmt::Display for TaskComplexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decomposer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecomposerConfig {
    /// Strategy used by [`Decomposer::decompose`](crate::Decomposer::decompose).
    pub strategy: DecompositionStrategy,

    /// Return Simple tasks unsplit.
    pub complexity_analysis: bool,
}

impl Default for DecomposerConfig {
    fn default() -> Self {
        Self {
            strategy: DecompositionStrategy::Hybrid,
            complexity_analysis: true,
        }
    }
}
