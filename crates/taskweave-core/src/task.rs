//! Task type.

use crate::{Metadata, MetadataValue, TaskId, TaskStatus, WorkerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Priority given to tasks that do not specify one.
pub const DEFAULT_PRIORITY: i32 = 5;

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

/// A Task is a unit of work submitted to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: TaskId,

    /// Task kind, e.g. `code_review`. Drives complexity scoring and rule matching.
    #[serde(rename = "type")]
    pub task_type: String,

    /// Human readable description.
    #[serde(default)]
    pub description: String,

    /// Higher values are more urgent.
    #[serde(default = "default_priority")]
    pub priority: i32,

    /// Capabilities a worker must have, in declaration order.
    #[serde(default)]
    pub required_capabilities: Vec<String>,

    /// IDs of tasks this one depends on.
    #[serde(default)]
    pub dependencies: Vec<TaskId>,

    /// Free-form requirements.
    #[serde(default)]
    pub requirements: Metadata,

    /// Worker the task is bound to, once assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_worker_id: Option<WorkerId>,

    /// Current task status.
    #[serde(default)]
    pub status: TaskStatus,

    /// Task metadata.
    #[serde(default)]
    pub metadata: Metadata,

    /// When the task was created.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Create a new pending Task with default priority.
    pub fn new(id: impl Into<TaskId>, task_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task_type: task_type.into(),
            description: String::new(),
            priority: DEFAULT_PRIORITY,
            required_capabilities: Vec::new(),
            dependencies: Vec::new(),
            requirements: Metadata::new(),
            assigned_worker_id: None,
            status: TaskStatus::Pending,
            metadata: Metadata::new(),
            created_at: Utc::now(),
        }
    }

    /// Builder method to set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder method to set the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Builder method to add a required capability.
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.required_capabilities.push(capability.into());
        self
    }

    /// Builder method to add a dependency.
    pub fn with_dependency(mut self, dependency: impl Into<TaskId>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// Builder method to add a requirement.
    pub fn with_requirement(
        mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Self {
        self.requirements.insert(key.into(), value.into());
        self
    }

    /// Builder method to add a metadata entry.
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
