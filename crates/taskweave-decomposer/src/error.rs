//! Decomposer errors.

use thiserror::Error;

use taskweave_core::TaskId;

/// Errors returned by the dependency graph, analyzer and decomposer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecomposeError {
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Circular dependency detected")]
    CyclicDependency,

    #[error("Topological sort emitted {sorted} of {total} nodes")]
    IncompleteSort { sorted: usize, total: usize },

    #[error("Unknown decomposition strategy: {0}")]
    UnknownStrategy(String),

    #[error("Unknown pattern: {0}")]
    InvalidPattern(String),

    #[error("Subtask count must be positive")]
    InvalidCount,

    #[error("Rule {rule} failed for task {task_id}: {reason}")]
    RuleFailed {
        rule: String,
        task_id: TaskId,
        reason: String,
    },
}

/// Result type for decomposition operations.
pub type Result<T> = std::result::Result<T, DecomposeError>;
