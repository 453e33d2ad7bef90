//! Scheduler errors.

use std::time::Duration;

use thiserror::Error;

use taskweave_core::{TaskId, TaskStatus, WorkerId};

use crate::transport::TransportError;

/// Errors returned by the worker directory, queue, allocator and task manager.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid worker: {0}")]
    InvalidWorker(String),

    #[error("Worker not found: {0}")]
    WorkerNotFound(WorkerId),

    #[error("Invalid load {load} for worker {worker_id}: must be within [0, 1]")]
    InvalidLoad { worker_id: WorkerId, load: f64 },

    #[error("Worker {0} has reached max tasks")]
    CapacityExceeded(WorkerId),

    #[error("Task already exists: {0}")]
    DuplicateTask(TaskId),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Task {task_id} cannot move from {from} to {to}")]
    InvalidState {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Queue is empty")]
    QueueEmpty,

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("No available workers")]
    NoAvailableWorkers,

    #[error("No workers with required capabilities: {0:?}")]
    NoMatchingCapabilities(Vec<String>),

    #[error("Unknown allocation strategy: {0}")]
    UnknownStrategy(String),

    #[error("Failed to dispatch task {task_id} to worker {worker_id}")]
    DispatchFailed {
        task_id: TaskId,
        worker_id: WorkerId,
        #[source]
        source: TransportError,
    },
}

impl SchedulerError {
    /// True for allocation failures that may clear up once workers join or
    /// free capacity.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NoAvailableWorkers
                | Self::NoMatchingCapabilities(_)
                | Self::CapacityExceeded(_)
                | Self::WorkerNotFound(_)
        )
    }
}

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;
