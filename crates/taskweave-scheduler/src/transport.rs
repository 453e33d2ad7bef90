//! Execution transport - hands committed assignments to workers.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use taskweave_core::{Task, TaskId, WorkerId};

/// Buffer size of each worker's assignment channel.
pub const ASSIGNMENT_CHANNEL_CAPACITY: usize = 32;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Worker disconnected: {0}")]
    WorkerDisconnected(WorkerId),

    #[error("Failed to send assignment: {0}")]
    SendFailed(String),
}

/// Delivers assigned tasks to the worker that will run them.
///
/// Called after the assignment is committed. A failed dispatch leaves the task
/// Assigned; reconciliation is up to the caller.
#[async_trait]
pub trait ExecutionTransport: Send + Sync {
    async fn dispatch(&self, worker_id: &WorkerId, task: &Task) -> Result<(), TransportError>;
}

/// Assignment message delivered to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub task_id: TaskId,
    pub worker_id: WorkerId,
    pub task_type: String,
    pub priority: i32,
    pub issued_at: DateTime<Utc>,
}

impl TaskAssignment {
    pub fn new(worker_id: &WorkerId, task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            worker_id: worker_id.clone(),
            task_type: task.task_type.clone(),
            priority: task.priority,
            issued_at: Utc::now(),
        }
    }
}

/// In-process transport with one bounded channel per connected worker.
#[derive(Default)]
pub struct ChannelTransport {
    senders: RwLock<HashMap<WorkerId, mpsc::Sender<TaskAssignment>>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a channel for `worker_id`, replacing any previous one.
    pub async fn connect(&self, worker_id: WorkerId) -> mpsc::Receiver<TaskAssignment> {
        let (tx, rx) = mpsc::channel(ASSIGNMENT_CHANNEL_CAPACITY);
        info!(worker_id = %worker_id, "Worker channel connected");
        self.senders.write().await.insert(worker_id, tx);
        rx
    }

    /// Drop the channel for `worker_id`. Returns false if none was open.
    pub async fn disconnect(&self, worker_id: &WorkerId) -> bool {
        let removed = self.senders.write().await.remove(worker_id).is_some();
        if removed {
            info!(worker_id = %worker_id, "Worker channel disconnected");
        }
        removed
    }

    pub async fn is_connected(&self, worker_id: &WorkerId) -> bool {
        self.senders
            .read()
            .await
            .get(worker_id)
            .is_some_and(|tx| !tx.is_closed())
    }
}

#[async_trait]
impl ExecutionTransport for ChannelTransport {
    async fn dispatch(&self, worker_id: &WorkerId, task: &Task) -> Result<(), TransportError> {
        let senders = self.senders.read().await;
        let tx = senders
            .get(worker_id)
            .ok_or_else(|| TransportError::WorkerDisconnected(worker_id.clone()))?;

        tx.try_send(TaskAssignment::new(worker_id, task))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    TransportError::SendFailed(format!("channel for worker {worker_id} is full"))
                }
                mpsc::error::TrySendError::Closed(_) => {
                    TransportError::WorkerDisconnected(worker_id.clone())
                }
            })?;
        debug!(task_id = %task.id, worker_id = %worker_id, "Assignment sent");
        Ok(())
    }
}
