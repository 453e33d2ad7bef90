//! Task lifecycle manager - ties the queue, allocator and worker directory together.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use taskweave_core::{Task, TaskId, TaskStatus, WorkerId};

use crate::allocator::Allocator;
use crate::directory::WorkerDirectory;
use crate::error::{Result, SchedulerError};
use crate::queue::TaskQueue;
use crate::transport::ExecutionTransport;

#[derive(Default)]
struct ManagerState {
    tasks: HashMap<TaskId, Task>,
    /// task -> worker, kept after completion so worker history stays queryable.
    assignments: HashMap<TaskId, WorkerId>,
}

/// Owns every submitted task and drives it through
/// `Pending -> Assigned -> Running -> Completed`, with `Failed` and
/// `Cancelled` side exits.
pub struct TaskManager {
    queue: Arc<TaskQueue>,
    allocator: Arc<Allocator>,
    directory: Arc<WorkerDirectory>,
    transport: Option<Arc<dyn ExecutionTransport>>,
    state: RwLock<ManagerState>,
}

fn invalid_state(task: &Task, to: TaskStatus) -> SchedulerError {
    SchedulerError::InvalidState {
        task_id: task.id.clone(),
        from: task.status,
        to,
    }
}

impl TaskManager {
    pub fn new(
        queue: Arc<TaskQueue>,
        allocator: Arc<Allocator>,
        directory: Arc<WorkerDirectory>,
    ) -> Self {
        Self {
            queue,
            allocator,
            directory,
            transport: None,
            state: RwLock::new(ManagerState::default()),
        }
    }

    /// Builder method to dispatch committed assignments through `transport`.
    pub fn with_transport(mut self, transport: Arc<dyn ExecutionTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Register a task as Pending and enqueue it.
    pub async fn submit_task(&self, mut task: Task) -> Result<()> {
        if task.id.is_empty() {
            return Err(SchedulerError::InvalidTask("task ID cannot be empty".into()));
        }

        let mut state = self.state.write().await;
        if state.tasks.contains_key(&task.id) {
            return Err(SchedulerError::DuplicateTask(task.id));
        }

        task.status = TaskStatus::Pending;
        task.assigned_worker_id = None;
        self.queue.enqueue(task.clone()).await?;

        info!(
            task_id = %task.id,
            task_type = %task.task_type,
            priority = task.priority,
            "Task submitted"
        );
        state.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    /// Allocate a worker for a Pending task and commit the assignment.
    ///
    /// Capacity is claimed before anything is written, so an allocation or
    /// capacity failure leaves the task Pending (and queued, if it was).
    pub async fn assign_task(&self, task_id: &TaskId) -> Result<WorkerId> {
        let (worker_id, assigned) = {
            let mut state = self.state.write().await;
            let task = state
                .tasks
                .get(task_id)
                .ok_or_else(|| SchedulerError::TaskNotFound(task_id.clone()))?;
            if task.status != TaskStatus::Pending {
                return Err(invalid_state(task, TaskStatus::Assigned));
            }

            let worker_id = self.allocator.allocate(task).await?;
            self.directory.increment_task_count(&worker_id).await?;

            let task = state
                .tasks
                .get_mut(task_id)
                .ok_or_else(|| SchedulerError::TaskNotFound(task_id.clone()))?;
            task.status = TaskStatus::Assigned;
            task.assigned_worker_id = Some(worker_id.clone());
            let assigned = task.clone();
            state.assignments.insert(task_id.clone(), worker_id.clone());

            // Already gone when the task was dequeued by a driver loop.
            if self.queue.remove(task_id).await.is_err() {
                debug!(task_id = %task_id, "Assigned task was not queued");
            }
            (worker_id, assigned)
        };

        info!(task_id = %task_id, worker_id = %worker_id, "Assigning task to worker");

        if let Some(transport) = &self.transport {
            if let Err(source) = transport.dispatch(&worker_id, &assigned).await {
                warn!(
                    task_id = %task_id,
                    worker_id = %worker_id,
                    error = %source,
                    "Failed to dispatch assignment"
                );
                return Err(SchedulerError::DispatchFailed {
                    task_id: task_id.clone(),
                    worker_id,
                    source,
                });
            }
        }

        Ok(worker_id)
    }

    /// Mark an Assigned task as Running.
    pub async fn start_task(&self, task_id: &TaskId) -> Result<()> {
        let mut state = self.state.write().await;
        let task = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| SchedulerError::TaskNotFound(task_id.clone()))?;
        if task.status != TaskStatus::Assigned {
            return Err(invalid_state(task, TaskStatus::Running));
        }
        task.status = TaskStatus::Running;
        debug!(task_id = %task_id, "Task running");
        Ok(())
    }

    /// Complete an Assigned or Running task and release its worker slot.
    /// The task reaches Completed even if its worker has since left.
    pub async fn complete_task(&self, task_id: &TaskId) -> Result<()> {
        let mut state = self.state.write().await;
        let task = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| SchedulerError::TaskNotFound(task_id.clone()))?;
        if !task.status.holds_worker() {
            return Err(invalid_state(task, TaskStatus::Completed));
        }
        let worker_id = task
            .assigned_worker_id
            .clone()
            .ok_or_else(|| invalid_state(task, TaskStatus::Completed))?;

        task.status = TaskStatus::Completed;
        if let Err(e) = self.directory.decrement_task_count(&worker_id).await {
            warn!(
                task_id = %task_id,
                worker_id = %worker_id,
                error = %e,
                "Could not release worker slot"
            );
        }

        info!(task_id = %task_id, worker_id = %worker_id, "Task completed");
        Ok(())
    }

    /// Fail any non-terminal task. A missing worker is tolerated.
    pub async fn fail_task(&self, task_id: &TaskId) -> Result<()> {
        let mut state = self.state.write().await;
        let ManagerState { tasks, assignments } = &mut *state;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| SchedulerError::TaskNotFound(task_id.clone()))?;
        if task.status.is_terminal() {
            return Err(invalid_state(task, TaskStatus::Failed));
        }

        if task.status == TaskStatus::Pending {
            let _ = self.queue.remove(task_id).await;
        }
        if let Some(worker_id) = assignments.get(task_id) {
            if let Err(e) = self.directory.decrement_task_count(worker_id).await {
                warn!(
                    task_id = %task_id,
                    worker_id = %worker_id,
                    error = %e,
                    "Could not release worker slot"
                );
            }
        }
        task.status = TaskStatus::Failed;

        warn!(task_id = %task_id, "Task failed");
        Ok(())
    }

    /// Cancel a Pending or Assigned task. Does not interrupt a dispatched task.
    pub async fn cancel_task(&self, task_id: &TaskId) -> Result<()> {
        let mut state = self.state.write().await;
        let ManagerState { tasks, assignments } = &mut *state;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| SchedulerError::TaskNotFound(task_id.clone()))?;
        if !matches!(task.status, TaskStatus::Pending | TaskStatus::Assigned) {
            return Err(invalid_state(task, TaskStatus::Cancelled));
        }

        if task.status == TaskStatus::Pending {
            let _ = self.queue.remove(task_id).await;
        }
        if let Some(worker_id) = assignments.remove(task_id) {
            if let Err(e) = self.directory.decrement_task_count(&worker_id).await {
                warn!(
                    task_id = %task_id,
                    worker_id = %worker_id,
                    error = %e,
                    "Could not release worker slot"
                );
            }
        }
        task.status = TaskStatus::Cancelled;

        info!(task_id = %task_id, "Task cancelled");
        Ok(())
    }

    /// Put a Pending task back on the queue after a failed assignment
    /// attempt. Returns false if the task is not Pending or already queued.
    pub async fn requeue(&self, task_id: &TaskId) -> Result<bool> {
        let state = self.state.read().await;
        let task = state
            .tasks
            .get(task_id)
            .ok_or_else(|| SchedulerError::TaskNotFound(task_id.clone()))?;
        if task.status != TaskStatus::Pending || self.queue.contains(task_id).await {
            return Ok(false);
        }
        self.queue.enqueue(task.clone()).await?;
        debug!(task_id = %task_id, "Task requeued");
        Ok(true)
    }

    pub async fn get_task(&self, task_id: &TaskId) -> Result<Task> {
        self.state
            .read()
            .await
            .tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| SchedulerError::TaskNotFound(task_id.clone()))
    }

    /// All tasks, oldest first.
    pub async fn list_tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.state.read().await.tasks.values().cloned().collect();
        sort_by_creation(&mut tasks);
        tasks
    }

    pub async fn list_by_status(&self, status: TaskStatus) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .state
            .read()
            .await
            .tasks
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect();
        sort_by_creation(&mut tasks);
        tasks
    }

    /// Tasks recorded as assigned to `worker_id`, including finished ones.
    pub async fn get_worker_tasks(&self, worker_id: &WorkerId) -> Vec<Task> {
        let state = self.state.read().await;
        let mut tasks: Vec<Task> = state
            .assignments
            .iter()
            .filter(|(_, wid)| *wid == worker_id)
            .filter_map(|(tid, _)| state.tasks.get(tid).cloned())
            .collect();
        sort_by_creation(&mut tasks);
        tasks
    }

    pub async fn get_assignment(&self, task_id: &TaskId) -> Option<WorkerId> {
        self.state.read().await.assignments.get(task_id).cloned()
    }

    pub async fn queue_size(&self) -> usize {
        self.queue.size().await
    }

    pub async fn task_count(&self) -> usize {
        self.state.read().await.tasks.len()
    }

    pub async fn count_by_status(&self) -> HashMap<TaskStatus, usize> {
        let mut counts = HashMap::new();
        for task in self.state.read().await.tasks.values() {
            *counts.entry(task.status).or_insert(0) += 1;
        }
        counts
    }
}

fn sort_by_creation(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}
