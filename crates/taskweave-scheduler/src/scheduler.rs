//! Scheduler - owns the directory, queue, allocator and task manager, and
//! runs background assignment and heartbeat loops.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use taskweave_core::{Task, TaskId, TaskStatus, Worker, WorkerId, WorkerStatus};

use crate::allocator::{AllocationStrategy, Allocator};
use crate::config::SchedulerConfig;
use crate::directory::WorkerDirectory;
use crate::error::{Result, SchedulerError};
use crate::manager::TaskManager;
use crate::queue::TaskQueue;
use crate::transport::ExecutionTransport;

/// Lower bound on the dequeue wait so an idle loop never spins.
const MIN_DEQUEUE_WAIT: Duration = Duration::from_millis(1);

/// Point-in-time snapshot of scheduler state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub total_workers: usize,
    pub workers_by_status: BTreeMap<WorkerStatus, usize>,
    pub total_tasks: usize,
    pub tasks_by_status: BTreeMap<TaskStatus, usize>,
    pub queue_size: usize,
    pub allocation_strategy: AllocationStrategy,
}

struct Running {
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Task scheduler.
pub struct Scheduler {
    config: SchedulerConfig,
    directory: Arc<WorkerDirectory>,
    allocator: Arc<Allocator>,
    queue: Arc<TaskQueue>,
    manager: Arc<TaskManager>,
    running: Mutex<Option<Running>>,
}

impl Scheduler {
    /// Create a scheduler without an execution transport.
    pub fn new(config: SchedulerConfig) -> Self {
        Self::build(config, None)
    }

    /// Create a scheduler that dispatches committed assignments through `transport`.
    pub fn with_transport(config: SchedulerConfig, transport: Arc<dyn ExecutionTransport>) -> Self {
        Self::build(config, Some(transport))
    }

    fn build(config: SchedulerConfig, transport: Option<Arc<dyn ExecutionTransport>>) -> Self {
        let directory = Arc::new(WorkerDirectory::new());
        let allocator = Arc::new(Allocator::new(
            Arc::clone(&directory),
            config.allocation_strategy,
        ));
        let queue = Arc::new(TaskQueue::from_max_size(config.max_queue_size));

        let mut manager = TaskManager::new(
            Arc::clone(&queue),
            Arc::clone(&allocator),
            Arc::clone(&directory),
        );
        if let Some(transport) = transport {
            manager = manager.with_transport(transport);
        }

        Self {
            config,
            directory,
            allocator,
            queue,
            manager: Arc::new(manager),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn directory(&self) -> &Arc<WorkerDirectory> {
        &self.directory
    }

    pub fn manager(&self) -> &Arc<TaskManager> {
        &self.manager
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    /// Spawn the assignment loops and the heartbeat checker.
    ///
    /// Calling `start` on a running scheduler is a no-op.
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            warn!("Scheduler already running");
            return;
        }

        let shutdown = CancellationToken::new();
        let mut handles = Vec::with_capacity(self.config.worker_count + 1);

        if self.config.heartbeat_interval_secs > 0 {
            handles.push(tokio::spawn(run_heartbeat_loop(
                Arc::clone(&self.directory),
                self.config.heartbeat_interval(),
                self.config.heartbeat_timeout(),
                shutdown.clone(),
            )));
        } else {
            debug!("Heartbeat checking disabled");
        }

        for loop_id in 0..self.config.worker_count {
            handles.push(tokio::spawn(run_assignment_loop(
                loop_id,
                Arc::clone(&self.queue),
                Arc::clone(&self.manager),
                self.config.dequeue_timeout().max(MIN_DEQUEUE_WAIT),
                self.config.retry_delay(),
                shutdown.clone(),
            )));
        }

        info!(
            assignment_loops = self.config.worker_count,
            strategy = %self.config.allocation_strategy,
            "Scheduler started"
        );
        *running = Some(Running { shutdown, handles });
    }

    /// Cancel the background loops and wait for them to exit.
    pub async fn stop(&self) {
        let Some(Running { shutdown, handles }) = self.running.lock().await.take() else {
            return;
        };

        shutdown.cancel();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Scheduler loop terminated abnormally");
            }
        }
        info!("Scheduler stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    pub async fn register_worker(&self, worker: Worker) -> Result<()> {
        self.directory.register(worker).await
    }

    pub async fn unregister_worker(&self, worker_id: &WorkerId) -> Result<()> {
        self.directory.unregister(worker_id).await
    }

    pub async fn get_worker(&self, worker_id: &WorkerId) -> Result<Worker> {
        self.directory.get(worker_id).await
    }

    pub async fn list_workers(&self) -> Vec<Worker> {
        self.directory.list().await
    }

    pub async fn update_worker_status(
        &self,
        worker_id: &WorkerId,
        status: WorkerStatus,
    ) -> Result<()> {
        self.directory.update_status(worker_id, status).await
    }

    pub async fn update_worker_heartbeat(&self, worker_id: &WorkerId) -> Result<()> {
        self.directory.update_heartbeat(worker_id).await
    }

    pub async fn submit_task(&self, task: Task) -> Result<()> {
        self.manager.submit_task(task).await
    }

    /// Assign a task immediately instead of waiting for an assignment loop.
    pub async fn assign_task(&self, task_id: &TaskId) -> Result<WorkerId> {
        self.manager.assign_task(task_id).await
    }

    pub async fn start_task(&self, task_id: &TaskId) -> Result<()> {
        self.manager.start_task(task_id).await
    }

    pub async fn complete_task(&self, task_id: &TaskId) -> Result<()> {
        self.manager.complete_task(task_id).await
    }

    pub async fn fail_task(&self, task_id: &TaskId) -> Result<()> {
        self.manager.fail_task(task_id).await
    }

    pub async fn cancel_task(&self, task_id: &TaskId) -> Result<()> {
        self.manager.cancel_task(task_id).await
    }

    pub async fn get_task(&self, task_id: &TaskId) -> Result<Task> {
        self.manager.get_task(task_id).await
    }

    pub async fn list_tasks(&self) -> Vec<Task> {
        self.manager.list_tasks().await
    }

    pub async fn list_tasks_by_status(&self, status: TaskStatus) -> Vec<Task> {
        self.manager.list_by_status(status).await
    }

    pub async fn get_worker_tasks(&self, worker_id: &WorkerId) -> Vec<Task> {
        self.manager.get_worker_tasks(worker_id).await
    }

    pub async fn allocation_strategy(&self) -> AllocationStrategy {
        self.allocator.strategy().await
    }

    pub async fn set_allocation_strategy(&self, strategy: AllocationStrategy) {
        self.allocator.set_strategy(strategy).await
    }

    pub async fn statistics(&self) -> Statistics {
        Statistics {
            total_workers: self.directory.count().await,
            workers_by_status: self.directory.count_by_status().await.into_iter().collect(),
            total_tasks: self.manager.task_count().await,
            tasks_by_status: self.manager.count_by_status().await.into_iter().collect(),
            queue_size: self.manager.queue_size().await,
            allocation_strategy: self.allocator.strategy().await,
        }
    }
}

async fn run_assignment_loop(
    loop_id: usize,
    queue: Arc<TaskQueue>,
    manager: Arc<TaskManager>,
    dequeue_timeout: Duration,
    retry_delay: Duration,
    shutdown: CancellationToken,
) {
    debug!(loop_id, "Assignment loop started");
    loop {
        let task = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = queue.dequeue_wait(dequeue_timeout) => match result {
                Ok(task) => task,
                Err(_) => continue,
            },
        };

        match manager.assign_task(&task.id).await {
            Ok(worker_id) => {
                debug!(loop_id, task_id = %task.id, worker_id = %worker_id, "Task assigned");
            }
            // Committed; the manager has already logged the transport error.
            Err(SchedulerError::DispatchFailed { .. }) => {}
            Err(e) if !e.is_retryable() => {
                // Cancelled or otherwise moved on since it was queued.
                warn!(loop_id, task_id = %task.id, error = %e, "Dropping unassignable task");
            }
            Err(e) => {
                warn!(loop_id, task_id = %task.id, error = %e, "Failed to assign task");
                if let Err(e) = manager.requeue(&task.id).await {
                    warn!(loop_id, task_id = %task.id, error = %e, "Failed to re-enqueue task");
                }
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(retry_delay) => {}
                }
            }
        }
    }
    debug!(loop_id, "Assignment loop stopped");
}

async fn run_heartbeat_loop(
    directory: Arc<WorkerDirectory>,
    interval: Duration,
    timeout: Duration,
    shutdown: CancellationToken,
) {
    let mut interval_timer = tokio::time::interval(interval);
    // The first tick completes immediately.
    interval_timer.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval_timer.tick() => {
                let timed_out = directory.check_heartbeat(timeout).await;
                if !timed_out.is_empty() {
                    warn!(count = timed_out.len(), workers = ?timed_out, "Workers timed out");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> SchedulerConfig {
        SchedulerConfig {
            worker_count: 2,
            dequeue_timeout_ms: 20,
            retry_delay_ms: 10,
            heartbeat_interval_secs: 0,
            ..SchedulerConfig::default()
        }
    }

    async fn wait_for_status(scheduler: &Scheduler, id: &TaskId, status: TaskStatus) -> bool {
        for _ in 0..100 {
            if matches!(scheduler.get_task(id).await, Ok(task) if task.status == status) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_background_loops_assign_tasks() {
        let scheduler = Scheduler::new(fast_config());
        scheduler
            .register_worker(Worker::new("w-1", "alpha").with_capability("general"))
            .await
            .unwrap();
        scheduler.start().await;
        assert!(scheduler.is_running().await);

        scheduler.submit_task(Task::new("t-1", "calculation")).await.unwrap();
        let id = TaskId::new("t-1");
        assert!(wait_for_status(&scheduler, &id, TaskStatus::Assigned).await);
        assert_eq!(
            scheduler.get_task(&id).await.unwrap().assigned_worker_id,
            Some(WorkerId::new("w-1"))
        );

        scheduler.stop().await;
        assert!(!scheduler.is_running().await);
    }

    #[tokio::test]
    async fn test_unassignable_task_is_requeued() {
        let scheduler = Scheduler::new(fast_config());
        scheduler.start().await;

        scheduler
            .submit_task(Task::new("t-1", "code_review").with_capability("rust"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        let id = TaskId::new("t-1");
        assert_eq!(scheduler.get_task(&id).await.unwrap().status, TaskStatus::Pending);

        scheduler
            .register_worker(Worker::new("w-1", "alpha").with_capability("rust"))
            .await
            .unwrap();
        assert!(wait_for_status(&scheduler, &id, TaskStatus::Assigned).await);
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_unknown_queued_task_is_dropped() {
        let scheduler = Scheduler::new(fast_config());
        scheduler
            .register_worker(Worker::new("w-1", "alpha").with_capability("general"))
            .await
            .unwrap();
        // Queued behind the manager's back, so assigning it fails for good.
        scheduler.queue().enqueue(Task::new("ghost", "x")).await.unwrap();
        scheduler.start().await;

        for _ in 0..100 {
            if scheduler.queue().is_empty().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(scheduler.queue().is_empty().await);

        scheduler.submit_task(Task::new("t-1", "x")).await.unwrap();
        assert!(wait_for_status(&scheduler, &TaskId::new("t-1"), TaskStatus::Assigned).await);
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_statistics_snapshot() {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        scheduler
            .register_worker(Worker::new("w-1", "alpha").with_capability("general"))
            .await
            .unwrap();
        scheduler.submit_task(Task::new("a", "x")).await.unwrap();
        scheduler.submit_task(Task::new("b", "x")).await.unwrap();
        scheduler.assign_task(&TaskId::new("a")).await.unwrap();
        scheduler
            .set_allocation_strategy(AllocationStrategy::RoundRobin)
            .await;

        let stats = scheduler.statistics().await;
        assert_eq!(stats.total_workers, 1);
        assert_eq!(stats.total_tasks, 2);
        assert_eq!(stats.queue_size, 1);
        assert_eq!(stats.tasks_by_status.get(&TaskStatus::Assigned), Some(&1));
        assert_eq!(stats.tasks_by_status.get(&TaskStatus::Pending), Some(&1));
        assert_eq!(stats.allocation_strategy, AllocationStrategy::RoundRobin);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["allocation_strategy"], "ROUND_ROBIN");
        assert_eq!(json["workers_by_status"]["IDLE"], 1);
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let scheduler = Scheduler::new(fast_config());
        scheduler.stop().await;
        assert!(!scheduler.is_running().await);
    }
}
