//! Worker directory - registry of workers, their capacity and liveness.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use taskweave_core::{Worker, WorkerId, WorkerStatus, DEFAULT_MAX_TASKS};

use crate::error::{Result, SchedulerError};

/// Registry of known workers.
///
/// The directory is the only owner of `Worker` records. Callers receive
/// clones; `current_tasks` and the Idle/Busy flip are driven exclusively by
/// [`increment_task_count`](Self::increment_task_count) and
/// [`decrement_task_count`](Self::decrement_task_count).
#[derive(Default)]
pub struct WorkerDirectory {
    workers: RwLock<BTreeMap<WorkerId, Worker>>,
}

fn validate_load(worker_id: &WorkerId, load: f64) -> Result<()> {
    if (0.0..=1.0).contains(&load) {
        Ok(())
    } else {
        Err(SchedulerError::InvalidLoad {
            worker_id: worker_id.clone(),
            load,
        })
    }
}

impl WorkerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker, replacing any previous record with the same ID.
    pub async fn register(&self, mut worker: Worker) -> Result<()> {
        if worker.id.is_empty() {
            return Err(SchedulerError::InvalidWorker(
                "worker ID cannot be empty".into(),
            ));
        }
        if worker.name.trim().is_empty() {
            return Err(SchedulerError::InvalidWorker(format!(
                "worker {} has an empty name",
                worker.id
            )));
        }
        if worker.capabilities.is_empty() {
            return Err(SchedulerError::InvalidWorker(format!(
                "worker {} must have at least one capability",
                worker.id
            )));
        }
        validate_load(&worker.id, worker.load)?;

        if worker.max_tasks == 0 {
            worker.max_tasks = DEFAULT_MAX_TASKS;
        }
        worker.current_tasks = 0;
        let now = Utc::now();
        worker.registered_at = now;
        worker.last_heartbeat = now;

        let mut workers = self.workers.write().await;
        if workers.contains_key(&worker.id) {
            warn!(worker_id = %worker.id, "Worker re-registered, replacing previous record");
        }
        info!(
            worker_id = %worker.id,
            name = %worker.name,
            capabilities = ?worker.capabilities,
            max_tasks = worker.max_tasks,
            "Worker registered"
        );
        workers.insert(worker.id.clone(), worker);
        Ok(())
    }

    pub async fn unregister(&self, worker_id: &WorkerId) -> Result<()> {
        let mut workers = self.workers.write().await;
        workers
            .remove(worker_id)
            .ok_or_else(|| SchedulerError::WorkerNotFound(worker_id.clone()))?;
        info!(worker_id = %worker_id, "Worker unregistered");
        Ok(())
    }

    pub async fn get(&self, worker_id: &WorkerId) -> Result<Worker> {
        self.workers
            .read()
            .await
            .get(worker_id)
            .cloned()
            .ok_or_else(|| SchedulerError::WorkerNotFound(worker_id.clone()))
    }

    /// All workers, ordered by ID.
    pub async fn list(&self) -> Vec<Worker> {
        self.workers.read().await.values().cloned().collect()
    }

    /// Workers offering `capability`, in any status.
    pub async fn find_by_capability(&self, capability: &str) -> Vec<Worker> {
        self.workers
            .read()
            .await
            .values()
            .filter(|w| w.has_capability(capability))
            .cloned()
            .collect()
    }

    /// Idle workers with spare capacity, ordered by ID.
    pub async fn find_available(&self) -> Vec<Worker> {
        self.workers
            .read()
            .await
            .values()
            .filter(|w| w.is_available())
            .cloned()
            .collect()
    }

    pub async fn update_status(&self, worker_id: &WorkerId, status: WorkerStatus) -> Result<()> {
        let mut workers = self.workers.write().await;
        let worker = workers
            .get_mut(worker_id)
            .ok_or_else(|| SchedulerError::WorkerNotFound(worker_id.clone()))?;
        debug!(
            worker_id = %worker_id,
            from = %worker.status,
            to = %status,
            "Worker status updated"
        );
        worker.status = status;
        Ok(())
    }

    pub async fn update_load(&self, worker_id: &WorkerId, load: f64) -> Result<()> {
        validate_load(worker_id, load)?;
        let mut workers = self.workers.write().await;
        let worker = workers
            .get_mut(worker_id)
            .ok_or_else(|| SchedulerError::WorkerNotFound(worker_id.clone()))?;
        worker.load = load;
        Ok(())
    }

    /// Claim one slot on the worker. Flips the worker to Busy when it fills up.
    pub async fn increment_task_count(&self, worker_id: &WorkerId) -> Result<()> {
        let mut workers = self.workers.write().await;
        let worker = workers
            .get_mut(worker_id)
            .ok_or_else(|| SchedulerError::WorkerNotFound(worker_id.clone()))?;

        if worker.current_tasks >= worker.max_tasks {
            return Err(SchedulerError::CapacityExceeded(worker_id.clone()));
        }

        worker.current_tasks += 1;
        if worker.current_tasks >= worker.max_tasks {
            worker.status = WorkerStatus::Busy;
        }
        debug!(
            worker_id = %worker_id,
            current_tasks = worker.current_tasks,
            max_tasks = worker.max_tasks,
            "Task count incremented"
        );
        Ok(())
    }

    /// Release one slot. Floors at zero; a Busy worker below capacity goes back to Idle.
    pub async fn decrement_task_count(&self, worker_id: &WorkerId) -> Result<()> {
        let mut workers = self.workers.write().await;
        let worker = workers
            .get_mut(worker_id)
            .ok_or_else(|| SchedulerError::WorkerNotFound(worker_id.clone()))?;

        worker.current_tasks = worker.current_tasks.saturating_sub(1);
        if worker.current_tasks < worker.max_tasks && worker.status == WorkerStatus::Busy {
            worker.status = WorkerStatus::Idle;
        }
        debug!(
            worker_id = %worker_id,
            current_tasks = worker.current_tasks,
            "Task count decremented"
        );
        Ok(())
    }

    pub async fn update_heartbeat(&self, worker_id: &WorkerId) -> Result<()> {
        let mut workers = self.workers.write().await;
        let worker = workers
            .get_mut(worker_id)
            .ok_or_else(|| SchedulerError::WorkerNotFound(worker_id.clone()))?;
        worker.last_heartbeat = Utc::now();
        Ok(())
    }

    /// Mark every worker whose last heartbeat is older than `timeout` as
    /// Offline and return their IDs.
    pub async fn check_heartbeat(&self, timeout: Duration) -> Vec<WorkerId> {
        let now = Utc::now();
        let mut workers = self.workers.write().await;
        let mut timed_out = Vec::new();

        for worker in workers.values_mut() {
            let stale = (now - worker.last_heartbeat)
                .to_std()
                .map(|elapsed| elapsed > timeout)
                .unwrap_or(false);
            if stale {
                if worker.status != WorkerStatus::Offline {
                    warn!(
                        worker_id = %worker.id,
                        last_heartbeat = %worker.last_heartbeat,
                        "Worker heartbeat timed out, marking offline"
                    );
                }
                worker.status = WorkerStatus::Offline;
                timed_out.push(worker.id.clone());
            }
        }

        timed_out
    }

    pub async fn count(&self) -> usize {
        self.workers.read().await.len()
    }

    pub async fn count_by_status(&self) -> HashMap<WorkerStatus, usize> {
        let mut counts = HashMap::new();
        for worker in self.workers.read().await.values() {
            *counts.entry(worker.status).or_insert(0) += 1;
        }
        counts
    }
}
