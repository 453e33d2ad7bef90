//! Task allocator - picks a worker for a task under a configurable strategy.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use taskweave_core::{Task, TaskId, Worker, WorkerId};

use crate::directory::WorkerDirectory;
use crate::error::{Result, SchedulerError};

/// Tasks at or above this priority get the least-loaded worker under
/// [`AllocationStrategy::Priority`].
pub const HIGH_PRIORITY_THRESHOLD: i32 = 8;

/// How the allocator chooses among eligible workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationStrategy {
    /// Any available worker when nothing is required, else the least-loaded
    /// worker holding every required capability.
    Capability,
    /// Least-loaded eligible worker.
    #[default]
    LoadBalance,
    /// Least-loaded for urgent tasks, a near-average worker otherwise.
    Priority,
    /// Rotate through eligible workers.
    RoundRobin,
}

impl AllocationStrategy {
    pub const ALL: [AllocationStrategy; 4] = [
        Self::Capability,
        Self::LoadBalance,
        Self::Priority,
        Self::RoundRobin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Capability => "CAPABILITY",
            Self::LoadBalance => "LOAD_BALANCE",
            Self::Priority => "PRIORITY",
            Self::RoundRobin => "ROUND_ROBIN",
        }
    }
}

impl fmt::Display for AllocationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AllocationStrategy {
    type Err = SchedulerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| SchedulerError::UnknownStrategy(s.to_string()))
    }
}

/// Outcome of [`Allocator::batch_allocate`].
#[derive(Debug, Default)]
pub struct BatchAllocation {
    pub allocations: HashMap<TaskId, WorkerId>,
    pub failures: Vec<(TaskId, SchedulerError)>,
}

struct AllocatorState {
    strategy: AllocationStrategy,
    round_robin_index: usize,
}

/// Chooses workers from the directory. Selection is read-only; capacity is
/// claimed separately by the task manager.
pub struct Allocator {
    directory: Arc<WorkerDirectory>,
    state: RwLock<AllocatorState>,
}

impl Allocator {
    pub fn new(directory: Arc<WorkerDirectory>, strategy: AllocationStrategy) -> Self {
        Self {
            directory,
            state: RwLock::new(AllocatorState {
                strategy,
                round_robin_index: 0,
            }),
        }
    }

    pub async fn strategy(&self) -> AllocationStrategy {
        self.state.read().await.strategy
    }

    pub async fn set_strategy(&self, strategy: AllocationStrategy) {
        self.state.write().await.strategy = strategy;
        debug!(strategy = %strategy, "Allocation strategy changed");
    }

    /// Pick a worker for `task`.
    pub async fn allocate(&self, task: &Task) -> Result<WorkerId> {
        let mut state = self.state.write().await;
        self.allocate_locked(&mut state, task).await
    }

    /// Allocate each task in priority order under a single lock scope.
    ///
    /// Failures are collected per task; the batch is not atomic and no
    /// capacity is claimed.
    pub async fn batch_allocate(&self, tasks: &[Task]) -> BatchAllocation {
        let mut ordered: Vec<&Task> = tasks.iter().collect();
        ordered.sort_by_key(|task| Reverse(task.priority));

        let mut state = self.state.write().await;
        let mut outcome = BatchAllocation::default();
        for task in ordered {
            match self.allocate_locked(&mut state, task).await {
                Ok(worker_id) => {
                    outcome.allocations.insert(task.id.clone(), worker_id);
                }
                Err(e) => outcome.failures.push((task.id.clone(), e)),
            }
        }
        outcome
    }

    async fn allocate_locked(&self, state: &mut AllocatorState, task: &Task) -> Result<WorkerId> {
        let available = self.directory.find_available().await;
        let worker_id = select_worker(state, &available, task)?;
        debug!(
            task_id = %task.id,
            worker_id = %worker_id,
            strategy = %state.strategy,
            candidates = available.len(),
            "Allocated worker"
        );
        Ok(worker_id)
    }
}

fn select_worker(
    state: &mut AllocatorState,
    available: &[Worker],
    task: &Task,
) -> Result<WorkerId> {
    if available.is_empty() {
        return Err(SchedulerError::NoAvailableWorkers);
    }

    let capability_filtered = !task.required_capabilities.is_empty();
    let candidates: Vec<&Worker> = available
        .iter()
        .filter(|w| w.has_all_capabilities(&task.required_capabilities))
        .collect();
    if candidates.is_empty() {
        return Err(SchedulerError::NoMatchingCapabilities(
            task.required_capabilities.clone(),
        ));
    }

    let chosen = match state.strategy {
        AllocationStrategy::Capability if !capability_filtered => candidates[0],
        AllocationStrategy::Capability | AllocationStrategy::LoadBalance => {
            least_loaded(&candidates)
        }
        AllocationStrategy::Priority if task.priority >= HIGH_PRIORITY_THRESHOLD => {
            least_loaded(&candidates)
        }
        AllocationStrategy::Priority => balanced(&candidates),
        AllocationStrategy::RoundRobin => {
            let worker = candidates[state.round_robin_index % candidates.len()];
            state.round_robin_index = state.round_robin_index.wrapping_add(1);
            worker
        }
    };
    Ok(chosen.id.clone())
}

/// First worker with the strictly smallest blended load.
fn least_loaded<'a>(candidates: &[&'a Worker]) -> &'a Worker {
    let mut best = candidates[0];
    let mut best_load = best.blended_load();
    for worker in &candidates[1..] {
        let load = worker.blended_load();
        if load < best_load {
            best = *worker;
            best_load = load;
        }
    }
    best
}

/// Worker at or below the group's average load and closest to it.
fn balanced<'a>(candidates: &[&'a Worker]) -> &'a Worker {
    let average =
        candidates.iter().map(|w| w.blended_load()).sum::<f64>() / candidates.len() as f64;

    let mut selected = None;
    let mut min_diff = 100.0;
    for worker in candidates {
        let load = worker.blended_load();
        if load <= average {
            let diff = average - load;
            if diff < min_diff {
                min_diff = diff;
                selected = Some(*worker);
            }
        }
    }

    selected.unwrap_or_else(|| least_loaded(candidates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskweave_core::WorkerStatus;

    async fn directory_with(workers: Vec<Worker>) -> Arc<WorkerDirectory> {
        let dir = Arc::new(WorkerDirectory::new());
        for w in workers {
            dir.register(w).await.unwrap();
        }
        dir
    }

    fn worker(id: &str, caps: &[&str], load: f64) -> Worker {
        caps.iter()
            .fold(Worker::new(id, id).with_load(load), |w, c| w.with_capability(*c))
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!(
            "load_balance".parse::<AllocationStrategy>().unwrap(),
            AllocationStrategy::LoadBalance
        );
        assert_eq!(
            "Round-Robin".parse::<AllocationStrategy>().unwrap(),
            AllocationStrategy::RoundRobin
        );
        assert!(matches!(
            "fastest".parse::<AllocationStrategy>(),
            Err(SchedulerError::UnknownStrategy(_))
        ));
    }

    #[tokio::test]
    async fn test_no_workers() {
        let allocator = Allocator::new(
            Arc::new(WorkerDirectory::new()),
            AllocationStrategy::Capability,
        );
        let err = allocator.allocate(&Task::new("t", "x")).await.unwrap_err();
        assert!(matches!(err, SchedulerError::NoAvailableWorkers));
    }

    #[tokio::test]
    async fn test_capability_superset_required() {
        let dir = directory_with(vec![
            worker("w-1", &["rust"], 0.0),
            worker("w-2", &["rust", "review"], 0.9),
        ])
        .await;
        let allocator = Allocator::new(dir, AllocationStrategy::Capability);

        let task = Task::new("t", "code_review")
            .with_capability("rust")
            .with_capability("review");
        assert_eq!(allocator.allocate(&task).await.unwrap().as_str(), "w-2");

        let task = Task::new("t", "code_review").with_capability("java");
        let err = allocator.allocate(&task).await.unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::NoMatchingCapabilities(caps) if caps == vec!["java"]
        ));
    }

    #[tokio::test]
    async fn test_capability_without_requirements_takes_first() {
        let dir = directory_with(vec![
            worker("w-1", &["rust"], 0.9),
            worker("w-2", &["rust"], 0.0),
        ])
        .await;
        let allocator = Allocator::new(dir, AllocationStrategy::Capability);
        assert_eq!(
            allocator.allocate(&Task::new("t", "x")).await.unwrap().as_str(),
            "w-1"
        );
    }

    #[tokio::test]
    async fn test_load_balance_picks_minimum() {
        let dir = directory_with(vec![
            worker("w-1", &["rust"], 0.6),
            worker("w-2", &["rust"], 0.2),
            worker("w-3", &["rust"], 0.4),
        ])
        .await;
        let allocator = Allocator::new(Arc::clone(&dir), AllocationStrategy::LoadBalance);
        assert_eq!(
            allocator.allocate(&Task::new("t", "x")).await.unwrap().as_str(),
            "w-2"
        );

        // Slot usage counts too: w-2 at 5/10 has blended load 0.35.
        for _ in 0..5 {
            dir.increment_task_count(&WorkerId::new("w-2")).await.unwrap();
        }
        assert_eq!(
            allocator.allocate(&Task::new("t", "x")).await.unwrap().as_str(),
            "w-3"
        );
    }

    #[tokio::test]
    async fn test_unavailable_workers_skipped() {
        let dir = directory_with(vec![
            worker("w-1", &["rust"], 0.0),
            worker("w-2", &["rust"], 0.5),
        ])
        .await;
        dir.update_status(&WorkerId::new("w-1"), WorkerStatus::Offline)
            .await
            .unwrap();
        let allocator = Allocator::new(dir, AllocationStrategy::LoadBalance);
        assert_eq!(
            allocator.allocate(&Task::new("t", "x")).await.unwrap().as_str(),
            "w-2"
        );
    }

    #[tokio::test]
    async fn test_priority_strategy() {
        // Blended loads 0.05, 0.25, 0.45; average 0.25.
        let dir = directory_with(vec![
            worker("w-1", &["rust"], 0.1),
            worker("w-2", &["rust"], 0.5),
            worker("w-3", &["rust"], 0.9),
        ])
        .await;
        let allocator = Allocator::new(dir, AllocationStrategy::Priority);

        let urgent = Task::new("u", "x").with_priority(9);
        assert_eq!(allocator.allocate(&urgent).await.unwrap().as_str(), "w-1");

        let routine = Task::new("r", "x").with_priority(5);
        assert_eq!(allocator.allocate(&routine).await.unwrap().as_str(), "w-2");
    }

    #[tokio::test]
    async fn test_round_robin_covers_all() {
        let dir = directory_with(vec![
            worker("w-1", &["rust"], 0.0),
            worker("w-2", &["rust"], 0.0),
            worker("w-3", &["rust"], 0.0),
        ])
        .await;
        let allocator = Allocator::new(dir, AllocationStrategy::RoundRobin);

        let mut picked = Vec::new();
        for i in 0..6 {
            let id = allocator
                .allocate(&Task::new(format!("t-{i}"), "x"))
                .await
                .unwrap();
            picked.push(id.into_inner());
        }
        assert_eq!(picked, vec!["w-1", "w-2", "w-3", "w-1", "w-2", "w-3"]);
    }

    #[tokio::test]
    async fn test_batch_allocate_collects_failures() {
        let dir = directory_with(vec![worker("w-1", &["rust"], 0.0)]).await;
        let allocator = Allocator::new(dir, AllocationStrategy::LoadBalance);

        let tasks = vec![
            Task::new("low", "x").with_priority(1),
            Task::new("needs-go", "x").with_priority(9).with_capability("go"),
            Task::new("high", "x").with_priority(7),
        ];
        let outcome = allocator.batch_allocate(&tasks).await;

        assert_eq!(outcome.allocations.len(), 2);
        assert_eq!(outcome.allocations[&TaskId::new("low")].as_str(), "w-1");
        assert_eq!(outcome.allocations[&TaskId::new("high")].as_str(), "w-1");
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0.as_str(), "needs-go");
    }

    #[tokio::test]
    async fn test_batch_uses_round_robin_in_priority_order() {
        let dir = directory_with(vec![
            worker("w-1", &["rust"], 0.0),
            worker("w-2", &["rust"], 0.0),
        ])
        .await;
        let allocator = Allocator::new(dir, AllocationStrategy::RoundRobin);

        let tasks = vec![
            Task::new("low", "x").with_priority(1),
            Task::new("high", "x").with_priority(9),
        ];
        let outcome = allocator.batch_allocate(&tasks).await;
        assert_eq!(outcome.allocations[&TaskId::new("high")].as_str(), "w-1");
        assert_eq!(outcome.allocations[&TaskId::new("low")].as_str(), "w-2");
    }
}
