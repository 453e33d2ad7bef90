//! Priority task queue.
//!
//! Tasks are ranked by `(priority desc, arrival asc)`. The ranking key is
//! `(Reverse(priority), sequence)` in an ordered map, so the head of the map
//! is always the next task to dequeue.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tokio::sync::{Notify, RwLock};
use tokio::time::Instant;
use tracing::debug;

use taskweave_core::{Task, TaskId};

use crate::error::{Result, SchedulerError};

type RankKey = (Reverse<i32>, u64);

#[derive(Default)]
struct QueueState {
    entries: BTreeMap<RankKey, Task>,
    index: HashMap<TaskId, RankKey>,
    next_seq: u64,
}

impl QueueState {
    fn pop_front(&mut self) -> Option<Task> {
        let (_, task) = self.entries.pop_first()?;
        self.index.remove(&task.id);
        Some(task)
    }
}

/// Bounded or unbounded priority queue of pending tasks.
pub struct TaskQueue {
    state: RwLock<QueueState>,
    capacity: Option<usize>,
    not_empty: Notify,
}

impl TaskQueue {
    /// Queue that rejects enqueues beyond `capacity` tasks.
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity))
    }

    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    /// Build from a configured size where `0` means unbounded.
    pub fn from_max_size(max_size: usize) -> Self {
        if max_size == 0 {
            Self::unbounded()
        } else {
            Self::bounded(max_size)
        }
    }

    fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            state: RwLock::new(QueueState::default()),
            capacity,
            not_empty: Notify::new(),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub async fn enqueue(&self, task: Task) -> Result<()> {
        let mut state = self.state.write().await;

        if let Some(capacity) = self.capacity {
            if state.entries.len() >= capacity {
                return Err(SchedulerError::QueueFull { capacity });
            }
        }
        if state.index.contains_key(&task.id) {
            return Err(SchedulerError::DuplicateTask(task.id));
        }

        let key = (Reverse(task.priority), state.next_seq);
        state.next_seq += 1;
        debug!(task_id = %task.id, priority = task.priority, "Task enqueued");
        state.index.insert(task.id.clone(), key);
        state.entries.insert(key, task);
        drop(state);

        self.not_empty.notify_one();
        Ok(())
    }

    pub async fn dequeue(&self) -> Result<Task> {
        let task = self
            .state
            .write()
            .await
            .pop_front()
            .ok_or(SchedulerError::QueueEmpty)?;
        debug!(task_id = %task.id, "Task dequeued");
        Ok(task)
    }

    /// Dequeue the head task, waiting up to `timeout` for one to arrive.
    ///
    /// A zero timeout makes a single attempt.
    pub async fn dequeue_wait(&self, timeout: Duration) -> Result<Task> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(task) = self.state.write().await.pop_front() {
                debug!(task_id = %task.id, "Task dequeued after wait");
                return Ok(task);
            }
            if tokio::time::timeout_at(deadline, self.not_empty.notified())
                .await
                .is_err()
            {
                return Err(SchedulerError::Timeout(timeout));
            }
        }
    }

    /// Clone of the head task without removing it.
    pub async fn peek(&self) -> Result<Task> {
        self.state
            .read()
            .await
            .entries
            .values()
            .next()
            .cloned()
            .ok_or(SchedulerError::QueueEmpty)
    }

    pub async fn remove(&self, task_id: &TaskId) -> Result<Task> {
        let mut state = self.state.write().await;
        let key = state
            .index
            .remove(task_id)
            .ok_or_else(|| SchedulerError::TaskNotFound(task_id.clone()))?;
        let task = state
            .entries
            .remove(&key)
            .ok_or_else(|| SchedulerError::TaskNotFound(task_id.clone()))?;
        debug!(task_id = %task_id, "Task removed from queue");
        Ok(task)
    }

    pub async fn contains(&self, task_id: &TaskId) -> bool {
        self.state.read().await.index.contains_key(task_id)
    }

    pub async fn size(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.size().await == 0
    }

    pub async fn is_full(&self) -> bool {
        match self.capacity {
            Some(capacity) => self.size().await >= capacity,
            None => false,
        }
    }

    /// Snapshot in dequeue order.
    pub async fn list(&self) -> Vec<Task> {
        self.state.read().await.entries.values().cloned().collect()
    }

    /// Queued tasks with `priority >= min_priority`, in dequeue order.
    pub async fn list_min_priority(&self, min_priority: i32) -> Vec<Task> {
        self.state
            .read()
            .await
            .entries
            .values()
            .take_while(|task| task.priority >= min_priority)
            .cloned()
            .collect()
    }

    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.entries.clear();
        state.index.clear();
        debug!("Queue cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn task(id: &str, priority: i32) -> Task {
        Task::new(id, "calculation").with_priority(priority)
    }

    #[tokio::test]
    async fn test_priority_order() {
        let queue = TaskQueue::unbounded();
        for (id, p) in [("a", 5), ("b", 10), ("c", 3), ("d", 8)] {
            queue.enqueue(task(id, p)).await.unwrap();
        }

        let mut priorities = Vec::new();
        while let Ok(t) = queue.dequeue().await {
            priorities.push(t.priority);
        }
        assert_eq!(priorities, vec![10, 8, 5, 3]);
    }

    #[tokio::test]
    async fn test_equal_priority_is_fifo() {
        let queue = TaskQueue::unbounded();
        for id in ["first", "second", "third"] {
            queue.enqueue(task(id, 5)).await.unwrap();
        }
        queue.enqueue(task("urgent", 6)).await.unwrap();

        let order: Vec<String> = queue
            .list()
            .await
            .into_iter()
            .map(|t| t.id.into_inner())
            .collect();
        assert_eq!(order, vec!["urgent", "first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_bounded_queue_rejects_when_full() {
        let queue = TaskQueue::bounded(2);
        queue.enqueue(task("a", 1)).await.unwrap();
        queue.enqueue(task("b", 1)).await.unwrap();
        assert!(queue.is_full().await);

        let err = queue.enqueue(task("c", 1)).await.unwrap_err();
        assert!(matches!(err, SchedulerError::QueueFull { capacity: 2 }));
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let queue = TaskQueue::unbounded();
        queue.enqueue(task("a", 1)).await.unwrap();
        let err = queue.enqueue(task("a", 9)).await.unwrap_err();
        assert!(matches!(err, SchedulerError::DuplicateTask(_)));
        assert_eq!(queue.size().await, 1);
    }

    #[tokio::test]
    async fn test_empty_queue_errors() {
        let queue = TaskQueue::from_max_size(0);
        assert_eq!(queue.capacity(), None);
        assert!(matches!(queue.dequeue().await, Err(SchedulerError::QueueEmpty)));
        assert!(matches!(queue.peek().await, Err(SchedulerError::QueueEmpty)));
    }

    #[tokio::test]
    async fn test_remove_and_contains() {
        let queue = TaskQueue::unbounded();
        queue.enqueue(task("a", 1)).await.unwrap();
        queue.enqueue(task("b", 2)).await.unwrap();

        let removed = queue.remove(&TaskId::new("b")).await.unwrap();
        assert_eq!(removed.id.as_str(), "b");
        assert!(!queue.contains(&TaskId::new("b")).await);
        assert!(queue.contains(&TaskId::new("a")).await);
        assert!(matches!(
            queue.remove(&TaskId::new("b")).await,
            Err(SchedulerError::TaskNotFound(_))
        ));

        // A removed ID may be enqueued again.
        queue.enqueue(task("b", 2)).await.unwrap();
        assert_eq!(queue.peek().await.unwrap().id.as_str(), "b");
    }

    #[tokio::test]
    async fn test_list_min_priority() {
        let queue = TaskQueue::unbounded();
        for (id, p) in [("a", 5), ("b", 10), ("c", 3), ("d", 8)] {
            queue.enqueue(task(id, p)).await.unwrap();
        }
        let high: Vec<i32> = queue
            .list_min_priority(5)
            .await
            .iter()
            .map(|t| t.priority)
            .collect();
        assert_eq!(high, vec![10, 8, 5]);

        queue.clear().await;
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_dequeue_wait_times_out() {
        let queue = TaskQueue::unbounded();
        let err = queue
            .dequeue_wait(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_dequeue_wait_wakes_on_enqueue() {
        let queue = Arc::new(TaskQueue::unbounded());
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue_wait(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(task("late", 1)).await.unwrap();

        let got = waiter.await.unwrap().unwrap();
        assert_eq!(got.id.as_str(), "late");
        assert!(queue.is_empty().await);
    }
}
