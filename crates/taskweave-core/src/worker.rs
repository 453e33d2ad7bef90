//! Worker types.

use crate::{Metadata, MetadataValue, WorkerId, WorkerStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Capacity assigned at registration when a worker reports `max_tasks = 0`.
pub const DEFAULT_MAX_TASKS: u32 = 10;

/// A worker agent able to execute tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    /// Unique worker identifier.
    pub id: WorkerId,

    /// Display name.
    pub name: String,

    /// Capabilities this worker offers.
    pub capabilities: BTreeSet<String>,

    /// Current worker status.
    #[serde(default)]
    pub status: WorkerStatus,

    /// Externally reported load in `[0, 1]`.
    #[serde(default)]
    pub load: f64,

    /// Maximum concurrent tasks.
    #[serde(default)]
    pub max_tasks: u32,

    /// Tasks currently bound to this worker.
    #[serde(default)]
    pub current_tasks: u32,

    /// Worker metadata.
    #[serde(default)]
    pub metadata: Metadata,

    /// When the worker joined the directory.
    #[serde(default = "Utc::now")]
    pub registered_at: DateTime<Utc>,

    /// Last heartbeat received.
    #[serde(default = "Utc::now")]
    pub last_heartbeat: DateTime<Utc>,
}

impl Worker {
    /// Create an idle worker with default capacity and no capabilities.
    pub fn new(id: impl Into<WorkerId>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            capabilities: BTreeSet::new(),
            status: WorkerStatus::Idle,
            load: 0.0,
            max_tasks: DEFAULT_MAX_TASKS,
            current_tasks: 0,
            metadata: Metadata::new(),
            registered_at: now,
            last_heartbeat: now,
        }
    }

    /// Builder method to add a capability.
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    /// Builder method to set capacity.
    pub fn with_max_tasks(mut self, max_tasks: u32) -> Self {
        self.max_tasks = max_tasks;
        self
    }

    /// Builder method to set the reported load.
    pub fn with_load(mut self, load: f64) -> Self {
        self.load = load;
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

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    /// True if every listed capability is offered. An empty list always matches.
    pub fn has_all_capabilities(&self, required: &[String]) -> bool {
        required.iter().all(|cap| self.capabilities.contains(cap))
    }

    /// Idle and below capacity.
    pub fn is_available(&self) -> bool {
        self.status.can_accept_tasks() && self.current_tasks < self.max_tasks
    }

    /// Average of the reported load and the slot utilisation.
    pub fn blended_load(&self) -> f64 {
        let utilisation = if self.max_tasks == 0 {
            1.0
        } else {
            f64::from(self.current_tasks) / f64::from(self.max_tasks)
        };
        (self.load + utilisation) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_matching() {
        let worker = Worker::new("w-1", "alpha")
            .with_capability("rust")
            .with_capability("review");

        assert!(worker.has_capability("rust"));
        assert!(!worker.has_capability("python"));
        assert!(worker.has_all_capabilities(&["rust".into(), "review".into()]));
        assert!(!worker.has_all_capabilities(&["rust".into(), "python".into()]));
        assert!(worker.has_all_capabilities(&[]));
    }

    #[test]
    fn test_blended_load() {
        let mut worker = Worker::new("w-1", "alpha").with_max_tasks(4).with_load(0.5);
        worker.current_tasks = 2;
        assert!((worker.blended_load() - 0.5).abs() < f64::EPSILON);

        worker.load = 0.0;
        worker.current_tasks = 0;
        assert_eq!(worker.blended_load(), 0.0);
    }

    #[test]
    fn test_availability() {
        let mut worker = Worker::new("w-1", "alpha").with_max_tasks(1);
        assert!(worker.is_available());

        worker.current_tasks = 1;
        assert!(!worker.is_available());

        worker.current_tasks = 0;
        worker.status = WorkerStatus::Maintenance;
        assert!(!worker.is_available());
    }
}
