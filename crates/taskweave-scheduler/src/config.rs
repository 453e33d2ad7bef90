//! Scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::allocator::AllocationStrategy;

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum queued tasks; 0 disables the bound.
    pub max_queue_size: usize,

    /// Initial allocation strategy.
    pub allocation_strategy: AllocationStrategy,

    /// How often worker heartbeats are checked (seconds).
    pub heartbeat_interval_secs: u64,

    /// Heartbeat age after which a worker is marked offline (seconds).
    pub heartbeat_timeout_secs: u64,

    /// Number of concurrent assignment loops.
    pub worker_count: usize,

    /// How long an assignment loop waits on an empty queue (milliseconds).
    pub dequeue_timeout_ms: u64,

    /// Back-off after a failed assignment (milliseconds).
    pub retry_delay_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            allocation_strategy: AllocationStrategy::LoadBalance,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            worker_count: 5,
            dequeue_timeout_ms: 5000,
            retry_delay_ms: 1000,
        }
    }
}

impl SchedulerConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: SchedulerConfig =
            serde_json::from_str(r#"{"allocation_strategy": "ROUND_ROBIN", "worker_count": 2}"#)
                .unwrap();
        assert_eq!(config.allocation_strategy, AllocationStrategy::RoundRobin);
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.max_queue_size, 1000);
        assert_eq!(config.heartbeat_timeout(), Duration::from_secs(90));
    }
}
