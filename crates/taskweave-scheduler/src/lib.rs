//! TaskWeave Scheduler
//!
//! In-memory scheduling engine: a worker directory, a priority task queue,
//! a strategy-driven allocator and the task lifecycle manager that ties
//! allocation to worker capacity. [`Scheduler`] bundles them and runs the
//! background assignment and heartbeat loops.
//!
//! Lock order across components is manager, then allocator, then directory.
//! The queue's lock is never held while another component's lock is taken.

pub mod allocator;
pub mod config;
pub mod directory;
pub mod error;
pub mod manager;
pub mod queue;
pub mod scheduler;
pub mod transport;

pub use allocator::{AllocationStrategy, Allocator, BatchAllocation};
pub use config::SchedulerConfig;
pub use directory::WorkerDirectory;
pub use error::{Result, SchedulerError};
pub use manager::TaskManager;
pub use queue::TaskQueue;
pub use scheduler::{Scheduler, Statistics};
pub use transport::{ChannelTransport, ExecutionTransport, TaskAssignment, TransportError};
