//! TaskWeave Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Async runtimes or locking
//! - Transport/wire formats
//! - Scheduling policy
//!
//! Scheduling lives in `taskweave-scheduler`, decomposition in
//! `taskweave-decomposer`; both build on the types here.

pub mod error;
pub mod ids;
pub mod metadata;
pub mod status;
pub mod task;
pub mod worker;

// Re-export commonly used types
pub use error::CoreError;
pub use ids::{TaskId, WorkerId};
pub use metadata::{Metadata, MetadataValue};
pub use status::{TaskStatus, WorkerStatus};
pub use task::{Task, DEFAULT_PRIORITY};
pub use worker::{Worker, DEFAULT_MAX_TASKS};
