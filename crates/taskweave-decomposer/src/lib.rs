//! TaskWeave Decomposer
//!
//! Scores task complexity and splits complex tasks into subtasks whose
//! dependencies form an acyclic graph. Subtasks at the same graph level can
//! run in parallel; [`DecompositionResult::into_tasks`] turns them into
//! tasks ready for the scheduler.

pub mod analyzer;
pub mod decomposer;
pub mod error;
pub mod generator;
pub mod graph;
pub mod rules;
pub mod types;

pub use analyzer::{AnalysisReport, ComplexityAnalyzer, ComplexityWeights};
pub use decomposer::Decomposer;
pub use error::{DecomposeError, Result};
pub use generator::{Pattern, SubTaskGenerator};
pub use graph::{DependencyGraph, Edge, GraphNode};
pub use rules::DecompositionRule;
pub use types::{
    keys, DecomposerConfig, DecompositionResult, DecompositionStrategy, SubTask, TaskComplexity,
};
