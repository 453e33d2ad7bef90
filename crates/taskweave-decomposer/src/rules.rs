//! Decomposition rules consulted by the hybrid strategy.

use std::fmt;

use uuid::Uuid;

use taskweave_core::{Task, TaskId};

use crate::error::Result;
use crate::types::SubTask;

type Condition = Box<dyn Fn(&Task) -> bool + Send + Sync>;
type Transform = Box<dyn Fn(&Task) -> Result<Vec<SubTask>> + Send + Sync>;

/// A named `(condition, transform)` pair.
///
/// Rules are evaluated in registration order; the first rule whose condition
/// holds and whose transform yields at least one subtask wins.
pub struct DecompositionRule {
    name: String,
    condition: Condition,
    transform: Transform,
}

impl DecompositionRule {
    pub fn new<C, T>(name: impl Into<String>, condition: C, transform: T) -> Self
    where
        C: Fn(&Task) -> bool + Send + Sync + 'static,
        T: Fn(&Task) -> Result<Vec<SubTask>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            condition: Box::new(condition),
            transform: Box::new(transform),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, task: &Task) -> bool {
        (self.condition)(task)
    }

    pub fn apply(&self, task: &Task) -> Result<Vec<SubTask>> {
        (self.transform)(task)
    }

    /// `code_review` tasks: syntax check first, then quality and security
    /// checks in parallel.
    pub fn code_review() -> Self {
        Self::new(
            "code_review",
            |task| task.task_type == "code_review",
            |task| {
                let syntax = SubTask::new(subtask_id(&task.id, 0), task, "syntax_check")
                    .with_description("Check code syntax")
                    .with_capability("syntax_analysis");
                let quality = SubTask::new(subtask_id(&task.id, 1), task, "quality_check")
                    .with_description("Check code quality")
                    .with_capability("quality_analysis")
                    .with_dependency(syntax.id.clone())
                    .with_level(1);
                let security = SubTask::new(subtask_id(&task.id, 2), task, "security_check")
                    .with_description("Check code security")
                    .with_capability("security_analysis")
                    .with_dependency(syntax.id.clone())
                    .with_level(1);
                Ok(vec![syntax, quality, security])
            },
        )
    }

    /// Document tasks (type contains `doc`): parse, analyze, summarize.
    pub fn document_processing() -> Self {
        Self::new(
            "document_processing",
            |task| task.task_type == "document_processing" || task.task_type.contains("doc"),
            |task| {
                let parse = SubTask::new(subtask_id(&task.id, 0), task, "parse")
                    .with_description("Parse document")
                    .with_capability("document_parsing");
                let analyze = SubTask::new(subtask_id(&task.id, 1), task, "analyze")
                    .with_description("Analyze document content")
                    .with_capability("content_analysis")
                    .with_dependency(parse.id.clone())
                    .with_level(1);
                let summarize = SubTask::new(subtask_id(&task.id, 2), task, "summarize")
                    .with_description("Generate document summary")
                    .with_capability("summarization")
                    .with_dependency(analyze.id.clone())
                    .with_level(2);
                Ok(vec![parse, analyze, summarize])
            },
        )
    }

    /// Rules registered on every new decomposer.
    pub fn defaults() -> Vec<Self> {
        vec![Self::code_review(), Self::document_processing()]
    }
}

impl fmt::Debug for DecompositionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecompositionRule")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// `{parent}-sub-{index}-{8 hex chars}`.
pub fn subtask_id(parent: &TaskId, index: usize) -> TaskId {
    let suffix = Uuid::new_v4().simple().to_string();
    TaskId::new(format!("{parent}-sub-{index}-{}", &suffix[..8]))
}
