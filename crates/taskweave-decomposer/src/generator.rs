//! Pattern-based subtask generation.

use std::str::FromStr;

use taskweave_core::{Task, TaskId};

use crate::error::{DecomposeError, Result};
use crate::types::SubTask;

/// Default fan-out of the parallel pattern when the parent has no capabilities.
const DEFAULT_PARALLEL_WIDTH: usize = 3;

/// Shape of the generated subtask set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// prepare, execute, verify in sequence.
    Sequential,
    /// Independent subtasks, one per capability.
    Parallel,
    /// input, process, output in sequence.
    Pipeline,
}

impl FromStr for Pattern {
    type Err = DecomposeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sequential" => Ok(Self::Sequential),
            "parallel" => Ok(Self::Parallel),
            "pipeline" => Ok(Self::Pipeline),
            other => Err(DecomposeError::InvalidPattern(other.to_string())),
        }
    }
}

/// Generates subtasks with IDs `{parent}-sub-{n}` from a running counter.
#[derive(Debug, Default)]
pub struct SubTaskGenerator {
    counter: usize,
}

impl SubTaskGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self, parent: &TaskId) -> TaskId {
        self.counter += 1;
        TaskId::new(format!("{parent}-sub-{}", self.counter))
    }

    /// `count` sequential parts, each depending on the previous one.
    pub fn generate(&mut self, parent: &Task, count: usize) -> Result<Vec<SubTask>> {
        if count == 0 {
            return Err(DecomposeError::InvalidCount);
        }

        let parts = (1..=count)
            .map(|n| {
                let task_type = format!("{}_part_{n}", parent.task_type);
                SubTask::new(self.next_id(&parent.id), parent, task_type)
                    .with_description(format!("Part {n} of {}", parent.description))
            })
            .collect();
        Ok(chain(parts))
    }

    /// Generate by pattern name: `sequential`, `parallel` or `pipeline`.
    pub fn generate_with_pattern(&mut self, parent: &Task, pattern: &str) -> Result<Vec<SubTask>> {
        match pattern.parse::<Pattern>()? {
            Pattern::Sequential => {
                Ok(self.staged(parent, &["prepare", "execute", "verify"], "phase"))
            }
            Pattern::Pipeline => Ok(self.staged(parent, &["input", "process", "output"], "stage")),
            Pattern::Parallel => Ok(self.parallel(parent)),
        }
    }

    fn staged(&mut self, parent: &Task, names: &[&str], noun: &str) -> Vec<SubTask> {
        let stages = names
            .iter()
            .map(|name| {
                SubTask::new(self.next_id(&parent.id), parent, *name)
                    .with_description(format!("{name} {noun} of {}", parent.description))
            })
            .collect();
        chain(stages)
    }

    fn parallel(&mut self, parent: &Task) -> Vec<SubTask> {
        let width = if parent.required_capabilities.is_empty() {
            DEFAULT_PARALLEL_WIDTH
        } else {
            parent.required_capabilities.len()
        };

        (0..width)
            .map(|i| {
                let n = i + 1;
                let id = self.next_id(&parent.id);
                let mut sub = SubTask::new(id, parent, format!("parallel_{n}"))
                    .with_description(format!("Parallel task {n} of {}", parent.description));
                if let Some(cap) = parent.required_capabilities.get(i) {
                    sub = sub.with_capability(cap.clone());
                }
                sub
            })
            .collect()
    }
}

/// Make each subtask depend on the one before it and set levels to match.
fn chain(mut subs: Vec<SubTask>) -> Vec<SubTask> {
    for i in 1..subs.len() {
        let prev = subs[i - 1].id.clone();
        subs[i].dependencies = vec![prev];
        subs[i].level = i;
    }
    subs
}
