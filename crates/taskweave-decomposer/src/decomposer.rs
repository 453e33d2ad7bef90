//! Decomposer - splits a task into a dependency-ordered set of subtasks.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use taskweave_core::{Metadata, MetadataValue, Task, TaskId};

use crate::analyzer::ComplexityAnalyzer;
use crate::error::{DecomposeError, Result};
use crate::graph::DependencyGraph;
use crate::rules::{subtask_id, DecompositionRule};
use crate::types::{
    keys, DecomposerConfig, DecompositionResult, DecompositionStrategy, SubTask, TaskComplexity,
};

/// Weight of every edge the decomposer adds to a graph.
const EDGE_WEIGHT: i32 = 1;

/// Splits tasks according to a [`DecomposerConfig`] and an ordered rule table.
#[derive(Debug)]
pub struct Decomposer {
    config: DecomposerConfig,
    analyzer: ComplexityAnalyzer,
    rules: Vec<DecompositionRule>,
}

impl Default for Decomposer {
    fn default() -> Self {
        Self::new(DecomposerConfig::default())
    }
}

impl Decomposer {
    /// Create a decomposer with the default rules registered.
    pub fn new(config: DecomposerConfig) -> Self {
        Self {
            config,
            analyzer: ComplexityAnalyzer::new(),
            rules: DecompositionRule::defaults(),
        }
    }

    /// Append a rule. Rules are consulted in registration order.
    pub fn register_rule(&mut self, rule: DecompositionRule) {
        debug!(rule = rule.name(), "Registered decomposition rule");
        self.rules.push(rule);
    }

    pub fn config(&self) -> &DecomposerConfig {
        &self.config
    }

    pub fn analyzer(&self) -> &ComplexityAnalyzer {
        &self.analyzer
    }

    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(DecompositionRule::name)
    }

    /// Decompose with the configured strategy.
    pub fn decompose(&self, task: &Task) -> Result<DecompositionResult> {
        self.decompose_with_strategy(task, self.config.strategy)
    }

    pub fn decompose_with_strategy(
        &self,
        task: &Task,
        strategy: DecompositionStrategy,
    ) -> Result<DecompositionResult> {
        validate(task)?;

        if self.config.complexity_analysis {
            let complexity = self.analyzer.analyze(task);
            if complexity == TaskComplexity::Simple {
                debug!(task_id = %task.id, "Simple task, not splitting");
                return finish(task, vec![SubTask::from_task(task)], strategy);
            }
        }

        let sub_tasks = match strategy {
            DecompositionStrategy::Dependency => by_dependency(task),
            DecompositionStrategy::Priority => by_priority(task),
            DecompositionStrategy::Capability => by_capability(task),
            DecompositionStrategy::Hybrid => self.hybrid(task),
        };

        let result = finish(task, sub_tasks, strategy)?;
        info!(
            task_id = %task.id,
            strategy = %strategy,
            sub_tasks = result.sub_tasks.len(),
            max_level = result.max_level(),
            "Decomposed task"
        );
        Ok(result)
    }

    /// First rule that matches and yields subtasks, else a strategy chosen by
    /// complexity.
    fn hybrid(&self, task: &Task) -> Vec<SubTask> {
        for rule in self.rules.iter().filter(|rule| rule.matches(task)) {
            match rule.apply(task) {
                Ok(sub_tasks) if !sub_tasks.is_empty() => {
                    debug!(task_id = %task.id, rule = rule.name(), "Decomposition rule applied");
                    return sub_tasks;
                }
                Ok(_) => {
                    warn!(task_id = %task.id, rule = rule.name(), "Rule produced no subtasks");
                }
                Err(e) => {
                    warn!(task_id = %task.id, rule = rule.name(), error = %e, "Rule failed");
                }
            }
        }

        let complexity = self.analyzer.analyze(task);
        debug!(task_id = %task.id, complexity = %complexity, "No rule applied, falling back");
        match complexity {
            TaskComplexity::VeryComplex => by_dependency(task),
            TaskComplexity::Complex => by_capability(task),
            TaskComplexity::Moderate | TaskComplexity::Simple => by_priority(task),
        }
    }
}

fn validate(task: &Task) -> Result<()> {
    if task.id.is_empty() {
        return Err(DecomposeError::InvalidTask("task ID is required".into()));
    }
    if task.task_type.trim().is_empty() {
        return Err(DecomposeError::InvalidTask(format!(
            "task {} has no type",
            task.id
        )));
    }
    Ok(())
}

/// One subtask per dependency, then a main subtask waiting on all of them.
fn by_dependency(task: &Task) -> Vec<SubTask> {
    if task.dependencies.is_empty() {
        return vec![SubTask::from_task(task)];
    }

    let mut sub_tasks: Vec<SubTask> = task
        .dependencies
        .iter()
        .enumerate()
        .map(|(i, dep)| {
            SubTask::new(subtask_id(&task.id, i), task, format!("dependency_{i}"))
                .with_description(format!("Handle dependency: {dep}"))
                .with_dependency(dep.clone())
        })
        .collect();

    let mut main = SubTask::new(
        subtask_id(&task.id, task.dependencies.len()),
        task,
        task.task_type.clone(),
    )
    .with_description(task.description.clone())
    .with_level(1);
    main.dependencies = sub_tasks.iter().map(|s| s.id.clone()).collect();
    main.capabilities = task.required_capabilities.clone();
    main.requirements = task.requirements.clone();

    sub_tasks.push(main);
    sub_tasks
}

/// Preparation, execution and verification, each waiting on the previous.
fn by_priority(task: &Task) -> Vec<SubTask> {
    let phases = [
        ("preparation", task.priority.saturating_sub(1)),
        ("execution", task.priority),
        ("verification", task.priority.saturating_add(1)),
    ];

    let mut sub_tasks: Vec<SubTask> = Vec::with_capacity(phases.len());
    for (i, (phase, priority)) in phases.into_iter().enumerate() {
        let mut sub = SubTask::new(subtask_id(&task.id, i), task, phase)
            .with_description(format!("{phase} phase of {}", task.description))
            .with_priority(priority)
            .with_level(i);
        if let Some(prev) = sub_tasks.last() {
            sub = sub.with_dependency(prev.id.clone());
        }
        sub_tasks.push(sub);
    }
    sub_tasks
}

/// One subtask per capability, then an aggregate waiting on all of them.
fn by_capability(task: &Task) -> Vec<SubTask> {
    if task.required_capabilities.is_empty() {
        return vec![SubTask::from_task(task)];
    }

    let mut sub_tasks: Vec<SubTask> = task
        .required_capabilities
        .iter()
        .enumerate()
        .map(|(i, cap)| {
            SubTask::new(subtask_id(&task.id, i), task, format!("capability_{cap}"))
                .with_description(format!("Execute {cap} capability for {}", task.description))
                .with_capability(cap.clone())
        })
        .collect();

    let mut aggregate = SubTask::new(
        subtask_id(&task.id, task.required_capabilities.len()),
        task,
        "aggregate",
    )
    .with_description(format!("Aggregate results for {}", task.description))
    .with_priority(task.priority.saturating_add(1))
    .with_level(1);
    aggregate.dependencies = sub_tasks.iter().map(|s| s.id.clone()).collect();

    sub_tasks.push(aggregate);
    sub_tasks
}

/// Build the graph, reject cycles, write levels back and assemble the result.
///
/// Dependencies on IDs outside the subtask set are external: they stay on the
/// subtask but add no node or edge to the graph.
fn finish(
    task: &Task,
    mut sub_tasks: Vec<SubTask>,
    strategy: DecompositionStrategy,
) -> Result<DecompositionResult> {
    let in_set: HashSet<TaskId> = sub_tasks.iter().map(|s| s.id.clone()).collect();

    let mut graph = DependencyGraph::new();
    let mut external = 0usize;
    for sub in &sub_tasks {
        graph.add_node(sub.id.clone());
    }
    for sub in &sub_tasks {
        for dep in &sub.dependencies {
            if in_set.contains(dep) {
                graph.add_edge(dep.clone(), sub.id.clone(), EDGE_WEIGHT);
            } else {
                external += 1;
            }
        }
    }

    graph.calculate_levels()?;
    for sub in &mut sub_tasks {
        sub.level = graph.level(&sub.id).unwrap_or(0);
    }

    let max_level = sub_tasks.iter().map(|s| s.level).max().unwrap_or(0);
    let mut metadata = Metadata::new();
    metadata.insert(keys::SUB_TASK_COUNT.into(), MetadataValue::from(sub_tasks.len()));
    metadata.insert(keys::MAX_LEVEL.into(), MetadataValue::from(max_level));
    metadata.insert(
        keys::EXTERNAL_DEPENDENCY_COUNT.into(),
        MetadataValue::from(external),
    );

    debug!(
        task_id = %task.id,
        nodes = graph.len(),
        edges = graph.edges().len(),
        external_dependencies = external,
        "Built dependency graph"
    );

    Ok(DecompositionResult {
        original_task: task.clone(),
        sub_tasks,
        graph,
        strategy,
        metadata,
    })
}
