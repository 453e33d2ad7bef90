//! Complexity analyzer - scores tasks and recommends how to split them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use taskweave_core::{Task, TaskId};

use crate::types::{DecompositionStrategy, TaskComplexity};

/// Base complexity of task types missing from the type table.
pub const DEFAULT_TYPE_COMPLEXITY: f64 = 2.0;

const TYPE_COMPLEXITY: &[(&str, f64)] = &[
    ("code_review", 3.0),
    ("refactoring", 4.0),
    ("system_design", 5.0),
    ("data_analysis", 3.5),
    ("document_processing", 2.5),
    ("simple_query", 1.0),
    ("calculation", 1.5),
];

/// Weights applied to each scoring term.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComplexityWeights {
    pub dependency: f64,
    pub capability: f64,
    pub requirement: f64,
    pub task_type: f64,
}

impl Default for ComplexityWeights {
    fn default() -> Self {
        Self {
            dependency: 0.3,
            capability: 0.3,
            requirement: 0.2,
            task_type: 0.2,
        }
    }
}

/// Analysis summary for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub task_id: TaskId,
    pub complexity: TaskComplexity,
    pub score: f64,
    pub recommended_strategy: DecompositionStrategy,
    pub estimated_sub_tasks: usize,
    pub factors: BTreeMap<String, f64>,
    pub recommendations: Vec<String>,
}

/// Counts above `soft_cap` grow at `rate` per unit.
fn damped(count: usize, soft_cap: f64, rate: f64) -> f64 {
    let count = count as f64;
    if count > soft_cap {
        soft_cap + (count - soft_cap) * rate
    } else {
        count
    }
}

#[derive(Debug, Clone, Default)]
pub struct ComplexityAnalyzer {
    weights: ComplexityWeights,
}

impl ComplexityAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(weights: ComplexityWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ComplexityWeights {
        &self.weights
    }

    /// Base complexity of a task type.
    pub fn type_complexity(&self, task_type: &str) -> f64 {
        TYPE_COMPLEXITY
            .iter()
            .find(|(name, _)| *name == task_type)
            .map(|(_, c)| *c)
            .unwrap_or(DEFAULT_TYPE_COMPLEXITY)
    }

    /// Weighted complexity score.
    pub fn score(&self, task: &Task) -> f64 {
        let w = &self.weights;
        let deps = damped(task.dependencies.len(), 5.0, 0.5);
        let caps = damped(task.required_capabilities.len(), 3.0, 0.5);
        let reqs = damped(task.requirements.len(), 5.0, 0.3);
        let kind = self.type_complexity(&task.task_type);

        deps * w.dependency * 10.0
            + caps * w.capability * 10.0
            + reqs * w.requirement * 10.0
            + kind * w.task_type * 10.0
    }

    pub fn analyze(&self, task: &Task) -> TaskComplexity {
        Self::classify(self.score(task))
    }

    /// Map a score onto a complexity band. A score of exactly 2.0 (an
    /// otherwise bare `simple_query`) is still Simple.
    pub fn classify(score: f64) -> TaskComplexity {
        if score >= 8.0 {
            TaskComplexity::VeryComplex
        } else if score >= 5.0 {
            TaskComplexity::Complex
        } else if score > 2.0 {
            TaskComplexity::Moderate
        } else {
            TaskComplexity::Simple
        }
    }

    /// Coarse band from raw counts alone, ignoring weights and task type.
    pub fn quick_complexity(task: &Task) -> TaskComplexity {
        let mut points = 0;
        points += match task.dependencies.len() {
            n if n > 5 => 2,
            n if n > 2 => 1,
            _ => 0,
        };
        points += match task.required_capabilities.len() {
            n if n > 3 => 2,
            n if n > 1 => 1,
            _ => 0,
        };
        if task.requirements.len() > 5 {
            points += 1;
        }

        match points {
            p if p >= 4 => TaskComplexity::VeryComplex,
            3 => TaskComplexity::Complex,
            p if p >= 1 => TaskComplexity::Moderate,
            _ => TaskComplexity::Simple,
        }
    }

    /// Worth splitting: the count-based band is at least Moderate.
    pub fn is_decomposable(task: &Task) -> bool {
        Self::quick_complexity(task) >= TaskComplexity::Moderate
    }

    pub fn recommended_strategy(&self, task: &Task) -> DecompositionStrategy {
        match self.analyze(task) {
            TaskComplexity::VeryComplex => DecompositionStrategy::Hybrid,
            TaskComplexity::Complex if !task.dependencies.is_empty() => {
                DecompositionStrategy::Dependency
            }
            TaskComplexity::Complex => DecompositionStrategy::Capability,
            TaskComplexity::Moderate if !task.required_capabilities.is_empty() => {
                DecompositionStrategy::Capability
            }
            TaskComplexity::Moderate | TaskComplexity::Simple => DecompositionStrategy::Priority,
        }
    }

    pub fn estimate_subtask_count(&self, task: &Task) -> usize {
        let base = match self.analyze(task) {
            TaskComplexity::Simple => 1,
            TaskComplexity::Moderate => 3,
            TaskComplexity::Complex => 5,
            TaskComplexity::VeryComplex => 8,
        };
        base + task.dependencies.len() / 2 + task.required_capabilities.len().saturating_sub(1)
    }

    pub fn report(&self, task: &Task) -> AnalysisReport {
        let complexity = self.analyze(task);

        let factors = BTreeMap::from([
            ("dependencies".to_string(), task.dependencies.len() as f64),
            (
                "capabilities".to_string(),
                task.required_capabilities.len() as f64,
            ),
            ("requirements".to_string(), task.requirements.len() as f64),
            (
                "type_complexity".to_string(),
                self.type_complexity(&task.task_type),
            ),
        ]);

        let mut recommendations = Vec::new();
        if task.dependencies.len() > 5 {
            recommendations.push(
                "Consider reducing task dependencies or grouping related dependencies".to_string(),
            );
        }
        if task.required_capabilities.len() > 3 {
            recommendations.push(
                "Task requires multiple capabilities, consider capability-based decomposition"
                    .to_string(),
            );
        }
        if complexity == TaskComplexity::VeryComplex {
            recommendations.push(
                "Very complex task detected, recommend breaking down into multiple stages"
                    .to_string(),
            );
        }

        AnalysisReport {
            task_id: task.id.clone(),
            complexity,
            score: self.score(task),
            recommended_strategy: self.recommended_strategy(task),
            estimated_sub_tasks: self.estimate_subtask_count(task),
            factors,
            recommendations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_type_table() {
        let analyzer = ComplexityAnalyzer::new();
        assert_eq!(analyzer.type_complexity("system_design"), 5.0);
        assert_eq!(analyzer.type_complexity("calculation"), 1.5);
        assert_eq!(analyzer.type_complexity("unheard_of"), DEFAULT_TYPE_COMPLEXITY);
    }

    #[test]
    fn test_bare_simple_query_is_simple() {
        let analyzer = ComplexityAnalyzer::new();
        let task = Task::new("t", "simple_query");
        assert!(approx(analyzer.score(&task), 2.0));
        assert_eq!(analyzer.analyze(&task), TaskComplexity::Simple);
        assert_eq!(analyzer.recommended_strategy(&task), DecompositionStrategy::Priority);
        assert_eq!(analyzer.estimate_subtask_count(&task), 1);
    }

    #[test]
    fn test_diminishing_returns() {
        let analyzer = ComplexityAnalyzer::new();
        // 7 deps -> 5 + 2 * 0.5 = 6 units; 6 * 0.3 * 10 = 18. Type term 4.0.
        let task = (0..7).fold(Task::new("t", "x"), |t, i| t.with_dependency(format!("d{i}")));
        assert!(approx(analyzer.score(&task), 22.0));

        // 5 caps -> 3 + 2 * 0.5 = 4 units; 4 * 0.3 * 10 = 12. Type term 4.0.
        let task = (0..5).fold(Task::new("t", "x"), |t, i| t.with_capability(format!("c{i}")));
        assert!(approx(analyzer.score(&task), 16.0));

        // 10 reqs -> 5 + 5 * 0.3 = 6.5 units; 6.5 * 0.2 * 10 = 13. Type term 4.0.
        let task = (0..10).fold(Task::new("t", "x"), |t, i| {
            t.with_requirement(format!("r{i}"), true)
        });
        assert!(approx(analyzer.score(&task), 17.0));
    }

    #[test]
    fn test_custom_weights() {
        let weights = ComplexityWeights {
            dependency: 0.0,
            capability: 1.0,
            requirement: 0.0,
            task_type: 0.0,
        };
        let analyzer = ComplexityAnalyzer::with_weights(weights);
        assert_eq!(analyzer.weights(), &weights);

        let task = Task::new("t", "system_design")
            .with_dependency("d")
            .with_capability("a")
            .with_capability("b");
        assert!(approx(analyzer.score(&task), 20.0));
        assert_eq!(analyzer.analyze(&task), TaskComplexity::VeryComplex);
    }

    #[test]
    fn test_quick_complexity_counts() {
        let plain = Task::new("t", "system_design");
        assert_eq!(ComplexityAnalyzer::quick_complexity(&plain), TaskComplexity::Simple);
        assert!(!ComplexityAnalyzer::is_decomposable(&plain));

        let deps = (0..3).fold(Task::new("t", "x"), |t, i| t.with_dependency(format!("d{i}")));
        assert_eq!(ComplexityAnalyzer::quick_complexity(&deps), TaskComplexity::Moderate);
        assert!(ComplexityAnalyzer::is_decomposable(&deps));

        let mixed = deps.clone().with_capability("a").with_capability("b");
        let mixed = (0..6).fold(mixed, |t, i| t.with_requirement(format!("r{i}"), true));
        assert_eq!(ComplexityAnalyzer::quick_complexity(&mixed), TaskComplexity::Complex);

        let wide = (0..6).fold(Task::new("t", "x"), |t, i| t.with_dependency(format!("d{i}")));
        let wide = (0..4).fold(wide, |t, i| t.with_capability(format!("c{i}")));
        assert_eq!(ComplexityAnalyzer::quick_complexity(&wide), TaskComplexity::VeryComplex);
    }

    #[test]
    fn test_thresholds() {
        assert_eq!(ComplexityAnalyzer::classify(1.9), TaskComplexity::Simple);
        assert_eq!(ComplexityAnalyzer::classify(2.0), TaskComplexity::Simple);
        assert_eq!(ComplexityAnalyzer::classify(2.1), TaskComplexity::Moderate);
        assert_eq!(ComplexityAnalyzer::classify(5.0), TaskComplexity::Complex);
        assert_eq!(ComplexityAnalyzer::classify(7.99), TaskComplexity::Complex);
        assert_eq!(ComplexityAnalyzer::classify(8.0), TaskComplexity::VeryComplex);
    }

    #[test]
    fn test_bands_for_typical_tasks() {
        let analyzer = ComplexityAnalyzer::new();
        // 1.5 * 2 = 3.0
        assert_eq!(
            analyzer.analyze(&Task::new("t", "calculation")),
            TaskComplexity::Moderate
        );
        // 3.0 * 2 + 3 = 9.0
        let review = Task::new("t", "code_review").with_capability("rust");
        assert_eq!(analyzer.analyze(&review), TaskComplexity::VeryComplex);
        // 1.0 * 2 + 3 = 5.0
        let query = Task::new("t", "simple_query").with_dependency("d");
        assert_eq!(analyzer.analyze(&query), TaskComplexity::Complex);
        assert_eq!(analyzer.recommended_strategy(&query), DecompositionStrategy::Dependency);
    }

    #[test]
    fn test_recommended_strategy() {
        let analyzer = ComplexityAnalyzer::new();
        // Complex without deps: 1.0 * 2 + 3 = 5.0
        let task = Task::new("t", "simple_query").with_capability("search");
        assert_eq!(analyzer.analyze(&task), TaskComplexity::Complex);
        assert_eq!(analyzer.recommended_strategy(&task), DecompositionStrategy::Capability);

        // Moderate: 1.5 * 2 = 3.0
        let task = Task::new("t", "calculation");
        assert_eq!(analyzer.recommended_strategy(&task), DecompositionStrategy::Priority);

        let task = Task::new("t", "system_design").with_capability("arch");
        assert_eq!(analyzer.recommended_strategy(&task), DecompositionStrategy::Hybrid);
    }

    #[test]
    fn test_estimate_subtask_count() {
        let analyzer = ComplexityAnalyzer::new();
        // 4 deps, 3 caps: 12 + 9 + 4 = 25 -> VeryComplex (8) + 2 + 2
        let task = Task::new("t", "x")
            .with_dependency("a")
            .with_dependency("b")
            .with_dependency("c")
            .with_dependency("d")
            .with_capability("x")
            .with_capability("y")
            .with_capability("z");
        assert_eq!(analyzer.estimate_subtask_count(&task), 12);
    }

    #[test]
    fn test_report() {
        let analyzer = ComplexityAnalyzer::new();
        let task = (0..6).fold(Task::new("big", "system_design"), |t, i| {
            t.with_dependency(format!("d{i}"))
        });
        let report = analyzer.report(&task);

        assert_eq!(report.task_id.as_str(), "big");
        assert_eq!(report.complexity, TaskComplexity::VeryComplex);
        assert_eq!(report.factors["dependencies"], 6.0);
        assert_eq!(report.factors["type_complexity"], 5.0);
        assert_eq!(report.recommendations.len(), 2);
        assert!(report.recommendations[0].contains("dependencies"));
        assert!(report.recommendations[1].contains("Very complex"));
    }
}
