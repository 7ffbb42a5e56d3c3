//! Optimizer tasks.
//!
//! Atomic tasks run one model through the engine. Composite tasks chain
//! atomic ones: the two-phase distribution, and the binary-search hybrid.

mod glpk_distribution;
mod hybrid_distribution;
mod min_satisfaction;
mod unit_distribution;
mod worst_units_pruning;

pub use glpk_distribution::GlpkDistributionRunner;
pub use hybrid_distribution::{search_steps, HybridDistributionRunner};
pub use min_satisfaction::MinSatisfactionRunner;
pub use unit_distribution::UnitDistributionRunner;
pub use worst_units_pruning::WorstUnitsPruningRunner;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use super::data::TieBreak;
use super::engine::GlpkEngine;
use super::error::GlpkError;
use super::files::Artifacts;
use super::problem::{Problem, Slot};
use crate::lottery::{FamilyId, UnitId};

/// Kinds of optimizer tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Task {
    MinSatisfaction,
    UnitDistribution,
    WorstUnitsPruning,
    GlpkDistribution,
    HybridDistribution,
}

impl Task {
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::MinSatisfaction => "MIN_SATISFACTION",
            Task::UnitDistribution => "UNIT_DISTRIBUTION",
            Task::WorstUnitsPruning => "WORST_UNITS_PRUNING",
            Task::GlpkDistribution => "GLPK_DISTRIBUTION",
            Task::HybridDistribution => "HYBRID_DISTRIBUTION",
        }
    }

    /// Prefix of the task's temp files.
    fn label(&self) -> &'static str {
        match self {
            Task::MinSatisfaction => "min_satisfaction",
            Task::UnitDistribution => "unit_distribution",
            Task::WorstUnitsPruning => "worst_units_pruning",
            Task::GlpkDistribution => "glpk_distribution",
            Task::HybridDistribution => "hybrid_distribution",
        }
    }
}

/// What a task found.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TaskOutput {
    MinSatisfaction {
        min_satisfaction: u32,
    },
    Distribution {
        min_satisfaction: u32,
        distribution: BTreeMap<FamilyId, Slot>,
    },
    UnitSelection {
        kept: Vec<UnitId>,
        discarded: Vec<UnitId>,
    },
}

/// How a task got its output.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskMetadata {
    pub time_ms: u64,
    pub artifacts: Artifacts,
    /// Task-specific details (budgets, search steps, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskMetadata {
    pub fn new(elapsed: Duration, artifacts: Artifacts) -> Self {
        Self {
            time_ms: elapsed.as_millis() as u64,
            artifacts,
            extra: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }
}

/// Output and metadata of one task invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskResult {
    pub task: Task,
    pub result: TaskOutput,
    pub metadata: TaskMetadata,
}

impl TaskResult {
    pub fn min_satisfaction(&self) -> Option<u32> {
        match &self.result {
            TaskOutput::MinSatisfaction { min_satisfaction }
            | TaskOutput::Distribution {
                min_satisfaction, ..
            } => Some(*min_satisfaction),
            TaskOutput::UnitSelection { .. } => None,
        }
    }

    pub fn distribution(&self) -> Option<&BTreeMap<FamilyId, Slot>> {
        match &self.result {
            TaskOutput::Distribution { distribution, .. } => Some(distribution),
            _ => None,
        }
    }

    pub fn kept_units(&self) -> Option<&[UnitId]> {
        match &self.result {
            TaskOutput::UnitSelection { kept, .. } => Some(kept),
            _ => None,
        }
    }
}

/// Parameters a task may need beyond the problem itself.
#[derive(Debug, Clone, Default)]
pub struct TaskContext {
    /// Rank ceiling `S` for a unit distribution.
    pub min_satisfaction: Option<u32>,
    /// Number of slots `M` to keep when pruning.
    pub slot_count: Option<usize>,
    /// Budget for the phase-1 model of a two-phase distribution.
    pub phase1_timeout: Option<Duration>,
    pub tie_break: TieBreak,
}

impl TaskContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_satisfaction(mut self, s: u32) -> Self {
        self.min_satisfaction = Some(s);
        self
    }

    pub fn with_slot_count(mut self, m: usize) -> Self {
        self.slot_count = Some(m);
        self
    }

    pub fn with_phase1_timeout(mut self, timeout: Duration) -> Self {
        self.phase1_timeout = Some(timeout);
        self
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }
}

/// One optimizer task over a problem.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    fn task(&self) -> Task;

    async fn execute(
        &self,
        problem: &Problem,
        timeout: Duration,
        context: &TaskContext,
    ) -> Result<TaskResult, GlpkError>;
}

/// Builds the runner for a task kind.
#[derive(Debug, Clone)]
pub struct TaskRunnerFactory {
    engine: Arc<GlpkEngine>,
}

impl TaskRunnerFactory {
    pub fn new(engine: Arc<GlpkEngine>) -> Self {
        Self { engine }
    }

    pub fn make(&self, task: Task) -> Box<dyn TaskRunner> {
        let engine = Arc::clone(&self.engine);
        match task {
            Task::MinSatisfaction => Box::new(MinSatisfactionRunner::new(engine)),
            Task::UnitDistribution => Box::new(UnitDistributionRunner::new(engine)),
            Task::WorstUnitsPruning => Box::new(WorstUnitsPruningRunner::new(engine)),
            Task::GlpkDistribution => Box::new(GlpkDistributionRunner::new(engine)),
            Task::HybridDistribution => Box::new(HybridDistributionRunner::new(engine)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::glpk::ProcessExecutor;

    #[test]
    fn test_factory_builds_runner_for_each_task() {
        let engine = Arc::new(GlpkEngine::new(
            ProcessExecutor::new("glpsol"),
            std::env::temp_dir(),
        ));
        let factory = TaskRunnerFactory::new(engine);
        for task in [
            Task::MinSatisfaction,
            Task::UnitDistribution,
            Task::WorstUnitsPruning,
            Task::GlpkDistribution,
            Task::HybridDistribution,
        ] {
            assert_eq!(factory.make(task).task(), task);
        }
    }

    #[test]
    fn test_task_result_serializes_flat_metadata() {
        let result = TaskResult {
            task: Task::UnitDistribution,
            result: TaskOutput::Distribution {
                min_satisfaction: 2,
                distribution: BTreeMap::from([(1, Slot::Unit(10))]),
            },
            metadata: TaskMetadata::new(Duration::from_millis(12), Artifacts::default())
                .with("timeout_ms", 500),
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["task"], "UNIT_DISTRIBUTION");
        assert_eq!(json["result"]["min_satisfaction"], 2);
        assert_eq!(json["result"]["distribution"]["1"], 10);
        assert_eq!(json["metadata"]["time_ms"], 12);
        assert_eq!(json["metadata"]["timeout_ms"], 500);
        assert!(json["metadata"]["artifacts"].is_object());
    }

    #[test]
    fn test_accessors() {
        let result = TaskResult {
            task: Task::WorstUnitsPruning,
            result: TaskOutput::UnitSelection {
                kept: vec![1, 2],
                discarded: vec![3],
            },
            metadata: TaskMetadata::default(),
        };
        assert_eq!(result.kept_units(), Some(&[1, 2][..]));
        assert!(result.distribution().is_none());
        assert!(result.min_satisfaction().is_none());
    }
}
