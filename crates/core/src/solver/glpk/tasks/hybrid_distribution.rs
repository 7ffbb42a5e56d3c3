//! Binary search for the fair ceiling, probing each candidate with phase 2.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::glpk_distribution::digest;
use super::{
    Task, TaskContext, TaskMetadata, TaskOutput, TaskResult, TaskRunner, UnitDistributionRunner,
};
use crate::solver::glpk::engine::GlpkEngine;
use crate::solver::glpk::error::GlpkError;
use crate::solver::glpk::files::Artifacts;
use crate::solver::glpk::problem::Problem;

/// Steps a binary search over `[1, n]` may need: `ceil(log2 n) + 1`.
pub fn search_steps(n: u32) -> u32 {
    (u32::BITS - (n.max(1) - 1).leading_zeros()) + 1
}

pub struct HybridDistributionRunner {
    phase2: UnitDistributionRunner,
}

impl HybridDistributionRunner {
    pub fn new(engine: Arc<GlpkEngine>) -> Self {
        Self {
            phase2: UnitDistributionRunner::new(engine),
        }
    }
}

#[async_trait]
impl TaskRunner for HybridDistributionRunner {
    fn task(&self) -> Task {
        Task::HybridDistribution
    }

    /// Each step gets `2 * timeout / steps`, so a full search stays within
    /// twice the group budget. Infeasible ceilings raise the floor, feasible
    /// ones lower the ceiling; any other error ends the search.
    async fn execute(
        &self,
        problem: &Problem,
        timeout: Duration,
        context: &TaskContext,
    ) -> Result<TaskResult, GlpkError> {
        let started = Instant::now();
        let upper = problem.max_rank();
        let steps = search_steps(upper);
        let step_timeout = timeout * 2 / steps;

        let mut lo = 1u32;
        let mut hi = upper;
        let mut ceilings: Vec<Value> = Vec::new();
        let mut feasible: Vec<TaskResult> = Vec::new();

        while lo <= hi {
            let candidate = lo + (hi - lo) / 2;
            let step_context = context.clone().with_min_satisfaction(candidate);

            match self.phase2.execute(problem, step_timeout, &step_context).await {
                Ok(result) => {
                    debug!(candidate, "Ceiling is feasible");
                    ceilings.push(json!({ "ceiling": candidate, "feasible": true }));
                    feasible.push(result);
                    hi = candidate - 1;
                }
                Err(e) if e.is_infeasible() => {
                    debug!(candidate, "Ceiling is infeasible");
                    ceilings.push(json!({ "ceiling": candidate, "feasible": false }));
                    lo = candidate + 1;
                }
                Err(e) => return Err(e),
            }
        }

        let Some(best) = feasible.last() else {
            return Err(GlpkError::infeasible(format!(
                "no ceiling in [1, {}] admits a distribution",
                upper
            )));
        };

        let (min_satisfaction, distribution) = match &best.result {
            TaskOutput::Distribution {
                min_satisfaction,
                distribution,
            } => (*min_satisfaction, distribution.clone()),
            _ => return Err(GlpkError::parse("phase 2 produced no distribution")),
        };

        let mut artifacts = Artifacts::default();
        for result in &feasible {
            artifacts.extend(result.metadata.artifacts.clone());
        }

        Ok(TaskResult {
            task: self.task(),
            result: TaskOutput::Distribution {
                min_satisfaction,
                distribution,
            },
            metadata: TaskMetadata::new(started.elapsed(), artifacts)
                .with("iterations", steps)
                .with("step_timeout_ms", step_timeout.as_millis() as u64)
                .with("timeout_ms", (step_timeout * steps).as_millis() as u64)
                .with("ceilings", ceilings)
                .with(
                    "feasible_steps",
                    feasible.iter().map(digest).collect::<Vec<_>>(),
                ),
        })
    }
}
