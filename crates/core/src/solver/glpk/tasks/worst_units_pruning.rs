//! Keep the `M` units that let the worst-off family do best.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{Task, TaskContext, TaskMetadata, TaskOutput, TaskResult, TaskRunner};
use crate::solver::glpk::data::{self, Scalar};
use crate::solver::glpk::engine::GlpkEngine;
use crate::solver::glpk::error::GlpkError;
use crate::solver::glpk::model;
use crate::solver::glpk::parser;
use crate::solver::glpk::problem::Problem;

pub struct WorstUnitsPruningRunner {
    engine: Arc<GlpkEngine>,
}

impl WorstUnitsPruningRunner {
    pub fn new(engine: Arc<GlpkEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TaskRunner for WorstUnitsPruningRunner {
    fn task(&self) -> Task {
        Task::WorstUnitsPruning
    }

    async fn execute(
        &self,
        problem: &Problem,
        timeout: Duration,
        context: &TaskContext,
    ) -> Result<TaskResult, GlpkError> {
        let keep = context.slot_count.ok_or(GlpkError::MissingParameter {
            task: self.task().as_str(),
            parameter: "slot_count",
        })?;

        let data = data::render(problem, &context.tie_break, Some(Scalar::SlotCount(keep)));
        let solved = self
            .engine
            .solve(
                self.task().label(),
                model::WORST_UNITS_PRUNING,
                &data,
                timeout,
                |solution| {
                    let (kept, discarded) = parser::unit_selection(solution)?;
                    if kept.len() != keep {
                        return Err(GlpkError::parse(format!(
                            "expected {} kept units, solution keeps {}",
                            keep,
                            kept.len()
                        )));
                    }
                    Ok((kept, discarded))
                },
            )
            .await?;

        let (kept, discarded) = solved.value;
        Ok(TaskResult {
            task: self.task(),
            result: TaskOutput::UnitSelection { kept, discarded },
            metadata: TaskMetadata::new(solved.elapsed, solved.artifacts)
                .with("slot_count", keep as u64)
                .with("timeout_ms", timeout.as_millis() as u64),
        })
    }
}
