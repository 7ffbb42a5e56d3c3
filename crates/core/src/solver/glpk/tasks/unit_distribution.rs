//! Phase 2: the best total rank under a worst-rank ceiling.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{Task, TaskContext, TaskMetadata, TaskOutput, TaskResult, TaskRunner};
use crate::lottery::FamilyId;
use crate::solver::glpk::data::{self, Scalar, UNRANKED_PENALTY};
use crate::solver::glpk::engine::GlpkEngine;
use crate::solver::glpk::error::GlpkError;
use crate::solver::glpk::model;
use crate::solver::glpk::parser;
use crate::solver::glpk::problem::{Problem, Slot};

pub struct UnitDistributionRunner {
    engine: Arc<GlpkEngine>,
}

impl UnitDistributionRunner {
    pub fn new(engine: Arc<GlpkEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TaskRunner for UnitDistributionRunner {
    fn task(&self) -> Task {
        Task::UnitDistribution
    }

    async fn execute(
        &self,
        problem: &Problem,
        timeout: Duration,
        context: &TaskContext,
    ) -> Result<TaskResult, GlpkError> {
        let ceiling = context.min_satisfaction.ok_or(GlpkError::MissingParameter {
            task: self.task().as_str(),
            parameter: "min_satisfaction",
        })?;

        let data = data::render(problem, &context.tie_break, Some(Scalar::MinSatisfaction(ceiling)));
        let solved = self
            .engine
            .solve(
                self.task().label(),
                model::UNIT_DISTRIBUTION,
                &data,
                timeout,
                |solution| {
                    let distribution = parser::assignments(solution)?;
                    check_distribution(problem, &distribution)?;
                    Ok(distribution)
                },
            )
            .await?;

        let worst = problem
            .worst_rank(&solved.value)
            .unwrap_or(ceiling)
            .min(UNRANKED_PENALTY);

        Ok(TaskResult {
            task: self.task(),
            result: TaskOutput::Distribution {
                min_satisfaction: worst,
                distribution: solved.value,
            },
            metadata: TaskMetadata::new(solved.elapsed, solved.artifacts)
                .with("ceiling", ceiling)
                .with("timeout_ms", timeout.as_millis() as u64),
        })
    }
}

/// Every family gets exactly one known slot and no slot is used twice.
fn check_distribution(
    problem: &Problem,
    distribution: &BTreeMap<FamilyId, Slot>,
) -> Result<(), GlpkError> {
    if let Some(family) = problem.family_ids().find(|f| !distribution.contains_key(f)) {
        return Err(GlpkError::parse(format!("family {} was not assigned", family)));
    }
    if let Some(family) = distribution.keys().find(|f| !problem.families().contains_key(f)) {
        return Err(GlpkError::parse(format!("unknown family {} in solution", family)));
    }

    let mut seen = std::collections::BTreeSet::new();
    for slot in distribution.values() {
        if !problem.slots().contains(slot) {
            return Err(GlpkError::parse(format!("unknown slot {} in solution", slot)));
        }
        if !seen.insert(*slot) {
            return Err(GlpkError::parse(format!("slot {} assigned twice", slot)));
        }
    }
    Ok(())
}
