//! Phase 1: the best achievable worst rank.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{Task, TaskContext, TaskMetadata, TaskOutput, TaskResult, TaskRunner};
use crate::solver::glpk::data;
use crate::solver::glpk::engine::GlpkEngine;
use crate::solver::glpk::error::GlpkError;
use crate::solver::glpk::model;
use crate::solver::glpk::parser;
use crate::solver::glpk::problem::Problem;

pub struct MinSatisfactionRunner {
    engine: Arc<GlpkEngine>,
}

impl MinSatisfactionRunner {
    pub fn new(engine: Arc<GlpkEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TaskRunner for MinSatisfactionRunner {
    fn task(&self) -> Task {
        Task::MinSatisfaction
    }

    async fn execute(
        &self,
        problem: &Problem,
        timeout: Duration,
        context: &TaskContext,
    ) -> Result<TaskResult, GlpkError> {
        let data = data::render(problem, &context.tie_break, None);
        let solved = self
            .engine
            .solve(
                self.task().label(),
                model::MIN_SATISFACTION,
                &data,
                timeout,
                parser::min_satisfaction,
            )
            .await?;

        Ok(TaskResult {
            task: self.task(),
            result: TaskOutput::MinSatisfaction {
                min_satisfaction: solved.value,
            },
            metadata: TaskMetadata::new(solved.elapsed, solved.artifacts)
                .with("timeout_ms", timeout.as_millis() as u64),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::solver::glpk::ProcessExecutor;
    use crate::testing::fixtures::{fake_glpsol, spec};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reads_worst_rank_from_objective() {
        let dir = TempDir::new().unwrap();
        let binary = fake_glpsol(dir.path(), "Objective:  worst_rank = 2.0417 (MINimum)\n");
        let engine = Arc::new(GlpkEngine::new(ProcessExecutor::new(binary), dir.path().join("work")));
        let problem = Problem::from_spec(&spec(&[(1, &[10, 20]), (2, &[10, 20])], &[10, 20]));

        let result = MinSatisfactionRunner::new(engine)
            .execute(&problem, Duration::from_secs(2), &TaskContext::new())
            .await
            .unwrap();

        assert_eq!(result.task, Task::MinSatisfaction);
        assert_eq!(result.min_satisfaction(), Some(2));
        assert_eq!(result.metadata.artifacts.len(), 3);
        assert_eq!(result.metadata.extra["timeout_ms"], 2000);
    }
}
