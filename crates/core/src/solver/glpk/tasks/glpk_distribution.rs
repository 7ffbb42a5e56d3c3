//! Two-phase distribution: phase 1 for the fair ceiling, phase 2 under it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;

use super::{
    MinSatisfactionRunner, Task, TaskContext, TaskMetadata, TaskOutput, TaskResult, TaskRunner,
    UnitDistributionRunner,
};
use crate::solver::glpk::engine::GlpkEngine;
use crate::solver::glpk::error::GlpkError;
use crate::solver::glpk::files::Artifacts;
use crate::solver::glpk::problem::Problem;

pub struct GlpkDistributionRunner {
    phase1: MinSatisfactionRunner,
    phase2: UnitDistributionRunner,
}

impl GlpkDistributionRunner {
    pub fn new(engine: Arc<GlpkEngine>) -> Self {
        Self {
            phase1: MinSatisfactionRunner::new(Arc::clone(&engine)),
            phase2: UnitDistributionRunner::new(engine),
        }
    }
}

#[async_trait]
impl TaskRunner for GlpkDistributionRunner {
    fn task(&self) -> Task {
        Task::GlpkDistribution
    }

    /// Phase 1 runs under `context.phase1_timeout` (or `timeout` if unset),
    /// phase 2 under `timeout`.
    async fn execute(
        &self,
        problem: &Problem,
        timeout: Duration,
        context: &TaskContext,
    ) -> Result<TaskResult, GlpkError> {
        let started = Instant::now();

        let phase1_timeout = context.phase1_timeout.unwrap_or(timeout);
        let phase1 = self.phase1.execute(problem, phase1_timeout, context).await?;
        let ceiling = phase1.min_satisfaction().ok_or_else(|| {
            GlpkError::parse("phase 1 produced no minimum satisfaction")
        })?;

        let phase2_context = context.clone().with_min_satisfaction(ceiling);
        let phase2 = self.phase2.execute(problem, timeout, &phase2_context).await?;
        let distribution = phase2
            .distribution()
            .cloned()
            .ok_or_else(|| GlpkError::parse("phase 2 produced no distribution"))?;

        let mut artifacts = Artifacts::default();
        artifacts.extend(phase1.metadata.artifacts.clone());
        artifacts.extend(phase2.metadata.artifacts.clone());

        Ok(TaskResult {
            task: self.task(),
            result: TaskOutput::Distribution {
                min_satisfaction: ceiling,
                distribution,
            },
            metadata: TaskMetadata::new(started.elapsed(), artifacts)
                .with("phase1_timeout_ms", phase1_timeout.as_millis() as u64)
                .with("timeout_ms", timeout.as_millis() as u64)
                .with("phase1", digest(&phase1))
                .with("phase2", digest(&phase2)),
        })
    }
}

/// A sub-task's result and timing, without its artifacts.
pub(super) fn digest(result: &TaskResult) -> serde_json::Value {
    json!({
        "task": result.task,
        "result": result.result,
        "time_ms": result.metadata.time_ms,
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::solver::glpk::ProcessExecutor;
    use crate::testing::fixtures::{spec, write_script};
    use std::path::Path;
    use tempfile::TempDir;

    /// Answers phase 1 with `S = 1` and phase 2 with a perfect pairing,
    /// telling the two apart by their model file.
    fn two_phase_glpsol(dir: &Path) -> std::path::PathBuf {
        write_script(
            dir,
            "glpsol",
            r#"
model=""; out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --model) model="$2"; shift ;;
    --output) out="$2"; shift ;;
  esac
  shift
done
if grep -q "param S;" "$model"; then
  printf 'Objective:  total_rank = 2 (MINimum)\n  1 x[c1,v10]  *  1  0  1\n  2 x[c2,v20]  *  1  0  1\n' > "$out"
else
  printf 'Objective:  worst_rank = 1.0312 (MINimum)\n' > "$out"
fi
"#,
        )
    }

    #[tokio::test]
    async fn test_runs_both_phases() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(GlpkEngine::new(
            ProcessExecutor::new(two_phase_glpsol(dir.path())),
            dir.path().join("work"),
        ));
        let problem = Problem::from_spec(&spec(&[(1, &[10, 20]), (2, &[20, 10])], &[10, 20]));

        let result = GlpkDistributionRunner::new(engine)
            .execute(
                &problem,
                Duration::from_secs(2),
                &TaskContext::new().with_phase1_timeout(Duration::from_millis(700)),
            )
            .await
            .unwrap();

        assert_eq!(result.task, Task::GlpkDistribution);
        assert_eq!(result.min_satisfaction(), Some(1));
        assert_eq!(result.distribution().unwrap().len(), 2);
        assert_eq!(result.metadata.artifacts.len(), 6);
        assert_eq!(result.metadata.extra["phase1_timeout_ms"], 700);
        assert_eq!(result.metadata.extra["phase1"]["task"], "MIN_SATISFACTION");
        assert_eq!(result.metadata.extra["phase2"]["result"]["min_satisfaction"], 1);
    }

    #[tokio::test]
    async fn test_phase1_timeout_propagates() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(GlpkEngine::new(
            ProcessExecutor::new(write_script(dir.path(), "glpsol", "exec sleep 30")),
            dir.path().join("work"),
        ));
        let problem = Problem::from_spec(&spec(&[(1, &[10]), (2, &[10])], &[10, 20]));

        let err = GlpkDistributionRunner::new(engine)
            .execute(
                &problem,
                Duration::from_secs(5),
                &TaskContext::new().with_phase1_timeout(Duration::from_millis(100)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GlpkError::Timeout { timeout_ms: 100 }));
    }
}
