//! One optimizer round trip: write model and data, run, read, clean up.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{debug, error};

use super::error::GlpkError;
use super::files::{Artifacts, Workspace};
use super::process::{Invocation, ProcessExecutor};
use crate::config::GlpkConfig;

/// Parsed value of a run, with what it took to get it.
#[derive(Debug, Clone)]
pub struct Solved<T> {
    pub value: T,
    pub artifacts: Artifacts,
    pub elapsed: Duration,
}

/// Shared plumbing every task runner goes through.
#[derive(Debug, Clone)]
pub struct GlpkEngine {
    executor: ProcessExecutor,
    temp_dir: PathBuf,
}

impl GlpkEngine {
    pub fn new(executor: ProcessExecutor, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            temp_dir: temp_dir.into(),
        }
    }

    pub fn from_config(config: &GlpkConfig) -> Self {
        let executor = ProcessExecutor::new(config.binary.clone())
            .with_failsafe_factor(config.failsafe_factor)
            .with_scale(config.scale);
        Self::new(executor, config.temp_dir())
    }

    /// Run `model` against `data` and parse the solution with `parse`.
    ///
    /// Temp files are deleted before returning, whatever the outcome.
    pub async fn solve<T, F>(
        &self,
        label: &str,
        model: &str,
        data: &str,
        budget: Duration,
        parse: F,
    ) -> Result<Solved<T>, GlpkError>
    where
        F: FnOnce(&str) -> Result<T, GlpkError>,
    {
        let mut workspace = Workspace::new(&self.temp_dir, label)?;
        let mut artifacts = Artifacts::default();

        let outcome = self
            .solve_in(&mut workspace, &mut artifacts, model, data, budget, parse)
            .await;
        workspace.cleanup();

        match outcome {
            Ok((value, elapsed)) => Ok(Solved {
                value,
                artifacts,
                elapsed,
            }),
            Err(e) => {
                if e.is_infeasible() || e.is_timeout() {
                    debug!(task = label, error = %e, "Optimizer run ended without a solution");
                } else {
                    error!(
                        task = label,
                        error = %e,
                        artifacts = ?artifacts,
                        "Optimizer run failed unexpectedly"
                    );
                }
                Err(e)
            }
        }
    }

    async fn solve_in<T, F>(
        &self,
        workspace: &mut Workspace,
        artifacts: &mut Artifacts,
        model: &str,
        data: &str,
        budget: Duration,
        parse: F,
    ) -> Result<(T, Duration), GlpkError>
    where
        F: FnOnce(&str) -> Result<T, GlpkError>,
    {
        let started = Instant::now();

        let model_path = workspace.write("mod", model)?;
        artifacts.insert(&model_path, model);
        let data_path = workspace.write("dat", data)?;
        artifacts.insert(&data_path, data);
        let output_path = workspace.reserve("sol")?;

        self.executor
            .run(
                Invocation {
                    model: &model_path,
                    data: &data_path,
                    output: &output_path,
                },
                budget,
            )
            .await?;

        let solution = tokio::fs::read_to_string(&output_path).await?;
        if solution.trim().is_empty() {
            return Err(GlpkError::MissingSolution { path: output_path });
        }
        artifacts.insert(&output_path, solution.as_str());

        let value = parse(&solution)?;
        Ok((value, started.elapsed()))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::solver::glpk::parser;
    use crate::testing::fixtures::{fake_glpsol, write_script};
    use tempfile::TempDir;

    fn engine(dir: &TempDir, binary: PathBuf) -> GlpkEngine {
        GlpkEngine::new(ProcessExecutor::new(binary), dir.path().join("work"))
    }

    fn work_entries(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path().join("work")).unwrap().count()
    }

    #[tokio::test]
    async fn test_solve_parses_and_captures_artifacts() {
        let dir = TempDir::new().unwrap();
        let binary = fake_glpsol(dir.path(), "Objective:  worst_rank = 2 (MINimum)\n");
        let engine = engine(&dir, binary);

        let solved = engine
            .solve("phase1", "set C;", "data;", Duration::from_secs(2), parser::min_satisfaction)
            .await
            .unwrap();

        assert_eq!(solved.value, 2);
        assert_eq!(solved.artifacts.len(), 3);
        let names: Vec<&str> = solved.artifacts.names().collect();
        assert!(names.iter().all(|name| name.starts_with("phase1_")));
        assert!(names.iter().any(|name| name.ends_with(".mod")));
        assert!(names.iter().any(|name| name.ends_with(".dat")));
        assert!(names.iter().any(|name| name.ends_with(".sol")));
        assert_eq!(work_entries(&dir), 0);
    }

    #[tokio::test]
    async fn test_empty_solution_is_missing() {
        let dir = TempDir::new().unwrap();
        let binary = write_script(dir.path(), "glpsol", "exit 0");
        let engine = engine(&dir, binary);

        let err = engine
            .solve("phase1", "set C;", "data;", Duration::from_secs(2), parser::min_satisfaction)
            .await
            .unwrap_err();

        assert!(matches!(err, GlpkError::MissingSolution { .. }));
        assert_eq!(work_entries(&dir), 0);
    }

    #[tokio::test]
    async fn test_infeasible_solution_is_classified_and_cleaned() {
        let dir = TempDir::new().unwrap();
        let binary = fake_glpsol(dir.path(), "Status:     INTEGER EMPTY\n");
        let engine = engine(&dir, binary);

        let err = engine
            .solve("phase2", "set C;", "data;", Duration::from_secs(2), parser::assignments)
            .await
            .unwrap_err();

        assert!(err.is_infeasible());
        assert_eq!(work_entries(&dir), 0);
    }

    #[tokio::test]
    async fn test_timeout_cleans_up() {
        let dir = TempDir::new().unwrap();
        let binary = write_script(dir.path(), "glpsol", "exec sleep 30");
        let engine = engine(&dir, binary);

        let err = engine
            .solve("phase1", "set C;", "data;", Duration::from_millis(100), parser::min_satisfaction)
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(work_entries(&dir), 0);
    }
}
