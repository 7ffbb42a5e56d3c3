//! Optimizer integration tests against a real `glpsol`.
//!
//! Ignored by default; run with `cargo test -- --ignored` where the binary is
//! on the PATH. The fairness rule itself is also checked without an optimizer
//! by exhaustive search in the solver's unit tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use lottery_core::solver::glpk::{
    GlpkEngine, Problem, ProcessExecutor, Task, TaskContext, TaskRunner, TaskRunnerFactory,
};
use lottery_core::{
    testing::fixtures, AuditService, DegeneracyConfig, GlpkConfig, GlpkSolver, Solver,
    SqliteAuditStore,
};

const BUDGET: Duration = Duration::from_secs(5);

fn glpsol_available() -> bool {
    std::process::Command::new("glpsol")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

macro_rules! require_glpsol {
    () => {
        assert!(glpsol_available(), "glpsol not found on the PATH");
    };
}

fn factory(dir: &TempDir) -> TaskRunnerFactory {
    TaskRunnerFactory::new(Arc::new(GlpkEngine::new(
        ProcessExecutor::new("glpsol"),
        dir.path(),
    )))
}

#[tokio::test]
#[ignore = "requires glpsol"]
async fn test_shared_top_choice_gives_min_satisfaction_two() {
    require_glpsol!();
    let dir = TempDir::new().unwrap();
    let factory = factory(&dir);

    let spec = fixtures::spec(
        &[(1, &[10, 20, 30]), (2, &[10, 30, 20]), (3, &[10, 20, 30])],
        &[10, 20, 30],
    );
    let problem = Problem::from_spec(&spec);

    let phase1 = factory
        .make(Task::MinSatisfaction)
        .execute(&problem, BUDGET, &TaskContext::new())
        .await
        .unwrap();
    assert_eq!(phase1.min_satisfaction(), Some(2));

    let phase2 = factory
        .make(Task::UnitDistribution)
        .execute(&problem, BUDGET, &TaskContext::new().with_min_satisfaction(2))
        .await
        .unwrap();
    let distribution = phase2.distribution().unwrap();
    let first_choices = distribution
        .iter()
        .filter(|(family, slot)| problem.rank(**family, **slot) == Some(1))
        .count();
    assert_eq!(first_choices, 1);
    assert_eq!(problem.worst_rank(distribution), Some(2));
    assert!(!phase2.metadata.artifacts.is_empty());
}

#[tokio::test]
#[ignore = "requires glpsol"]
async fn test_hybrid_search_matches_direct_optimization() {
    require_glpsol!();
    let dir = TempDir::new().unwrap();
    let factory = factory(&dir);

    let spec = fixtures::spec(
        &[
            (1, &[10, 20, 30, 40]),
            (2, &[10, 30, 20, 40]),
            (3, &[20, 10, 40, 30]),
            (4, &[20, 40, 10, 30]),
        ],
        &[10, 20, 30, 40],
    );
    let problem = Problem::from_spec(&spec);

    let direct = factory
        .make(Task::GlpkDistribution)
        .execute(&problem, BUDGET, &TaskContext::new())
        .await
        .unwrap();
    let hybrid = factory
        .make(Task::HybridDistribution)
        .execute(&problem, BUDGET, &TaskContext::new())
        .await
        .unwrap();

    assert_eq!(direct.min_satisfaction(), hybrid.min_satisfaction());
    assert_eq!(
        problem.worst_rank(direct.distribution().unwrap()),
        problem.worst_rank(hybrid.distribution().unwrap())
    );
}

#[tokio::test]
#[ignore = "requires glpsol"]
async fn test_pruning_keeps_one_unit_per_family() {
    require_glpsol!();
    let dir = TempDir::new().unwrap();
    let factory = factory(&dir);

    let spec = fixtures::spec(&[(1, &[10, 20, 30]), (2, &[20, 10, 30])], &[10, 20, 30]);
    let result = factory
        .make(Task::WorstUnitsPruning)
        .execute(
            &Problem::from_spec(&spec),
            BUDGET,
            &TaskContext::new().with_slot_count(2),
        )
        .await
        .unwrap();

    let kept: BTreeSet<_> = result.kept_units().unwrap().iter().copied().collect();
    assert_eq!(kept, BTreeSet::from([10, 20]));
}

#[tokio::test]
#[ignore = "requires glpsol"]
async fn test_three_cycle_gives_everyone_first_choice() {
    require_glpsol!();
    let dir = TempDir::new().unwrap();
    let audit = AuditService::new(Arc::new(SqliteAuditStore::in_memory().unwrap()));
    let solver = GlpkSolver::new(
        GlpkConfig::default().with_temp_dir(dir.path()),
        DegeneracyConfig::default(),
        audit,
    )
    .with_seed(7);

    let spec = fixtures::spec(
        &[(1, &[10, 20, 30]), (2, &[20, 30, 10]), (3, &[30, 10, 20])],
        &[10, 20, 30],
    );
    let result = solver
        .execute(&fixtures::manifest_for(&spec), &spec)
        .await
        .unwrap();

    assert_eq!(result.picks, BTreeMap::from([(1, 10), (2, 20), (3, 30)]));
    assert!(result.orphans.is_empty());
}

#[tokio::test]
#[ignore = "requires glpsol"]
async fn test_placeholders_become_orphan_families() {
    require_glpsol!();
    let dir = TempDir::new().unwrap();
    let audit = AuditService::new(Arc::new(SqliteAuditStore::in_memory().unwrap()));
    let solver = GlpkSolver::new(
        GlpkConfig::default().with_temp_dir(dir.path()),
        DegeneracyConfig::default(),
        audit,
    );

    let spec = fixtures::spec(&[(1, &[10, 20]), (2, &[20, 10]), (3, &[20, 10])], &[10, 20]);
    let result = solver
        .execute(&fixtures::manifest_for(&spec), &spec)
        .await
        .unwrap();

    assert!(result.partition_violation(&spec).is_none());
    assert_eq!(result.picks.len(), 2);
    assert_eq!(result.orphans.families.len(), 1);
    assert_eq!(result.picks.get(&1), Some(&10));
}
