//! Production strategy: balance the group, optimize it, fall back when the
//! optimizer cannot deliver.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::data::TieBreak;
use super::engine::GlpkEngine;
use super::error::GlpkError;
use super::problem::{Problem, Slot};
use super::tasks::{Task, TaskContext, TaskResult, TaskRunnerFactory};
use crate::audit::AuditService;
use crate::config::{DegeneracyConfig, GlpkConfig};
use crate::lottery::{ExecutionResult, FamilyId, LotteryManifest, LotterySpec, UnitId};
use crate::metrics;
use crate::solver::degeneracy::DegeneracyDetector;
use crate::solver::error::SolverError;
use crate::solver::greedy::GreedyFallback;
use crate::solver::traits::Solver;

/// Max-min fair assignment through GLPK, with hybrid and greedy fallbacks.
pub struct GlpkSolver {
    config: GlpkConfig,
    factory: TaskRunnerFactory,
    detector: DegeneracyDetector,
    greedy: GreedyFallback,
    audit: AuditService,
    /// Shared by every run, so a seeded solver is reproducible as a whole
    /// while successive draws still differ.
    rng: Mutex<StdRng>,
}

impl GlpkSolver {
    pub fn new(config: GlpkConfig, degeneracy: DegeneracyConfig, audit: AuditService) -> Self {
        let engine = Arc::new(GlpkEngine::from_config(&config));
        Self {
            config,
            factory: TaskRunnerFactory::new(engine),
            detector: DegeneracyDetector::new(degeneracy),
            greedy: GreedyFallback,
            audit,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Seed tie-break offsets and greedy turn orders, for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    fn with_rng<T>(&self, draw: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        draw(&mut rng)
    }

    fn context(&self, problem: &Problem) -> TaskContext {
        let tie_break = if self.config.tie_break {
            self.with_rng(|rng| TieBreak::random(problem.family_ids(), rng))
        } else {
            TieBreak::none()
        };
        TaskContext::new().with_tie_break(tie_break)
    }

    /// Optimize a balanced group, or an unbalanced one made balanced.
    async fn optimize(
        &self,
        manifest: &LotteryManifest,
        spec: &LotterySpec,
    ) -> Result<ExecutionResult, GlpkError> {
        let families = spec.family_count();
        let units = spec.unit_count();

        let problem = if units > families {
            let kept = self.prune_units(manifest, spec).await?;
            debug!(kept = ?kept, "Units kept for distribution");
            Problem::from_spec(&spec.with_units(kept))
        } else {
            Problem::with_placeholders(spec)
        };

        let distribution = self.distribute(manifest, &problem).await?;
        Ok(into_result(spec, &distribution))
    }

    /// Units worth distributing when there are more units than families.
    ///
    /// Gathers preferred units rank by rank until every family could be
    /// served, then lets the optimizer drop the surplus.
    async fn prune_units(
        &self,
        manifest: &LotteryManifest,
        spec: &LotterySpec,
    ) -> Result<Vec<UnitId>, GlpkError> {
        let target = spec.family_count();
        let candidates = preferred_units(spec, target);
        if candidates.len() <= target {
            return Ok(candidates);
        }

        let problem = Problem::from_spec(&spec.with_units(candidates));
        let context = self.context(&problem).with_slot_count(target);
        let result = self
            .run_task(manifest, Task::WorstUnitsPruning, &problem, self.config.timeout(), &context)
            .await?;

        result
            .kept_units()
            .map(<[UnitId]>::to_vec)
            .ok_or_else(|| GlpkError::parse("pruning produced no unit selection"))
    }

    /// Direct two-phase optimization for small groups, hybrid search for
    /// large ones or when phase 1 runs out of time.
    async fn distribute(
        &self,
        manifest: &LotteryManifest,
        problem: &Problem,
    ) -> Result<BTreeMap<FamilyId, Slot>, GlpkError> {
        let context = self.context(problem);

        if problem.family_count() >= self.config.phase1_max_size {
            debug!(
                families = problem.family_count(),
                threshold = self.config.phase1_max_size,
                "Group too large for phase 1, using hybrid search"
            );
            return self.hybrid(manifest, problem, &context).await;
        }

        let phase1_timeout = self.config.phase1_timeout().min(self.config.timeout());
        let direct = self
            .run_task(
                manifest,
                Task::GlpkDistribution,
                problem,
                self.config.timeout(),
                &context.clone().with_phase1_timeout(phase1_timeout),
            )
            .await;

        match direct {
            Ok(result) => {
                metrics::SOLVER_STRATEGY.with_label_values(&["direct"]).inc();
                take_distribution(result)
            }
            Err(e) if e.is_timeout() => {
                info!(
                    execution_uuid = %manifest.uuid(),
                    "Two-phase optimization timed out, falling back to hybrid search"
                );
                self.hybrid(manifest, problem, &context).await
            }
            Err(e) => Err(e),
        }
    }

    async fn hybrid(
        &self,
        manifest: &LotteryManifest,
        problem: &Problem,
        context: &TaskContext,
    ) -> Result<BTreeMap<FamilyId, Slot>, GlpkError> {
        let result = self
            .run_task(
                manifest,
                Task::HybridDistribution,
                problem,
                self.config.timeout(),
                context,
            )
            .await?;
        metrics::SOLVER_STRATEGY.with_label_values(&["hybrid"]).inc();
        take_distribution(result)
    }

    /// Run one task, recording its outcome in metrics and the audit trail.
    async fn run_task(
        &self,
        manifest: &LotteryManifest,
        task: Task,
        problem: &Problem,
        timeout: Duration,
        context: &TaskContext,
    ) -> Result<TaskResult, GlpkError> {
        let runner = self.factory.make(task);
        let started = Instant::now();
        let outcome = runner.execute(problem, timeout, context).await;

        metrics::OPTIMIZER_DURATION
            .with_label_values(&[task.as_str()])
            .observe(started.elapsed().as_secs_f64());

        let (label, entry) = match &outcome {
            Ok(result) => (
                "success",
                json!({
                    "task": task,
                    "status": "success",
                    "result": result.result,
                    "metadata": result.metadata,
                }),
            ),
            Err(e) => (
                outcome_label(e),
                json!({
                    "task": task,
                    "status": "failed",
                    "error_type": e.kind(),
                    "error": e.to_string(),
                }),
            ),
        };
        metrics::OPTIMIZER_RUNS
            .with_label_values(&[task.as_str(), label])
            .inc();
        self.record(manifest, &entry);

        outcome
    }

    fn fall_back_to_greedy(
        &self,
        manifest: &LotteryManifest,
        spec: &LotterySpec,
        reason: Value,
    ) -> ExecutionResult {
        let outcome = self.with_rng(|rng| self.greedy.execute_with_rng(spec, rng));
        metrics::SOLVER_STRATEGY.with_label_values(&["greedy"]).inc();
        info!(
            execution_uuid = %manifest.uuid(),
            families = spec.family_count(),
            picks = outcome.result.picks.len(),
            "Greedy fallback assignment completed"
        );

        self.record(
            manifest,
            &json!({
                "task": "GREEDY_FALLBACK",
                "reason": reason,
                "order": outcome.order,
                "result": outcome.result,
            }),
        );
        outcome.result
    }

    fn record(&self, manifest: &LotteryManifest, entry: &Value) {
        if let Err(e) = self.audit.custom(manifest, entry) {
            warn!(
                execution_uuid = %manifest.uuid(),
                error = %e,
                "Failed to write optimizer audit entry"
            );
        }
    }
}

#[async_trait]
impl Solver for GlpkSolver {
    fn name(&self) -> &str {
        "glpk"
    }

    async fn execute(
        &self,
        manifest: &LotteryManifest,
        spec: &LotterySpec,
    ) -> Result<ExecutionResult, SolverError> {
        if spec.family_count() == 0 || spec.unit_count() == 0 {
            return Ok(ExecutionResult::unmatched(spec));
        }

        if let Some(degeneracy) = self.detector.detect(spec) {
            debug!(?degeneracy, "Degenerate group, skipping the optimizer");
            return Ok(self.fall_back_to_greedy(
                manifest,
                spec,
                json!({ "degeneracy": degeneracy }),
            ));
        }

        match self.optimize(manifest, spec).await {
            Ok(result) => Ok(result),
            Err(e) if e.is_timeout() || e.is_infeasible() => {
                warn!(
                    execution_uuid = %manifest.uuid(),
                    error = %e,
                    "Optimizer could not deliver, using greedy fallback"
                );
                Ok(self.fall_back_to_greedy(
                    manifest,
                    spec,
                    json!({ "error_type": e.kind(), "error": e.to_string() }),
                ))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn outcome_label(error: &GlpkError) -> &'static str {
    if error.is_infeasible() {
        "infeasible"
    } else if error.is_timeout() {
        "timeout"
    } else {
        "error"
    }
}

fn take_distribution(result: TaskResult) -> Result<BTreeMap<FamilyId, Slot>, GlpkError> {
    result
        .distribution()
        .cloned()
        .ok_or_else(|| GlpkError::parse(format!("{} produced no distribution", result.task.as_str())))
}

/// Preferred units, gathered rank by rank across all families until at
/// least `target` distinct units are in, then topped up by id if lists run
/// short. Sorted by id.
pub(crate) fn preferred_units(spec: &LotterySpec, target: usize) -> Vec<UnitId> {
    let offered: BTreeSet<UnitId> = spec.units().iter().copied().collect();
    let depth = spec.families().values().map(Vec::len).max().unwrap_or(0);
    let mut picked = BTreeSet::new();

    for rank in 0..depth {
        if picked.len() >= target {
            break;
        }
        for prefs in spec.families().values() {
            if let Some(unit) = prefs.get(rank).filter(|unit| offered.contains(unit)) {
                picked.insert(*unit);
            }
        }
    }

    for unit in &offered {
        if picked.len() >= target {
            break;
        }
        picked.insert(*unit);
    }

    picked.into_iter().collect()
}

/// Turn a slot distribution into picks and orphans of the original group.
/// Families on placeholders are orphans, as is every unit nobody got.
fn into_result(spec: &LotterySpec, distribution: &BTreeMap<FamilyId, Slot>) -> ExecutionResult {
    let mut result = ExecutionResult::empty();

    for family in spec.family_ids() {
        match distribution.get(&family).and_then(Slot::unit) {
            Some(unit) => {
                result.picks.insert(family, unit);
            }
            None => result.orphans.families.push(family),
        }
    }

    let assigned: BTreeSet<UnitId> = result.assigned_units().collect();
    result.orphans.units = spec
        .units()
        .iter()
        .copied()
        .filter(|unit| !assigned.contains(unit))
        .collect();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::spec;

    use crate::audit::{AuditFilter, AuditType, SqliteAuditStore};
    use crate::testing::fixtures::manifest_for;

    fn solver(config: GlpkConfig) -> (GlpkSolver, AuditService) {
        let audit = AuditService::new(Arc::new(SqliteAuditStore::in_memory().unwrap()));
        let solver = GlpkSolver::new(config, DegeneracyConfig::default(), audit.clone()).with_seed(1);
        (solver, audit)
    }

    fn custom_entries(audit: &AuditService) -> Vec<Value> {
        audit
            .store()
            .query(&AuditFilter::new().with_lottery_id(1).with_audit_type(AuditType::Custom))
            .unwrap()
            .into_iter()
            .map(|record| record.audit)
            .collect()
    }

    #[tokio::test]
    async fn test_empty_group_is_all_orphans() {
        let (solver, _) = solver(GlpkConfig::default().with_binary("/nonexistent/glpsol"));
        let spec = spec(&[(1, &[]), (2, &[])], &[]);
        let result = solver.execute(&manifest_for(&spec), &spec).await.unwrap();
        assert_eq!(result.orphans.families, vec![1, 2]);
        assert!(result.picks.is_empty());
    }

    #[tokio::test]
    async fn test_degenerate_group_goes_greedy_without_optimizer() {
        let (solver, audit) = solver(GlpkConfig::default().with_binary("/nonexistent/glpsol"));
        let spec = spec(&[(1, &[10, 20]), (2, &[10, 20])], &[10, 20]);

        let result = solver.execute(&manifest_for(&spec), &spec).await.unwrap();
        assert!(result.partition_violation(&spec).is_none());
        assert_eq!(result.picks.len(), 2);

        let entries = custom_entries(&audit);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["task"], "GREEDY_FALLBACK");
        assert_eq!(entries[0]["reason"]["degeneracy"]["kind"], "similarity");

        // The audited order replays to the same result.
        let order: Vec<FamilyId> = serde_json::from_value(entries[0]["order"].clone()).unwrap();
        assert_eq!(GreedyFallback.assign_in_order(&spec, &order), result);
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_failure() {
        let (solver, audit) = solver(GlpkConfig::default().with_binary("/nonexistent/glpsol"));
        let spec = spec(&[(1, &[10, 20]), (2, &[20, 10])], &[10, 20]);

        let err = solver.execute(&manifest_for(&spec), &spec).await.unwrap_err();
        assert!(matches!(err, SolverError::Failed(_)));

        let entries = custom_entries(&audit);
        assert_eq!(entries[0]["task"], "GLPK_DISTRIBUTION");
        assert_eq!(entries[0]["status"], "failed");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeouts_escalate_to_hybrid_then_greedy() {
        use crate::testing::fixtures::write_script;

        let dir = tempfile::TempDir::new().unwrap();
        let binary = write_script(dir.path(), "glpsol", "exec sleep 30");
        let config = GlpkConfig::default()
            .with_binary(binary)
            .with_temp_dir(dir.path())
            .with_timeout_ms(200)
            .with_phase1_timeout_ms(100);
        let (solver, audit) = solver(config);
        let spec = spec(
            &[(1, &[10, 20, 30]), (2, &[20, 30, 10]), (3, &[30, 10, 20])],
            &[10, 20, 30],
        );

        let result = solver.execute(&manifest_for(&spec), &spec).await.unwrap();
        assert!(result.partition_violation(&spec).is_none());

        let tasks: Vec<String> = custom_entries(&audit)
            .iter()
            .map(|entry| entry["task"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            tasks,
            vec!["GLPK_DISTRIBUTION", "HYBRID_DISTRIBUTION", "GREEDY_FALLBACK"]
        );
        let entries = custom_entries(&audit);
        assert_eq!(entries[2]["reason"]["error_type"], "timeout");
    }

    #[test]
    fn test_seeded_draws_vary_between_calls_but_replay() {
        let spec = spec(
            &[
                (1, &[10, 20, 30, 40]),
                (2, &[20, 10, 30, 40]),
                (3, &[30, 40, 10, 20]),
                (4, &[40, 30, 20, 10]),
            ],
            &[10, 20, 30, 40],
        );
        let problem = Problem::from_spec(&spec);
        let draws = |solver: &GlpkSolver| -> Vec<TieBreak> {
            (0..8).map(|_| solver.context(&problem).tie_break).collect()
        };

        let (first, _) = solver(GlpkConfig::default());
        let (second, _) = solver(GlpkConfig::default());
        let sequence = draws(&first);

        assert_eq!(sequence, draws(&second));
        assert!(sequence.iter().any(|tie_break| *tie_break != sequence[0]));
    }

    #[test]
    fn test_preferred_units_stop_at_first_sufficient_rank() {
        let spec = spec(
            &[(1, &[10, 20, 30, 40]), (2, &[10, 30, 20, 40])],
            &[10, 20, 30, 40],
        );
        // Rank 1 gives {10}, rank 2 adds 20 and 30.
        assert_eq!(preferred_units(&spec, 2), vec![10, 20, 30]);
    }

    #[test]
    fn test_preferred_units_top_up_short_lists() {
        let spec = spec(&[(1, &[30]), (2, &[30]), (3, &[30])], &[10, 20, 30, 40]);
        assert_eq!(preferred_units(&spec, 3), vec![10, 20, 30]);
    }

    #[test]
    fn test_preferred_units_ignore_units_outside_group() {
        let spec = spec(&[(1, &[99, 10]), (2, &[20])], &[10, 20, 30]);
        assert_eq!(preferred_units(&spec, 2), vec![10, 20]);
    }

    #[test]
    fn test_into_result_maps_placeholders_to_orphans() {
        let spec = spec(&[(1, &[10]), (2, &[10]), (3, &[10])], &[10]);
        let distribution = BTreeMap::from([
            (1, Slot::Placeholder(1)),
            (2, Slot::Unit(10)),
            (3, Slot::Placeholder(2)),
        ]);
        let result = into_result(&spec, &distribution);
        assert_eq!(result.picks, BTreeMap::from([(2, 10)]));
        assert_eq!(result.orphans.families, vec![1, 3]);
        assert!(result.orphans.units.is_empty());
        assert!(result.partition_violation(&spec).is_none());
    }

    /// Every one-to-one assignment of slots to families, with the lowest
    /// worst rank found. Only for tiny problems.
    fn exhaustive_optimum(problem: &Problem) -> (u32, BTreeMap<FamilyId, Slot>) {
        fn assign(
            problem: &Problem,
            families: &[FamilyId],
            taken: &mut Vec<bool>,
            current: &mut BTreeMap<FamilyId, Slot>,
            best: &mut Option<(u32, BTreeMap<FamilyId, Slot>)>,
        ) {
            let Some((family, rest)) = families.split_first() else {
                let worst = problem.worst_rank(current).unwrap_or(0);
                if best.as_ref().map_or(true, |(s, _)| worst < *s) {
                    *best = Some((worst, current.clone()));
                }
                return;
            };
            for (index, slot) in problem.slots().iter().enumerate() {
                if taken[index] {
                    continue;
                }
                taken[index] = true;
                current.insert(*family, *slot);
                assign(problem, rest, taken, current, best);
                current.remove(family);
                taken[index] = false;
            }
        }

        let families: Vec<FamilyId> = problem.family_ids().collect();
        let mut best = None;
        assign(
            problem,
            &families,
            &mut vec![false; problem.slot_count()],
            &mut BTreeMap::new(),
            &mut best,
        );
        best.unwrap()
    }

    #[test]
    fn test_fairness_matches_exhaustive_search() {
        let cases: Vec<(LotterySpec, u32)> = vec![
            // Everyone's first choice is the same unit.
            (
                spec(
                    &[(1, &[10, 20, 30]), (2, &[10, 30, 20]), (3, &[10, 20, 30])],
                    &[10, 20, 30],
                ),
                2,
            ),
            // Cyclic first choices: everybody can be served first.
            (
                spec(
                    &[(1, &[10, 20, 30]), (2, &[20, 30, 10]), (3, &[30, 10, 20])],
                    &[10, 20, 30],
                ),
                1,
            ),
            (
                spec(
                    &[
                        (1, &[10, 20, 30, 40]),
                        (2, &[10, 20, 30, 40]),
                        (3, &[30, 40, 10, 20]),
                        (4, &[30, 40, 20, 10]),
                    ],
                    &[10, 20, 30, 40],
                ),
                2,
            ),
            // One family ends on a placeholder, ranked after its whole list.
            (
                spec(
                    &[
                        (1, &[10, 20, 30]),
                        (2, &[20, 10, 30]),
                        (3, &[30, 20, 10]),
                        (4, &[10, 30, 20]),
                    ],
                    &[10, 20, 30],
                ),
                4,
            ),
        ];

        for (spec, expected) in cases {
            let problem = Problem::with_placeholders(&spec);
            let (optimum, distribution) = exhaustive_optimum(&problem);
            assert_eq!(optimum, expected, "{:?}", spec);
            assert!(optimum <= problem.max_rank());

            let result = into_result(&spec, &distribution);
            assert!(result.partition_violation(&spec).is_none());
            for (family, unit) in &result.picks {
                let rank = problem.rank(*family, Slot::Unit(*unit)).unwrap();
                assert!(rank <= optimum);
            }
            let on_placeholders = distribution
                .iter()
                .filter(|(_, slot)| slot.unit().is_none())
                .count();
            assert_eq!(result.orphans.families.len(), on_placeholders);
            assert_eq!(problem.worst_rank(&distribution), Some(optimum));
        }
    }

    #[test]
    fn test_into_result_orphans_pruned_units() {
        let spec = spec(&[(1, &[10, 20, 30]), (2, &[20, 10, 30])], &[10, 20, 30]);
        let distribution = BTreeMap::from([(1, Slot::Unit(10)), (2, Slot::Unit(20))]);
        let result = into_result(&spec, &distribution);
        assert_eq!(result.orphans.units, vec![30]);
        assert!(result.partition_violation(&spec).is_none());
    }
}
