//! Greedy first-available-preference assignment.
//!
//! Families take turns in a shuffled order; each takes its most preferred
//! unit still on the table. No optimality guarantee, but it never stalls.

use std::collections::BTreeSet;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::info;

use super::error::SolverError;
use super::traits::Solver;
use crate::lottery::{ExecutionResult, FamilyId, LotteryManifest, LotterySpec, UnitId};

/// A greedy run: the turn order it used and what it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GreedyOutcome {
    pub order: Vec<FamilyId>,
    pub result: ExecutionResult,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyFallback;

impl GreedyFallback {
    /// Let families pick in `order`. Units a family lists but the group does
    /// not offer are skipped.
    pub fn assign_in_order(&self, spec: &LotterySpec, order: &[FamilyId]) -> ExecutionResult {
        let mut available: BTreeSet<UnitId> = spec.units().iter().copied().collect();
        let mut result = ExecutionResult::empty();

        for family in order {
            let pick = spec
                .preferences(*family)
                .iter()
                .copied()
                .find(|unit| available.contains(unit));
            match pick {
                Some(unit) => {
                    available.remove(&unit);
                    result.picks.insert(*family, unit);
                }
                None => result.orphans.families.push(*family),
            }
        }

        result.orphans.units = spec
            .units()
            .iter()
            .copied()
            .filter(|unit| available.contains(unit))
            .collect();
        result
    }

    pub fn execute_with_rng<R: Rng + ?Sized>(&self, spec: &LotterySpec, rng: &mut R) -> GreedyOutcome {
        let mut order: Vec<FamilyId> = spec.family_ids().collect();
        order.shuffle(rng);
        let result = self.assign_in_order(spec, &order);
        GreedyOutcome { order, result }
    }

    pub fn execute(&self, spec: &LotterySpec) -> GreedyOutcome {
        self.execute_with_rng(spec, &mut StdRng::from_entropy())
    }
}

/// The greedy fallback as a standalone strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedySolver {
    greedy: GreedyFallback,
}

impl GreedySolver {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Solver for GreedySolver {
    fn name(&self) -> &str {
        "greedy"
    }

    async fn execute(
        &self,
        manifest: &LotteryManifest,
        spec: &LotterySpec,
    ) -> Result<ExecutionResult, SolverError> {
        let outcome = self.greedy.execute(spec);
        info!(
            execution_uuid = %manifest.uuid(),
            families = spec.family_count(),
            picks = outcome.result.picks.len(),
            "Greedy assignment completed"
        );
        Ok(outcome.result)
    }
}
