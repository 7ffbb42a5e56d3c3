//! Preference-blind reference solvers for tests and development.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::error::SolverError;
use super::traits::Solver;
use crate::lottery::{ExecutionResult, FamilyId, LotteryManifest, LotterySpec, UnitId};

/// Pairs families and units in ascending id order.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeterministicSolver;

#[async_trait]
impl Solver for DeterministicSolver {
    fn name(&self) -> &str {
        "deterministic"
    }

    async fn execute(
        &self,
        _manifest: &LotteryManifest,
        spec: &LotterySpec,
    ) -> Result<ExecutionResult, SolverError> {
        let families: Vec<FamilyId> = spec.family_ids().collect();
        let mut units: Vec<UnitId> = spec.units().to_vec();
        units.sort_unstable();
        Ok(ExecutionResult::pair(&families, &units))
    }
}

/// Pairs families and units after shuffling both sides.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSolver {
    seed: Option<u64>,
}

impl RandomSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shuffle with a fixed seed, for reproducible runs.
    pub fn with_seed(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }
}

#[async_trait]
impl Solver for RandomSolver {
    fn name(&self) -> &str {
        "random"
    }

    async fn execute(
        &self,
        _manifest: &LotteryManifest,
        spec: &LotterySpec,
    ) -> Result<ExecutionResult, SolverError> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut families: Vec<FamilyId> = spec.family_ids().collect();
        let mut units: Vec<UnitId> = spec.units().to_vec();
        families.shuffle(&mut rng);
        units.shuffle(&mut rng);
        Ok(ExecutionResult::pair(&families, &units))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::{manifest_for, spec};
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_deterministic_pairs_sorted_ids() {
        let spec = spec(&[(3, &[]), (1, &[]), (2, &[])], &[30, 10]);
        let result = DeterministicSolver
            .execute(&manifest_for(&spec), &spec)
            .await
            .unwrap();

        assert_eq!(result.picks, BTreeMap::from([(1, 10), (2, 30)]));
        assert_eq!(result.orphans.families, vec![3]);
        assert!(result.orphans.units.is_empty());
    }

    #[tokio::test]
    async fn test_random_partitions_every_time() {
        let spec = spec(&[(1, &[]), (2, &[]), (3, &[]), (4, &[])], &[10, 20, 30]);
        let manifest = manifest_for(&spec);
        for _ in 0..20 {
            let result = RandomSolver::new().execute(&manifest, &spec).await.unwrap();
            assert!(result.partition_violation(&spec).is_none());
            assert_eq!(result.picks.len(), 3);
            assert_eq!(result.orphans.families.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_random_with_seed_is_reproducible() {
        let spec = spec(&[(1, &[]), (2, &[]), (3, &[])], &[10, 20, 30]);
        let manifest = manifest_for(&spec);
        let a = RandomSolver::with_seed(11).execute(&manifest, &spec).await.unwrap();
        let b = RandomSolver::with_seed(11).execute(&manifest, &spec).await.unwrap();
        assert_eq!(a, b);
    }
}
