//! Solver strategy seam.

use async_trait::async_trait;

use super::error::SolverError;
use crate::lottery::{ExecutionResult, LotteryManifest, LotterySpec};

/// Assigns the units of one group to its families.
///
/// A solver sees one group at a time. The manifest is passed along for
/// audit correlation only.
#[async_trait]
pub trait Solver: Send + Sync {
    /// Returns the name of this solver implementation.
    fn name(&self) -> &str;

    /// Solve one group. The result must partition the spec's families and units.
    async fn execute(
        &self,
        manifest: &LotteryManifest,
        spec: &LotterySpec,
    ) -> Result<ExecutionResult, SolverError>;
}
