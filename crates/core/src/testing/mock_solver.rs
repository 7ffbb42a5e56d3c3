//! Mock solver for testing.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::lottery::{ExecutionResult, FamilyId, LotteryManifest, LotterySpec, UnitId};
use crate::solver::{Solver, SolverError};

/// A recorded solve call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedSolve {
    /// Execution the call belonged to.
    pub execution_uuid: Uuid,
    /// The group that was solved.
    pub spec: LotterySpec,
}

/// Scripted response for the next call.
#[derive(Debug)]
pub enum MockResponse {
    Result(ExecutionResult),
    Error(SolverError),
    Panic(String),
}

/// Mock implementation of the Solver trait.
///
/// Responses are consumed in order; once the script runs out, the mock
/// pairs sorted families and units like the deterministic solver.
///
/// # Example
///
/// ```rust,ignore
/// use lottery_core::testing::MockSolver;
///
/// let solver = MockSolver::new();
/// solver.push_error(SolverError::Infeasible("no way".into())).await;
///
/// // First group fails, later groups are paired
/// let calls = solver.recorded_calls().await;
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockSolver {
    calls: Arc<RwLock<Vec<RecordedSolve>>>,
    script: Arc<RwLock<VecDeque<MockResponse>>>,
}

impl MockSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next unanswered call with `result`.
    pub async fn push_result(&self, result: ExecutionResult) {
        self.script
            .write()
            .await
            .push_back(MockResponse::Result(result));
    }

    /// Fail the next unanswered call with `error`.
    pub async fn push_error(&self, error: SolverError) {
        self.script.write().await.push_back(MockResponse::Error(error));
    }

    /// Panic on the next unanswered call.
    pub async fn push_panic(&self, message: impl Into<String>) {
        self.script
            .write()
            .await
            .push_back(MockResponse::Panic(message.into()));
    }

    pub async fn recorded_calls(&self) -> Vec<RecordedSolve> {
        self.calls.read().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }
}

#[async_trait]
impl Solver for MockSolver {
    fn name(&self) -> &str {
        "mock"
    }

    async fn execute(
        &self,
        manifest: &LotteryManifest,
        spec: &LotterySpec,
    ) -> Result<ExecutionResult, SolverError> {
        self.calls.write().await.push(RecordedSolve {
            execution_uuid: manifest.uuid(),
            spec: spec.clone(),
        });

        let next = self.script.write().await.pop_front();
        match next {
            Some(MockResponse::Result(result)) => Ok(result),
            Some(MockResponse::Error(error)) => Err(error),
            Some(MockResponse::Panic(message)) => panic!("{}", message),
            None => {
                let families: Vec<FamilyId> = spec.family_ids().collect();
                let mut units: Vec<UnitId> = spec.units().to_vec();
                units.sort_unstable();
                Ok(ExecutionResult::pair(&families, &units))
            }
        }
    }
}
