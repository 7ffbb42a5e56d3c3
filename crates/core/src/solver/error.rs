use thiserror::Error;

use super::glpk::GlpkError;

/// Errors a solver strategy reports to the orchestrator.
#[derive(Debug, Error)]
pub enum SolverError {
    /// No assignment satisfies the constraints.
    #[error("No feasible assignment: {0}")]
    Infeasible(String),

    /// The strategy ran out of time.
    #[error("Solver timed out: {0}")]
    Timeout(String),

    /// Anything else.
    #[error("Solver failed: {0}")]
    Failed(String),
}

impl SolverError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Infeasible(_) => "infeasible",
            Self::Timeout(_) => "timeout",
            Self::Failed(_) => "failed",
        }
    }
}

impl From<GlpkError> for SolverError {
    fn from(err: GlpkError) -> Self {
        match err {
            GlpkError::Infeasible { .. } => Self::Infeasible(err.to_string()),
            GlpkError::Timeout { .. } => Self::Timeout(err.to_string()),
            other => Self::Failed(other.to_string()),
        }
    }
}
