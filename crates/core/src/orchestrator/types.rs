//! Types for the lottery orchestrator.

use thiserror::Error;

use crate::lottery::UnitTypeId;
use crate::solver::SolverError;

/// Errors that end an orchestrated run.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The solver reported a failure.
    #[error(transparent)]
    Solver(#[from] SolverError),

    /// The solver returned picks and orphans that do not partition its group.
    #[error("invalid result for {}: {reason}", group_label(.unit_type_id))]
    InvalidResult {
        /// `None` for the orphan pass.
        unit_type_id: Option<UnitTypeId>,
        reason: String,
    },

    /// The solver panicked.
    #[error("solver panicked: {0}")]
    Panicked(String),
}

impl OrchestratorError {
    /// Coarse class recorded in the FAILURE audit.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Solver(SolverError::Infeasible(_)) => "infeasible",
            Self::Solver(SolverError::Timeout(_)) => "timeout",
            Self::Solver(SolverError::Failed(_)) => "execution",
            Self::InvalidResult { .. } | Self::Panicked(_) => "unexpected",
        }
    }

    /// Identity of the error value.
    pub fn exception(&self) -> &'static str {
        match self {
            Self::Solver(SolverError::Infeasible(_)) => "SolverError::Infeasible",
            Self::Solver(SolverError::Timeout(_)) => "SolverError::Timeout",
            Self::Solver(SolverError::Failed(_)) => "SolverError::Failed",
            Self::InvalidResult { .. } => "OrchestratorError::InvalidResult",
            Self::Panicked(_) => "OrchestratorError::Panicked",
        }
    }
}

fn group_label(unit_type_id: &Option<UnitTypeId>) -> String {
    match unit_type_id {
        Some(id) => format!("unit type {}", id),
        None => "orphan pass".to_string(),
    }
}
