//! Error types for the GLPK optimizer backend.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while modeling, running or reading the optimizer.
#[derive(Debug, Error)]
pub enum GlpkError {
    /// The `glpsol` binary could not be started.
    #[error("GLPK binary not found at path: {path}")]
    BinaryNotFound { path: PathBuf },

    /// The optimizer proved there is no solution under the given constraints.
    #[error("Model is infeasible: {reason}")]
    Infeasible { reason: String },

    /// The optimizer exceeded its time budget.
    #[error("Optimizer timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// The optimizer exited unsuccessfully.
    #[error("Optimizer exited with code {exit_code:?}: {output}")]
    ProcessFailed {
        exit_code: Option<i32>,
        output: String,
    },

    /// The optimizer exited cleanly but wrote no solution.
    #[error("Optimizer wrote no solution to {path}")]
    MissingSolution { path: PathBuf },

    /// The solution could not be understood.
    #[error("Failed to parse optimizer solution: {reason}")]
    Parse { reason: String },

    /// A task was started without a parameter it needs.
    #[error("Task {task} requires parameter {parameter}")]
    MissingParameter {
        task: &'static str,
        parameter: &'static str,
    },

    /// I/O error on temp artifacts or process pipes.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GlpkError {
    pub fn infeasible(reason: impl Into<String>) -> Self {
        Self::Infeasible {
            reason: reason.into(),
        }
    }

    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }

    pub fn is_infeasible(&self) -> bool {
        matches!(self, Self::Infeasible { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Short, stable name of the variant for logs and audits.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BinaryNotFound { .. } => "binary_not_found",
            Self::Infeasible { .. } => "infeasible",
            Self::Timeout { .. } => "timeout",
            Self::ProcessFailed { .. } => "process_failed",
            Self::MissingSolution { .. } => "missing_solution",
            Self::Parse { .. } => "parse",
            Self::MissingParameter { .. } => "missing_parameter",
            Self::Io(_) => "io",
        }
    }
}
