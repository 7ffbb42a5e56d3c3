//! Solver strategies.
//!
//! A solver assigns the units of one group to its families. The reference
//! solvers ignore preferences and exist for tests; the GLPK solver is the
//! production strategy.

mod degeneracy;
mod error;
pub mod glpk;
mod greedy;
mod reference;
mod traits;

pub use degeneracy::{Degeneracy, DegeneracyDetector};
pub use error::SolverError;
pub use glpk::{GlpkError, GlpkSolver};
pub use greedy::{GreedyFallback, GreedyOutcome, GreedySolver};
pub use reference::{DeterministicSolver, RandomSolver};
pub use traits::Solver;

use crate::audit::AuditService;
use crate::config::{SolverConfig, SolverKind};

/// Create a solver based on configuration.
pub fn create_solver(config: &SolverConfig, audit: AuditService) -> Box<dyn Solver> {
    match config.kind {
        SolverKind::Deterministic => Box::new(DeterministicSolver),
        SolverKind::Random => Box::new(RandomSolver::new()),
        SolverKind::Greedy => Box::new(GreedySolver::new()),
        SolverKind::Glpk => Box::new(GlpkSolver::new(
            config.glpk.clone(),
            config.degeneracy.clone(),
            audit,
        )),
    }
}
