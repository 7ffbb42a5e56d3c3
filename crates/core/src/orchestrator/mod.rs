//! Lottery orchestrator.
//!
//! Runs one solver over every unit-type group of a manifest, then gives the
//! leftover families and units a second chance against each other:
//! - **First pass**: groups run sequentially, each result audited and signalled
//! - **Orphan pass**: pooled orphan units offered to every orphan family
//! - **Failure boundary**: errors and panics become a FAILURE audit, a freed
//!   lottery and an empty result

mod runner;
mod types;

pub use runner::LotteryOrchestrator;
pub use types::OrchestratorError;
