//! Execution of lotteries.
//!
//! The service reserves a lottery with one conditional update, validates its
//! project and sends the manifest through a queue to a single worker, which
//! runs the orchestrator and applies the picks.

mod error;
mod reservation;
mod service;
mod worker;

pub use error::{ExecutionError, UnitTypeMismatch, UNEXPECTED_FAILURE_MESSAGE};
pub use reservation::cancel_reservation;
pub(crate) use reservation::release_reservation;
pub use service::ExecutionService;
pub use worker::{create_execution_pipeline, ExecutionHandle, ExecutionWorker};
