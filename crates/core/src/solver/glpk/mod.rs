//! GLPK optimizer backend.
//!
//! Every task renders a fixed GMPL model plus a data file for the group,
//! runs `glpsol` under a hard deadline and reads the solution report back.

mod data;
mod engine;
mod error;
mod files;
pub mod model;
pub mod parser;
mod problem;
mod process;
mod solver;
pub mod tasks;

pub use data::{render, Scalar, TieBreak, UNRANKED_PENALTY};
pub use engine::{GlpkEngine, Solved};
pub use error::GlpkError;
pub use files::{Artifacts, Workspace};
pub use problem::{Problem, Slot};
pub use process::{Invocation, ProcessExecutor, ProcessOutput};
pub use solver::GlpkSolver;
pub use tasks::{Task, TaskContext, TaskOutput, TaskResult, TaskRunner, TaskRunnerFactory};
