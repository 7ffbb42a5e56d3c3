pub mod audit;
pub mod config;
pub mod execution;
pub mod lottery;
pub mod metrics;
pub mod orchestrator;
pub mod solver;
pub mod storage;
pub mod testing;

pub use audit::{
    AuditFilter, AuditRecord, AuditService, AuditStore, AuditStoreError, AuditType, FailureAudit,
    SqliteAuditStore,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DatabaseConfig,
    DegeneracyConfig, ExecutionConfig, GlpkConfig, ServerConfig, SolverConfig, SolverKind,
};
pub use execution::{
    cancel_reservation, create_execution_pipeline, ExecutionError, ExecutionHandle,
    ExecutionService, ExecutionWorker, UnitTypeMismatch,
};
pub use lottery::{
    ExecutionOption, ExecutionResult, FamilyId, LotteryEvent, LotteryEvents, LotteryId,
    LotteryManifest, LotterySpec, Orphans, ProjectId, UnitId, UnitTypeId,
};
pub use orchestrator::{LotteryOrchestrator, OrchestratorError};
pub use solver::{
    create_solver, DeterministicSolver, GlpkSolver, GreedySolver, RandomSolver, Solver,
    SolverError,
};
pub use storage::{Ineligibility, Lottery, LotteryStore, SqliteLotteryStore, StorageError};
