use lottery_core::{AuditService, Config, ExecutionService};

/// Shared application state
pub struct AppState {
    config: Config,
    execution: ExecutionService,
    audit: AuditService,
}

impl AppState {
    pub fn new(config: Config, execution: ExecutionService, audit: AuditService) -> Self {
        Self {
            config,
            execution,
            audit,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn execution(&self) -> &ExecutionService {
        &self.execution
    }

    pub fn audit(&self) -> &AuditService {
        &self.audit
    }
}
