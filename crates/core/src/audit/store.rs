use thiserror::Error;
use uuid::Uuid;

use super::{AuditRecord, AuditType};
use crate::lottery::LotteryId;

#[derive(Debug, Error)]
pub enum AuditStoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Filter for querying audit records
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub lottery_id: Option<LotteryId>,
    pub execution_uuid: Option<Uuid>,
    pub audit_type: Option<AuditType>,
    /// Also return records superseded by a later execution
    pub include_superseded: bool,
    pub limit: i64,
    pub offset: i64,
}

impl AuditFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            offset: 0,
            ..Default::default()
        }
    }

    pub fn with_lottery_id(mut self, lottery_id: LotteryId) -> Self {
        self.lottery_id = Some(lottery_id);
        self
    }

    pub fn with_execution_uuid(mut self, uuid: Uuid) -> Self {
        self.execution_uuid = Some(uuid);
        self
    }

    pub fn with_audit_type(mut self, audit_type: AuditType) -> Self {
        self.audit_type = Some(audit_type);
        self
    }

    pub fn including_superseded(mut self) -> Self {
        self.include_superseded = true;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Append-only storage for audit records.
///
/// Records are never updated except to mark them superseded, which happens
/// only when a new INIT record is written for the same lottery.
pub trait AuditStore: Send + Sync {
    /// Insert an audit record, returns the assigned ID
    fn insert(&self, record: &AuditRecord) -> Result<i64, AuditStoreError>;

    /// Supersede every live record of the record's lottery and insert it, atomically
    fn init(&self, record: &AuditRecord) -> Result<i64, AuditStoreError>;

    /// Query audit records, oldest first
    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditStoreError>;

    /// Count matching audit records
    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditStoreError>;

    /// Most recent live record for a lottery
    fn latest_live(&self, lottery_id: LotteryId) -> Result<Option<AuditRecord>, AuditStoreError>;
}
