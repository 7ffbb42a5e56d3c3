use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use super::{AuditRecord, AuditStore, AuditStoreError, AuditType, FailureAudit};
use crate::lottery::{ExecutionResult, LotteryId, LotteryManifest, ProjectId, UnitTypeId};

/// Writes one audit record per significant step of a lottery run.
///
/// Cheap to clone; every clone writes to the same store.
#[derive(Clone)]
pub struct AuditService {
    store: Arc<dyn AuditStore>,
}

impl AuditService {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    /// Start a new audit trail for the manifest's lottery, superseding the previous one.
    pub fn init(&self, manifest: &LotteryManifest) -> Result<i64, AuditStoreError> {
        let payload = to_json(manifest)?;
        self.store
            .init(&AuditRecord::for_manifest(manifest, AuditType::Init, payload))
    }

    /// Record an arbitrary step, e.g. one optimizer task.
    pub fn custom<T: Serialize>(
        &self,
        manifest: &LotteryManifest,
        data: &T,
    ) -> Result<i64, AuditStoreError> {
        let payload = to_json(data)?;
        self.store
            .insert(&AuditRecord::for_manifest(manifest, AuditType::Custom, payload))
    }

    pub fn group_execution(
        &self,
        manifest: &LotteryManifest,
        unit_type_id: UnitTypeId,
        result: &ExecutionResult,
    ) -> Result<i64, AuditStoreError> {
        let payload = json!({
            "unit_type_id": unit_type_id,
            "result": to_json(result)?,
        });
        self.store.insert(&AuditRecord::for_manifest(
            manifest,
            AuditType::GroupExecution,
            payload,
        ))
    }

    pub fn project_execution(
        &self,
        manifest: &LotteryManifest,
        result: &ExecutionResult,
    ) -> Result<i64, AuditStoreError> {
        let payload = to_json(result)?;
        self.store.insert(&AuditRecord::for_manifest(
            manifest,
            AuditType::ProjectExecution,
            payload,
        ))
    }

    pub fn failure(
        &self,
        manifest: &LotteryManifest,
        failure: &FailureAudit,
    ) -> Result<i64, AuditStoreError> {
        let payload = to_json(failure)?;
        self.store
            .insert(&AuditRecord::for_manifest(manifest, AuditType::Failure, payload))
    }

    /// Record an invalidation, correlated with the lottery's live execution.
    pub fn invalidate(
        &self,
        project_id: ProjectId,
        lottery_id: LotteryId,
    ) -> Result<i64, AuditStoreError> {
        let execution_uuid = match self.store.latest_live(lottery_id)? {
            Some(record) => record.execution_uuid,
            None => {
                warn!(lottery_id, "Invalidating a lottery without a live audit trail");
                Uuid::nil()
            }
        };

        self.store.insert(&AuditRecord::new(
            execution_uuid,
            project_id,
            lottery_id,
            AuditType::Invalidate,
            json!({}),
        ))
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<serde_json::Value, AuditStoreError> {
    serde_json::to_value(value).map_err(|e| AuditStoreError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditFilter, SqliteAuditStore};
    use crate::lottery::LotterySpec;
    use std::collections::{BTreeMap, BTreeSet};

    fn service() -> AuditService {
        AuditService::new(Arc::new(SqliteAuditStore::in_memory().unwrap()))
    }

    fn manifest(lottery_id: LotteryId) -> LotteryManifest {
        let spec = LotterySpec::new(BTreeMap::from([(1, vec![10]), (2, vec![10])]), vec![10]);
        LotteryManifest::new(4, lottery_id, BTreeMap::from([(3, spec)]), BTreeSet::new())
    }

    #[test]
    fn test_init_stores_manifest_snapshot() {
        let audit = service();
        let manifest = manifest(1);
        audit.init(&manifest).unwrap();

        let record = audit.store().latest_live(1).unwrap().unwrap();
        assert_eq!(record.audit_type, AuditType::Init);
        assert_eq!(record.execution_uuid, manifest.uuid());
        assert_eq!(record.project_id, 4);
        assert_eq!(record.audit["lottery_id"], 1);
        assert!(record.audit["groups"]["3"].is_object());
    }

    #[test]
    fn test_new_init_leaves_single_live_trail() {
        let audit = service();
        let first = manifest(1);
        audit.init(&first).unwrap();
        audit
            .custom(&first, &json!({"task": "MIN_SATISFACTION"}))
            .unwrap();

        let second = manifest(1);
        audit.init(&second).unwrap();

        let live = audit
            .store()
            .query(&AuditFilter::new().with_lottery_id(1))
            .unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].execution_uuid, second.uuid());
    }

    #[test]
    fn test_failure_payload_shape() {
        let audit = service();
        let manifest = manifest(2);
        audit
            .failure(
                &manifest,
                &FailureAudit {
                    error_type: "timeout".to_string(),
                    exception: "SolverError::Timeout".to_string(),
                    message: "optimizer timed out".to_string(),
                    user_message: "An error occurred".to_string(),
                },
            )
            .unwrap();

        let record = audit.store().latest_live(2).unwrap().unwrap();
        assert_eq!(record.audit_type, AuditType::Failure);
        assert_eq!(record.audit["error_type"], "timeout");
        assert_eq!(record.audit["exception"], "SolverError::Timeout");
        assert_eq!(record.audit["user_message"], "An error occurred");
    }

    #[test]
    fn test_group_execution_records_unit_type() {
        let audit = service();
        let manifest = manifest(3);
        let result = ExecutionResult::pair(&[1, 2], &[10]);
        audit.group_execution(&manifest, 3, &result).unwrap();

        let record = audit.store().latest_live(3).unwrap().unwrap();
        assert_eq!(record.audit["unit_type_id"], 3);
        assert_eq!(record.audit["result"]["picks"]["1"], 10);
        assert_eq!(record.audit["result"]["orphans"]["families"][0], 2);
    }

    #[test]
    fn test_invalidate_correlates_with_live_execution() {
        let audit = service();
        let manifest = manifest(5);
        audit.init(&manifest).unwrap();
        audit.invalidate(4, 5).unwrap();

        let record = audit.store().latest_live(5).unwrap().unwrap();
        assert_eq!(record.audit_type, AuditType::Invalidate);
        assert_eq!(record.execution_uuid, manifest.uuid());
    }

    #[test]
    fn test_invalidate_without_trail_uses_nil_uuid() {
        let audit = service();
        audit.invalidate(4, 42).unwrap();
        let record = audit.store().latest_live(42).unwrap().unwrap();
        assert_eq!(record.execution_uuid, Uuid::nil());
    }
}
