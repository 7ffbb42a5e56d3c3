use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use super::error::{ExecutionError, UnitTypeMismatch};
use super::reservation::{cancel_reservation, release_reservation};
use super::worker::ExecutionHandle;
use crate::audit::AuditService;
use crate::lottery::{ExecutionOption, FamilyId, LotteryId, LotteryManifest, ProjectId, UnitId};
use crate::metrics::LOTTERY_EXECUTIONS;
use crate::storage::{Ineligibility, LotteryStore, StorageError};

/// Reserves lotteries for execution, settles their results and rolls them back.
#[derive(Clone)]
pub struct ExecutionService {
    store: Arc<dyn LotteryStore>,
    audit: AuditService,
    dispatcher: Option<ExecutionHandle>,
    defer_dispatch: bool,
}

impl ExecutionService {
    /// A service that can settle and roll back executions but not start them.
    pub fn new(store: Arc<dyn LotteryStore>, audit: AuditService) -> Self {
        Self {
            store,
            audit,
            dispatcher: None,
            defer_dispatch: false,
        }
    }

    /// Send reserved manifests to `handle`, from a detached task when `defer` is set.
    pub fn with_dispatcher(mut self, handle: ExecutionHandle, defer: bool) -> Self {
        self.dispatcher = Some(handle);
        self.defer_dispatch = defer;
        self
    }

    pub fn audit(&self) -> &AuditService {
        &self.audit
    }

    /// Reserve the lottery, validate its project and hand the manifest to the worker.
    ///
    /// Any failure after the reservation publishes the lottery again before
    /// the error is returned.
    pub async fn execute(
        &self,
        lottery_id: LotteryId,
        options: BTreeSet<ExecutionOption>,
    ) -> Result<LotteryManifest, ExecutionError> {
        let result = self.reserve_and_dispatch(lottery_id, options).await;
        let label = if result.is_ok() { "reserved" } else { "rejected" };
        LOTTERY_EXECUTIONS.with_label_values(&[label]).inc();
        result
    }

    async fn reserve_and_dispatch(
        &self,
        lottery_id: LotteryId,
        options: BTreeSet<ExecutionOption>,
    ) -> Result<LotteryManifest, ExecutionError> {
        let now = Utc::now();
        if !self.store.reserve_for_execution(lottery_id, now)? {
            // The lottery may have changed since the update; an eligible answer
            // means another caller won the race.
            let reason = self
                .store
                .diagnose(lottery_id, now)?
                .unwrap_or(Ineligibility::AlreadyExecutedOrExecuting);
            info!(lottery_id, ?reason, "Lottery cannot be executed");
            return Err(ExecutionError::CannotExecuteLottery { lottery_id, reason });
        }

        let manifest = match self.prepare(lottery_id, options) {
            Ok(manifest) => manifest,
            Err(e) => {
                self.cancel_after(lottery_id, &e);
                return Err(e);
            }
        };

        info!(
            lottery_id,
            execution_uuid = %manifest.uuid(),
            groups = manifest.groups().len(),
            "Lottery reserved for execution"
        );

        if let Err(e) = self.dispatch(manifest.clone()).await {
            self.cancel_after(lottery_id, &e);
            return Err(e);
        }

        Ok(manifest)
    }

    /// Validate the reserved lottery's project, build the manifest and start its audit trail.
    fn prepare(
        &self,
        lottery_id: LotteryId,
        options: BTreeSet<ExecutionOption>,
    ) -> Result<LotteryManifest, ExecutionError> {
        let lottery = self
            .store
            .lottery(lottery_id)?
            .ok_or(StorageError::LotteryNotFound(lottery_id))?;

        self.validate(lottery.project_id, &options)?;

        let groups = self.store.project_groups(lottery.project_id)?;
        let manifest = LotteryManifest::new(lottery.project_id, lottery_id, groups, options);
        self.audit.init(&manifest)?;
        Ok(manifest)
    }

    fn validate(
        &self,
        project_id: ProjectId,
        options: &BTreeSet<ExecutionOption>,
    ) -> Result<(), ExecutionError> {
        let count = self.store.family_count(project_id)?;
        if count < 2 {
            return Err(ExecutionError::InsufficientFamilies { count });
        }

        if self.store.has_assigned_units(project_id)? {
            return Err(ExecutionError::Integrity(format!(
                "project {} already has assigned units",
                project_id
            )));
        }

        if !options.contains(&ExecutionOption::MismatchAllowed) {
            let mismatches: Vec<UnitTypeMismatch> = self
                .store
                .unit_type_counts(project_id)?
                .iter()
                .filter_map(UnitTypeMismatch::from_counts)
                .collect();
            if !mismatches.is_empty() {
                return Err(ExecutionError::RequiresConfirmation {
                    option: ExecutionOption::MismatchAllowed,
                    mismatches,
                });
            }
        }

        Ok(())
    }

    async fn dispatch(&self, manifest: LotteryManifest) -> Result<(), ExecutionError> {
        let handle = self
            .dispatcher
            .clone()
            .ok_or_else(|| ExecutionError::Dispatch("no execution worker".to_string()))?;

        if !self.defer_dispatch {
            return handle.dispatch(manifest).await;
        }

        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let lottery_id = manifest.lottery_id();
            if let Err(e) = handle.dispatch(manifest).await {
                error!(lottery_id, error = %e, "Deferred dispatch failed");
                release_reservation(store.as_ref(), lottery_id);
            }
        });
        Ok(())
    }

    /// Assign the picked units and mark the lottery executed.
    pub fn apply_results(
        &self,
        lottery_id: LotteryId,
        picks: &BTreeMap<FamilyId, UnitId>,
    ) -> Result<(), ExecutionError> {
        self.store.apply_picks(lottery_id, picks)?;
        info!(lottery_id, picks = picks.len(), "Lottery results applied");
        Ok(())
    }

    /// Roll the lottery back to its pre-execution state.
    pub fn invalidate(&self, lottery_id: LotteryId) -> Result<(), ExecutionError> {
        let lottery = self
            .store
            .lottery(lottery_id)?
            .ok_or(StorageError::LotteryNotFound(lottery_id))?;

        self.store.invalidate(lottery_id)?;
        info!(lottery_id, project_id = lottery.project_id, "Lottery invalidated");

        // The rollback is committed; a missing audit record must not undo it.
        if let Err(e) = self.audit.invalidate(lottery.project_id, lottery_id) {
            error!(lottery_id, error = %e, "Failed to audit invalidation");
        }
        Ok(())
    }

    /// Publish the lottery again so it can be retried. Assignments are untouched.
    pub fn cancel_execution_reservation(&self, lottery_id: LotteryId) -> Result<(), ExecutionError> {
        Ok(cancel_reservation(self.store.as_ref(), lottery_id)?)
    }

    fn cancel_after(&self, lottery_id: LotteryId, cause: &ExecutionError) {
        warn!(lottery_id, error = %cause, kind = cause.kind(), "Execution aborted");
        release_reservation(self.store.as_ref(), lottery_id);
    }
}
