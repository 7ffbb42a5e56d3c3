//! Lottery orchestrator implementation.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditService, FailureAudit};
use crate::execution::{release_reservation, UNEXPECTED_FAILURE_MESSAGE};
use crate::lottery::{
    ExecutionResult, LotteryEvent, LotteryEvents, LotteryManifest, LotterySpec, Orphans,
    UnitTypeId,
};
use crate::metrics::ORCHESTRATIONS;
use crate::solver::Solver;
use crate::storage::LotteryStore;

use super::types::OrchestratorError;

/// Drives one solver across every group of a manifest.
pub struct LotteryOrchestrator {
    solver: Arc<dyn Solver>,
    audit: AuditService,
    store: Arc<dyn LotteryStore>,
    events: LotteryEvents,
}

impl LotteryOrchestrator {
    pub fn new(
        solver: Arc<dyn Solver>,
        audit: AuditService,
        store: Arc<dyn LotteryStore>,
        events: LotteryEvents,
    ) -> Self {
        Self {
            solver,
            audit,
            store,
            events,
        }
    }

    pub fn solver_name(&self) -> &str {
        self.solver.name()
    }

    /// Run the manifest to completion.
    ///
    /// Never fails: on any error or panic the failure is audited, the lottery
    /// is published again and an empty result is returned.
    pub async fn run(&self, manifest: &LotteryManifest) -> ExecutionResult {
        let started = Instant::now();
        info!(
            execution_uuid = %manifest.uuid(),
            lottery_id = manifest.lottery_id(),
            groups = manifest.groups().len(),
            solver = self.solver.name(),
            "Starting lottery run"
        );

        let error = match AssertUnwindSafe(self.execute(manifest)).catch_unwind().await {
            Ok(Ok(result)) => {
                ORCHESTRATIONS.with_label_values(&["completed"]).inc();
                info!(
                    execution_uuid = %manifest.uuid(),
                    lottery_id = manifest.lottery_id(),
                    picks = result.picks.len(),
                    orphan_families = result.orphans.families.len(),
                    orphan_units = result.orphans.units.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Lottery run completed"
                );
                return result;
            }
            Ok(Err(e)) => e,
            Err(panic) => OrchestratorError::Panicked(panic_message(panic)),
        };

        self.fail(manifest, &error);
        ExecutionResult::empty()
    }

    async fn execute(&self, manifest: &LotteryManifest) -> Result<ExecutionResult, OrchestratorError> {
        let mut aggregate = ExecutionResult::empty();

        for (unit_type_id, spec) in manifest.groups() {
            let result = self.solve(manifest, spec, Some(*unit_type_id)).await?;

            if let Err(e) = self.audit.group_execution(manifest, *unit_type_id, &result) {
                warn!(unit_type_id, error = %e, "Failed to audit group execution");
            }
            self.events.publish(LotteryEvent::GroupExecuted {
                execution_uuid: manifest.uuid(),
                lottery_id: manifest.lottery_id(),
                unit_type_id: *unit_type_id,
                result: result.clone(),
            });

            aggregate.absorb(result);
        }

        if let Some(spec) = orphan_spec(&aggregate.orphans) {
            debug!(
                execution_uuid = %manifest.uuid(),
                families = spec.family_count(),
                units = spec.unit_count(),
                "Running orphan pass"
            );
            let second = self.solve(manifest, &spec, None).await?;
            aggregate.picks.extend(second.picks);
            aggregate.orphans = second.orphans;
        }

        if let Err(e) = self.audit.project_execution(manifest, &aggregate) {
            warn!(error = %e, "Failed to audit project execution");
        }
        self.events.publish(LotteryEvent::ProjectExecuted {
            execution_uuid: manifest.uuid(),
            project_id: manifest.project_id(),
            lottery_id: manifest.lottery_id(),
            result: aggregate.clone(),
        });

        Ok(aggregate)
    }

    async fn solve(
        &self,
        manifest: &LotteryManifest,
        spec: &LotterySpec,
        unit_type_id: Option<UnitTypeId>,
    ) -> Result<ExecutionResult, OrchestratorError> {
        let result = self.solver.execute(manifest, spec).await?;
        match result.partition_violation(spec) {
            None => Ok(result),
            Some(reason) => Err(OrchestratorError::InvalidResult {
                unit_type_id,
                reason,
            }),
        }
    }

    fn fail(&self, manifest: &LotteryManifest, error: &OrchestratorError) {
        ORCHESTRATIONS.with_label_values(&["failed"]).inc();
        error!(
            execution_uuid = %manifest.uuid(),
            lottery_id = manifest.lottery_id(),
            error_type = error.error_type(),
            error = %error,
            "Lottery run failed"
        );

        let failure = FailureAudit {
            error_type: error.error_type().to_string(),
            exception: error.exception().to_string(),
            message: error.to_string(),
            user_message: UNEXPECTED_FAILURE_MESSAGE.to_string(),
        };
        if let Err(e) = self.audit.failure(manifest, &failure) {
            error!(lottery_id = manifest.lottery_id(), error = %e, "Failed to audit run failure");
        }

        release_reservation(self.store.as_ref(), manifest.lottery_id());

        self.events.publish(LotteryEvent::ExecutionFailed {
            execution_uuid: manifest.uuid(),
            lottery_id: manifest.lottery_id(),
            error_type: error.error_type().to_string(),
            message: error.to_string(),
        });
    }
}

/// Every orphan family prefers every orphan unit, in pooled order.
fn orphan_spec(orphans: &Orphans) -> Option<LotterySpec> {
    if orphans.families.is_empty() || orphans.units.is_empty() {
        return None;
    }
    let families = orphans
        .families
        .iter()
        .map(|family| (*family, orphans.units.clone()))
        .collect();
    Some(LotterySpec::new(families, orphans.units.clone()))
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
