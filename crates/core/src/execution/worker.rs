use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use super::error::{ExecutionError, UNEXPECTED_FAILURE_MESSAGE};
use super::service::ExecutionService;
use crate::audit::FailureAudit;
use crate::lottery::LotteryManifest;
use crate::orchestrator::LotteryOrchestrator;
use crate::storage::StorageError;

/// Handle for sending reserved manifests to the execution worker
///
/// This is cheaply cloneable and can be shared across tasks.
#[derive(Debug, Clone)]
pub struct ExecutionHandle {
    tx: mpsc::Sender<LotteryManifest>,
}

impl ExecutionHandle {
    pub fn new(tx: mpsc::Sender<LotteryManifest>) -> Self {
        Self { tx }
    }

    /// A handle and the receiving end of its queue.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<LotteryManifest>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Queue a manifest, waiting for room if the queue is full.
    pub async fn dispatch(&self, manifest: LotteryManifest) -> Result<(), ExecutionError> {
        self.tx
            .send(manifest)
            .await
            .map_err(|e| ExecutionError::Dispatch(format!("worker stopped: {}", e)))
    }
}

/// Single consumer that runs each manifest to completion.
pub struct ExecutionWorker {
    rx: mpsc::Receiver<LotteryManifest>,
    orchestrator: Arc<LotteryOrchestrator>,
    service: ExecutionService,
}

impl ExecutionWorker {
    pub fn new(
        rx: mpsc::Receiver<LotteryManifest>,
        orchestrator: Arc<LotteryOrchestrator>,
        service: ExecutionService,
    ) -> Self {
        Self {
            rx,
            orchestrator,
            service,
        }
    }

    /// Run until shutdown is signalled or every handle is dropped
    ///
    /// This should be spawned as a background task. Manifests still queued at
    /// shutdown are not run: each gets a FAILURE audit and its lottery is
    /// published again.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(solver = self.orchestrator.solver_name(), "Execution worker started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("Execution worker received shutdown signal");
                    break;
                }
                manifest = self.rx.recv() => match manifest {
                    Some(manifest) => self.process(manifest).await,
                    None => break,
                }
            }
        }
        self.drain();
        info!("Execution worker stopped");
    }

    /// Refuse new manifests and release the ones already queued.
    fn drain(&mut self) {
        self.rx.close();
        let mut released = 0;
        while let Ok(manifest) = self.rx.try_recv() {
            let failure = FailureAudit {
                error_type: "execution".to_string(),
                exception: "WorkerShutdown".to_string(),
                message: "execution worker stopped before the lottery was run".to_string(),
                user_message: UNEXPECTED_FAILURE_MESSAGE.to_string(),
            };
            self.abandon(&manifest, &failure);
            released += 1;
        }
        if released > 0 {
            warn!(released, "Released queued lotteries on shutdown");
        }
    }

    /// Orchestrate one manifest and settle its result.
    pub async fn process(&self, manifest: LotteryManifest) {
        let lottery_id = manifest.lottery_id();
        let result = self.orchestrator.run(&manifest).await;

        // The orchestrator already audited the failure and freed the lottery.
        if result.is_empty() {
            return;
        }

        let e = match self.service.apply_results(lottery_id, &result.picks) {
            Ok(()) => return,
            // Invalidated while running; whoever holds the lottery now owns it.
            Err(ExecutionError::Storage(StorageError::NotReserved(_))) => {
                warn!(
                    lottery_id,
                    execution_uuid = %manifest.uuid(),
                    "Discarding results of a run that lost its reservation"
                );
                return;
            }
            Err(e) => e,
        };

        error!(lottery_id, execution_uuid = %manifest.uuid(), error = %e, "Failed to apply lottery results");
        let failure = FailureAudit {
            error_type: "execution".to_string(),
            exception: format!("ExecutionError({})", e.kind()),
            message: e.to_string(),
            user_message: UNEXPECTED_FAILURE_MESSAGE.to_string(),
        };
        self.abandon(&manifest, &failure);
    }

    fn abandon(&self, manifest: &LotteryManifest, failure: &FailureAudit) {
        let lottery_id = manifest.lottery_id();
        if let Err(e) = self.service.audit().failure(manifest, failure) {
            error!(lottery_id, error = %e, "Failed to audit abandoned execution");
        }
        if let Err(e) = self.service.cancel_execution_reservation(lottery_id) {
            error!(lottery_id, error = %e, "Failed to cancel execution reservation");
        }
    }
}

/// Create the execution pipeline
///
/// Returns:
/// - `ExecutionHandle` - give this to the dispatching `ExecutionService`
/// - `ExecutionWorker` - spawn this with `tokio::spawn(worker.run(shutdown_rx))`
///
/// `service` is used by the worker to settle results; it does not need a dispatcher.
pub fn create_execution_pipeline(
    capacity: usize,
    orchestrator: Arc<LotteryOrchestrator>,
    service: ExecutionService,
) -> (ExecutionHandle, ExecutionWorker) {
    let (handle, rx) = ExecutionHandle::channel(capacity);
    let worker = ExecutionWorker::new(rx, orchestrator, service);
    (handle, worker)
}
