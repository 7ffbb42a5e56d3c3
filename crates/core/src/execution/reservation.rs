use tracing::{error, info};

use crate::lottery::LotteryId;
use crate::metrics::RESERVATIONS_CANCELLED;
use crate::storage::{LotteryStore, StorageError};

/// Publish a reserved lottery again so it can be retried. Assignments are untouched.
///
/// Every path that gives up on a reservation goes through here.
pub fn cancel_reservation(store: &dyn LotteryStore, lottery_id: LotteryId) -> Result<(), StorageError> {
    store.republish(lottery_id)?;
    RESERVATIONS_CANCELLED.inc();
    info!(lottery_id, "Execution reservation cancelled");
    Ok(())
}

/// [`cancel_reservation`] for failure paths that have nowhere to return an error.
pub(crate) fn release_reservation(store: &dyn LotteryStore, lottery_id: LotteryId) {
    if let Err(e) = cancel_reservation(store, lottery_id) {
        error!(lottery_id, error = %e, "Failed to cancel execution reservation");
    }
}
