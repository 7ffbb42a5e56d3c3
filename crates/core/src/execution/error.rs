use serde::Serialize;
use thiserror::Error;

use crate::audit::AuditStoreError;
use crate::lottery::{ExecutionOption, LotteryId, UnitTypeId};
use crate::storage::{Ineligibility, StorageError, UnitTypeCount};

/// Shown whenever a run fails for a reason the administrator cannot act on.
pub const UNEXPECTED_FAILURE_MESSAGE: &str =
    "An error occurred during lottery execution. Please contact the system administrator.";

/// A unit type whose unit and family counts differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitTypeMismatch {
    pub unit_type_id: UnitTypeId,
    pub unit_type_name: String,
    pub units_count: usize,
    pub families_count: usize,
}

impl UnitTypeMismatch {
    /// The mismatch of `counts`, if its units and families differ.
    pub fn from_counts(counts: &UnitTypeCount) -> Option<Self> {
        (counts.units_count != counts.families_count).then(|| Self {
            unit_type_id: counts.unit_type_id,
            unit_type_name: counts.unit_type_name.clone(),
            units_count: counts.units_count,
            families_count: counts.families_count,
        })
    }

    pub fn describe(&self) -> String {
        let direction = if self.units_count > self.families_count {
            "excess units"
        } else {
            "insufficient units"
        };
        format!(
            "{} has {} units for {} families ({})",
            self.unit_type_name, self.units_count, self.families_count, direction
        )
    }
}

/// Errors raised while reserving, validating or settling a lottery execution.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Lottery {lottery_id} cannot be executed: {reason:?}")]
    CannotExecuteLottery {
        lottery_id: LotteryId,
        reason: Ineligibility,
    },

    #[error("Not enough families to execute the lottery: {count}")]
    InsufficientFamilies { count: usize },

    #[error("Execution requires the '{option}' option: {} unit types mismatch", .mismatches.len())]
    RequiresConfirmation {
        option: ExecutionOption,
        mismatches: Vec<UnitTypeMismatch>,
    },

    /// State that exclusive reservation should make impossible.
    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Audit error: {0}")]
    Audit(#[from] AuditStoreError),

    #[error("Failed to dispatch execution: {0}")]
    Dispatch(String),
}

impl ExecutionError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CannotExecuteLottery { .. } => "cannot_execute_lottery",
            Self::InsufficientFamilies { .. } => "insufficient_families",
            Self::RequiresConfirmation { .. } => "requires_confirmation",
            Self::Integrity(_) => "integrity",
            Self::Storage(_) => "storage",
            Self::Audit(_) => "audit",
            Self::Dispatch(_) => "dispatch",
        }
    }

    /// Sentence safe to show to the administrator who asked for the execution.
    pub fn user_message(&self) -> String {
        match self {
            Self::CannotExecuteLottery { reason, .. } => match reason {
                Ineligibility::AlreadyExecutedOrExecuting => {
                    "The lottery has already been executed or is currently being executed."
                }
                Ineligibility::NotYetScheduled => {
                    "The lottery cannot be executed before the scheduled date."
                }
                Ineligibility::NoDateSet => {
                    "You must schedule a start date for the lottery before executing it."
                }
                Ineligibility::NotFound => {
                    "The lottery cannot be executed. Verify that it meets the necessary conditions."
                }
            }
            .to_string(),
            Self::InsufficientFamilies { .. } => {
                "Not enough families to execute the lottery. At least 2 families are required."
                    .to_string()
            }
            Self::RequiresConfirmation { mismatches, .. } => {
                let mut message =
                    String::from("There are inconsistencies between units and families:");
                for mismatch in mismatches {
                    message.push('\n');
                    message.push_str(&mismatch.describe());
                }
                message
            }
            Self::Integrity(_) | Self::Storage(_) | Self::Audit(_) | Self::Dispatch(_) => {
                UNEXPECTED_FAILURE_MESSAGE.to_string()
            }
        }
    }
}
