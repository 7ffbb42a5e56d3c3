use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lottery::{FamilyId, LotteryId, LotterySpec, ProjectId, UnitId, UnitTypeId};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Lottery not found: {0}")]
    LotteryNotFound(LotteryId),

    #[error("Lottery {0} is not reserved for execution")]
    NotReserved(LotteryId),

    #[error("Unit {unit_id} cannot be assigned: it is missing or already taken")]
    UnitUnavailable { unit_id: UnitId },

    #[error("Database error: {0}")]
    Database(String),
}

/// A lottery event as the store sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lottery {
    pub id: LotteryId,
    pub project_id: ProjectId,
    pub is_published: bool,
    pub start_date: Option<DateTime<Utc>>,
    /// Set when the lottery has been executed.
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Why a lottery cannot be reserved for execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ineligibility {
    NotFound,
    NoDateSet,
    NotYetScheduled,
    AlreadyExecutedOrExecuting,
}

impl Lottery {
    pub fn is_executed(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether a reservation attempt at `now` would succeed.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.ineligibility(now).is_none()
    }

    /// The first rule that blocks reservation at `now`, if any.
    pub fn ineligibility(&self, now: DateTime<Utc>) -> Option<Ineligibility> {
        if self.is_executed() || !self.is_published {
            return Some(Ineligibility::AlreadyExecutedOrExecuting);
        }
        match self.start_date {
            None => Some(Ineligibility::NoDateSet),
            Some(start) if start > now => Some(Ineligibility::NotYetScheduled),
            Some(_) => None,
        }
    }
}

/// Units and families of one unit type, with their counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitTypeCount {
    pub unit_type_id: UnitTypeId,
    pub unit_type_name: String,
    pub units_count: usize,
    pub families_count: usize,
}

/// Persistence of lotteries, units, families and preferences.
pub trait LotteryStore: Send + Sync {
    fn lottery(&self, lottery_id: LotteryId) -> Result<Option<Lottery>, StorageError>;

    /// Atomically unpublish the lottery if it is published, not executed and
    /// scheduled at or before `now`. Returns whether this call won the reservation.
    fn reserve_for_execution(
        &self,
        lottery_id: LotteryId,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    /// Why a reservation attempt at `now` fails, `None` when it would succeed.
    fn diagnose(
        &self,
        lottery_id: LotteryId,
        now: DateTime<Utc>,
    ) -> Result<Option<Ineligibility>, StorageError> {
        Ok(match self.lottery(lottery_id)? {
            Some(lottery) => lottery.ineligibility(now),
            None => Some(Ineligibility::NotFound),
        })
    }

    /// Publish the lottery again without touching assignments.
    fn republish(&self, lottery_id: LotteryId) -> Result<(), StorageError>;

    fn family_count(&self, project_id: ProjectId) -> Result<usize, StorageError>;

    fn has_assigned_units(&self, project_id: ProjectId) -> Result<bool, StorageError>;

    fn unit_type_counts(&self, project_id: ProjectId) -> Result<Vec<UnitTypeCount>, StorageError>;

    /// One spec per unit type. Each family's list holds its ranked preferences
    /// followed by every other unit of its type, ordered by id.
    fn project_groups(
        &self,
        project_id: ProjectId,
    ) -> Result<BTreeMap<UnitTypeId, LotterySpec>, StorageError>;

    /// Assign units to families and mark the lottery executed, in one transaction.
    /// Fails with `NotReserved` unless the lottery is currently reserved
    /// (unpublished and not executed), so a run that lost its reservation
    /// to an invalidation never lands.
    fn apply_picks(
        &self,
        lottery_id: LotteryId,
        picks: &BTreeMap<FamilyId, UnitId>,
    ) -> Result<(), StorageError>;

    /// Restore and republish the lottery and clear every assignment of its
    /// project, in one transaction.
    fn invalidate(&self, lottery_id: LotteryId) -> Result<(), StorageError>;

    /// Current unit to family assignments of a project.
    fn assignments(&self, project_id: ProjectId) -> Result<BTreeMap<UnitId, FamilyId>, StorageError>;
}
