use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lottery::{LotteryId, LotteryManifest, ProjectId};

/// Kind of step an audit record documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditType {
    Init,
    Custom,
    GroupExecution,
    ProjectExecution,
    Invalidate,
    Failure,
}

impl AuditType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditType::Init => "INIT",
            AuditType::Custom => "CUSTOM",
            AuditType::GroupExecution => "GROUP_EXECUTION",
            AuditType::ProjectExecution => "PROJECT_EXECUTION",
            AuditType::Invalidate => "INVALIDATE",
            AuditType::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for AuditType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INIT" => Ok(AuditType::Init),
            "CUSTOM" => Ok(AuditType::Custom),
            "GROUP_EXECUTION" => Ok(AuditType::GroupExecution),
            "PROJECT_EXECUTION" => Ok(AuditType::ProjectExecution),
            "INVALIDATE" => Ok(AuditType::Invalidate),
            "FAILURE" => Ok(AuditType::Failure),
            other => Err(format!("unknown audit type: {}", other)),
        }
    }
}

/// A persisted audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub execution_uuid: Uuid,
    pub project_id: ProjectId,
    pub lottery_id: LotteryId,
    #[serde(rename = "type")]
    pub audit_type: AuditType,
    pub audit: serde_json::Value,
    pub created_at: DateTime<Utc>,
    /// Set once a newer execution of the same lottery supersedes this record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl AuditRecord {
    /// A fresh, not yet persisted record.
    pub fn new(
        execution_uuid: Uuid,
        project_id: ProjectId,
        lottery_id: LotteryId,
        audit_type: AuditType,
        audit: serde_json::Value,
    ) -> Self {
        Self {
            id: 0,
            execution_uuid,
            project_id,
            lottery_id,
            audit_type,
            audit,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    pub fn for_manifest(
        manifest: &LotteryManifest,
        audit_type: AuditType,
        audit: serde_json::Value,
    ) -> Self {
        Self::new(
            manifest.uuid(),
            manifest.project_id(),
            manifest.lottery_id(),
            audit_type,
            audit,
        )
    }

    pub fn is_superseded(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Payload of a FAILURE record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureAudit {
    /// Coarse class: `infeasible`, `timeout`, `execution` or `unexpected`.
    pub error_type: String,
    /// Identity of the error value (its type or variant).
    pub exception: String,
    /// Raw error message.
    pub message: String,
    /// Message safe to show to an administrator.
    pub user_message: String,
}
