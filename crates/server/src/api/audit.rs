use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use lottery_core::{AuditFilter, AuditRecord, AuditType, LotteryId};

use crate::state::AppState;

/// Maximum allowed limit for audit queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for audit queries
const DEFAULT_LIMIT: i64 = 100;

/// Query parameters for the audit endpoint
#[derive(Debug, Deserialize)]
pub struct AuditQueryParams {
    /// Also return records of superseded executions
    #[serde(default)]
    pub include_superseded: bool,
    /// Filter by audit type, e.g. `GROUP_EXECUTION`
    #[serde(rename = "type")]
    pub audit_type: Option<String>,
    /// Maximum number of records to return (default 100, max 1000)
    pub limit: Option<i64>,
    /// Pagination offset (default 0)
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AuditQueryResponse {
    pub audits: Vec<AuditRecord>,
    /// Total number of matching records
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct AuditErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<AuditErrorResponse>);

fn internal(context: &str, e: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(AuditErrorResponse {
            error: format!("{}: {}", context, e),
        }),
    )
}

/// Audit trail of one lottery, oldest first.
pub async fn query_audits(
    State(state): State<Arc<AppState>>,
    Path(lottery_id): Path<LotteryId>,
    Query(params): Query<AuditQueryParams>,
) -> Result<Json<AuditQueryResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    // Shared between query and count
    let mut base_filter = AuditFilter::new().with_lottery_id(lottery_id);
    if params.include_superseded {
        base_filter = base_filter.including_superseded();
    }
    if let Some(ref raw) = params.audit_type {
        let audit_type: AuditType = raw.parse().map_err(|e: String| {
            (StatusCode::BAD_REQUEST, Json(AuditErrorResponse { error: e }))
        })?;
        base_filter = base_filter.with_audit_type(audit_type);
    }

    let query_filter = base_filter.clone().with_limit(limit).with_offset(offset);

    let store = state.audit().store();
    let audits = store
        .query(&query_filter)
        .map_err(|e| internal("Failed to query audit records", e))?;
    let total = store
        .count(&base_filter)
        .map_err(|e| internal("Failed to count audit records", e))?;

    Ok(Json(AuditQueryResponse {
        audits,
        total,
        limit,
        offset,
    }))
}
