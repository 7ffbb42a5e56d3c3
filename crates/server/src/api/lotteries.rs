//! Lottery execution and invalidation endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use lottery_core::{ExecutionError, ExecutionOption, LotteryId, StorageError, UnitTypeMismatch};

use crate::state::AppState;

/// Request body for starting an execution
#[derive(Debug, Default, Deserialize)]
pub struct ExecuteRequest {
    /// Confirmations given by the administrator, e.g. `"mismatch-allowed"`
    #[serde(default)]
    pub options: BTreeSet<ExecutionOption>,
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub execution_uuid: Uuid,
    pub lottery_id: LotteryId,
}

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub lottery_id: LotteryId,
    pub invalidated: bool,
}

/// Error body shared by the lottery endpoints.
#[derive(Debug, Serialize)]
pub struct LotteryErrorResponse {
    pub error: String,
    pub kind: String,
    /// Option the request must carry to proceed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_confirmation: Option<ExecutionOption>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mismatches: Vec<UnitTypeMismatch>,
}

type ApiError = (StatusCode, Json<LotteryErrorResponse>);

fn error_response(e: ExecutionError) -> ApiError {
    let status = match &e {
        ExecutionError::CannotExecuteLottery { .. } => StatusCode::CONFLICT,
        ExecutionError::InsufficientFamilies { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ExecutionError::RequiresConfirmation { .. } => StatusCode::CONFLICT,
        ExecutionError::Storage(StorageError::LotteryNotFound(_)) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let error = e.user_message();
    let kind = e.kind().to_string();
    let (requires_confirmation, mismatches) = match e {
        ExecutionError::RequiresConfirmation { option, mismatches } => (Some(option), mismatches),
        _ => (None, Vec::new()),
    };

    (
        status,
        Json(LotteryErrorResponse {
            error,
            kind,
            requires_confirmation,
            mismatches,
        }),
    )
}

/// Reserve a lottery and queue it for execution.
///
/// Returns 202 once the manifest is handed to the worker; the results land
/// asynchronously.
pub async fn execute_lottery(
    State(state): State<Arc<AppState>>,
    Path(lottery_id): Path<LotteryId>,
    body: Option<Json<ExecuteRequest>>,
) -> Result<(StatusCode, Json<ExecuteResponse>), ApiError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();

    match state.execution().execute(lottery_id, request.options).await {
        Ok(manifest) => {
            info!(
                lottery_id,
                execution_uuid = %manifest.uuid(),
                "Lottery execution accepted"
            );
            Ok((
                StatusCode::ACCEPTED,
                Json(ExecuteResponse {
                    execution_uuid: manifest.uuid(),
                    lottery_id,
                }),
            ))
        }
        Err(e) => {
            warn!(lottery_id, kind = e.kind(), "Lottery execution refused: {}", e);
            Err(error_response(e))
        }
    }
}

/// Undo an executed lottery so it can run again.
pub async fn invalidate_lottery(
    State(state): State<Arc<AppState>>,
    Path(lottery_id): Path<LotteryId>,
) -> Result<Json<InvalidateResponse>, ApiError> {
    state
        .execution()
        .invalidate(lottery_id)
        .map_err(error_response)?;

    Ok(Json(InvalidateResponse {
        lottery_id,
        invalidated: true,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lottery_core::Ineligibility;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                ExecutionError::CannotExecuteLottery {
                    lottery_id: 1,
                    reason: Ineligibility::NotYetScheduled,
                },
                StatusCode::CONFLICT,
            ),
            (
                ExecutionError::InsufficientFamilies { count: 1 },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ExecutionError::Storage(StorageError::LotteryNotFound(3)),
                StatusCode::NOT_FOUND,
            ),
            (
                ExecutionError::Dispatch("closed".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(error_response(error).0, expected);
        }
    }

    #[test]
    fn test_confirmation_body_names_option_and_mismatches() {
        let mismatch = UnitTypeMismatch {
            unit_type_id: 2,
            unit_type_name: "Type 2".to_string(),
            units_count: 3,
            families_count: 2,
        };
        let (status, Json(body)) = error_response(ExecutionError::RequiresConfirmation {
            option: ExecutionOption::MismatchAllowed,
            mismatches: vec![mismatch.clone()],
        });

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.kind, "requires_confirmation");
        assert_eq!(body.requires_confirmation, Some(ExecutionOption::MismatchAllowed));
        assert_eq!(body.mismatches, vec![mismatch]);
        assert!(body.error.contains("Type 2 has 3 units for 2 families"));
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let (_, Json(body)) =
            error_response(ExecutionError::Integrity("unit 4 assigned".to_string()));
        assert_eq!(body.kind, "integrity");
        assert!(!body.error.contains("unit 4"));
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("mismatches").is_none());
        assert!(json.get("requires_confirmation").is_none());
    }
}
