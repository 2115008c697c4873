use axum::{extract::State, http::StatusCode, response::IntoResponse, Form, Json};
use serde_json::json;

use crate::domain::NotificationPayload;
use crate::error::AppError;
use crate::AppState;

/// Payment gateway notification receiver.
///
/// Reconciliation runs in its own task so that a dropped connection does not
/// abort it halfway. Duplicate deliveries and already-closed transactions
/// answer 200 so the gateway stops retrying.
pub async fn ozow_notify(
    State(state): State<AppState>,
    Form(payload): Form<NotificationPayload>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!(
        gateway_transaction_id = ?payload.gateway_transaction_id(),
        transaction_reference = ?payload.transaction_reference(),
        status = ?payload.status,
        "Payment notification received"
    );

    let engine = state.reconciliation.clone();
    let result = tokio::spawn(async move { engine.reconcile(&payload).await })
        .await
        .map_err(|e| AppError::Internal(format!("reconciliation task failed: {}", e)))?;

    match result {
        Ok(outcome) => Ok((
            StatusCode::OK,
            Json(json!({ "success": true, "message": outcome.message() })),
        )),
        Err(AppError::AlreadyProcessed) => Ok((
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": AppError::AlreadyProcessed.to_string(),
            })),
        )),
        Err(e) => Err(e),
    }
}
