use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use crate::error::AppError;
use crate::middleware::AuthenticatedUser;
use crate::services::{ClientVerification, ReconcileOutcome};
use crate::AppState;

/// Client-initiated verification after the user returns from the payment
/// page.
pub async fn verify_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<ClientVerification>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!(
        user_id = %user.id,
        transaction_reference = %request.transaction_reference,
        gateway_transaction_id = %request.gateway_transaction_id,
        status = %request.status,
        "Client payment verification requested"
    );

    let outcome = state.reconciliation.verify_client_return(&request).await?;

    let status = match &outcome {
        ReconcileOutcome::Applied { status, .. } => Some(status.as_str()),
        ReconcileOutcome::Duplicate => None,
    };
    Ok(Json(json!({ "success": true, "status": status })))
}
