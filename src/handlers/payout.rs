use axum::{extract::State, Json};

use crate::error::AppError;
use crate::middleware::AuthenticatedUser;
use crate::AppState;

/// Banks currently accepting payouts, relayed from the gateway.
pub async fn available_banks(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let banks = state.gateway.available_banks().await?;
    tracing::debug!(user_id = %user.id, "Payout bank availability served");
    Ok(Json(banks))
}
