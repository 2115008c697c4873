use axum::{
    extract::{Path, State},
    middleware,
    routing::get,
    Json, Router,
};
use crate::domain::{EarningsRate, VerificationLog};
use crate::error::AppError;
use crate::middleware::admin_auth;
use crate::AppState;

pub fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/earnings-rate", get(get_earnings_rate).put(update_earnings_rate))
        .route("/verification-logs/:reference", get(list_verification_logs))
        .layer(middleware::from_fn_with_state(state, admin_auth))
}

pub async fn get_earnings_rate(State(state): State<AppState>) -> Result<Json<EarningsRate>, AppError> {
    Ok(Json(state.earnings.current().await?))
}

/// Forces an immediate refresh; the request carries no rate.
pub async fn update_earnings_rate(State(state): State<AppState>) -> Result<Json<EarningsRate>, AppError> {
    Ok(Json(state.earnings.refresh().await?))
}

/// Audit trail of every verification attempt for one transaction reference.
pub async fn list_verification_logs(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<Vec<VerificationLog>>, AppError> {
    Ok(Json(state.store.list_verification_logs(&reference).await?))
}
