pub mod admin;
pub mod deposit;
pub mod payout;
pub mod transfer;
pub mod verify;
pub mod webhook;

use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub ledger: String,
    pub gateway_circuit: String,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let ledger_status = match state.store.ping().await {
        Ok(_) => "connected",
        Err(e) => {
            tracing::warn!(error = %e, "Ledger store health check failed");
            "disconnected"
        }
    };

    let healthy = ledger_status == "connected";
    let health_response = HealthStatus {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        ledger: ledger_status.to_string(),
        gateway_circuit: state.gateway.circuit_state(),
    };

    // Return 503 if the ledger is down, 200 otherwise
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health_response))
}
