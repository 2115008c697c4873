use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ozow::GatewayError;
use crate::ports::RepositoryError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Transaction not found")]
    TransactionNotFound,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid hash")]
    InvalidHash,

    #[error("Transaction already processed")]
    AlreadyProcessed,

    #[error("Amount mismatch")]
    AmountMismatch,

    #[error("Verification failed")]
    VerificationFailed(Vec<String>),

    #[error("Unrecognized status: {0}")]
    UnrecognizedStatus(String),

    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(#[from] GatewayError),

    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    #[error("Transfer requires manual review")]
    FundsAtRisk,

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::TransactionNotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::InvalidHash
            | AppError::AmountMismatch
            | AppError::VerificationFailed(_)
            | AppError::UnrecognizedStatus(_)
            | AppError::InsufficientBalance => StatusCode::BAD_REQUEST,
            AppError::AlreadyProcessed => StatusCode::CONFLICT,
            AppError::GatewayUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::TransferFailed(_) | AppError::FundsAtRisk => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::GatewayUnavailable(_))
    }

    /// Reason sent to the caller. Storage and internal detail stays in the
    /// logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::Internal(_) => "Internal server error".to_string(),
            AppError::TransferFailed(_) => "Transfer failed".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() && !self.is_retryable() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        }
        let mut body = json!({
            "error": self.public_message(),
            "status": status.as_u16(),
        });

        if let AppError::VerificationFailed(details) = &self {
            body["details"] = json!(details);
        }
        if self.is_retryable() {
            body["retryable"] = json!(true);
        }

        (status, Json(body)).into_response()
    }
}
