use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a verification attempt came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationSource {
    Webhook,
    ClientReturn,
    Retry,
}

impl VerificationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationSource::Webhook => "webhook",
            VerificationSource::ClientReturn => "client_return",
            VerificationSource::Retry => "retry",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationOutcome {
    AppliedComplete,
    AppliedFailed,
    AppliedPending,
    Duplicate,
    InvalidHash,
    UnrecognizedStatus,
    NotFound,
    AlreadyProcessed,
    AmountMismatch,
    Mismatch,
    GatewayUnavailable,
    StoreError,
}

impl VerificationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationOutcome::AppliedComplete => "applied_complete",
            VerificationOutcome::AppliedFailed => "applied_failed",
            VerificationOutcome::AppliedPending => "applied_pending",
            VerificationOutcome::Duplicate => "duplicate",
            VerificationOutcome::InvalidHash => "invalid_hash",
            VerificationOutcome::UnrecognizedStatus => "unrecognized_status",
            VerificationOutcome::NotFound => "not_found",
            VerificationOutcome::AlreadyProcessed => "already_processed",
            VerificationOutcome::AmountMismatch => "amount_mismatch",
            VerificationOutcome::Mismatch => "mismatch",
            VerificationOutcome::GatewayUnavailable => "gateway_unavailable",
            VerificationOutcome::StoreError => "store_error",
        }
    }
}

/// Append-only audit record of one verification attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationLog {
    pub id: Uuid,
    pub source: VerificationSource,
    pub transaction_reference: Option<String>,
    pub gateway_transaction_id: Option<String>,
    pub supplied_status: Option<String>,
    pub supplied_amount: Option<BigDecimal>,
    pub gateway_status: Option<String>,
    pub gateway_amount: Option<BigDecimal>,
    pub outcome: VerificationOutcome,
    pub details: Vec<String>,
    pub inputs: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl VerificationLog {
    pub fn new(source: VerificationSource, outcome: VerificationOutcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            transaction_reference: None,
            gateway_transaction_id: None,
            supplied_status: None,
            supplied_amount: None,
            gateway_status: None,
            gateway_amount: None,
            outcome,
            details: Vec::new(),
            inputs: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }
}
