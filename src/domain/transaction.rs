//! Transaction domain entity.
//! Framework-agnostic representation of a wallet transaction and its lifecycle.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Deposit,
    Transfer,
    Withdrawal,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Transfer => "transfer",
            TransactionType::Withdrawal => "withdrawal",
        }
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionType::Deposit),
            "transfer" => Ok(TransactionType::Transfer),
            "withdrawal" => Ok(TransactionType::Withdrawal),
            other => Err(format!("unknown transaction type '{}'", other)),
        }
    }
}

/// Local transaction status.
///
/// `Complete`, `Cancelled`, `Error` and `Abandoned` are terminal. `Pending`,
/// `Processing` and `PendingInvestigation` may still move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Complete,
    Cancelled,
    Error,
    Abandoned,
    PendingInvestigation,
}

/// Outcome family a gateway status belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFamily {
    Complete,
    Failed,
    Pending,
}

impl TransactionStatus {
    pub const TERMINAL: [TransactionStatus; 4] = [
        TransactionStatus::Complete,
        TransactionStatus::Cancelled,
        TransactionStatus::Error,
        TransactionStatus::Abandoned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Complete => "complete",
            TransactionStatus::Cancelled => "cancelled",
            TransactionStatus::Error => "error",
            TransactionStatus::Abandoned => "abandoned",
            TransactionStatus::PendingInvestigation => "pendinginvestigation",
        }
    }

    /// Maps a status string reported by the payment gateway.
    ///
    /// Matching is case-insensitive. `processing` is a local-only status and is
    /// never accepted from the gateway; anything unknown yields `None`.
    pub fn from_gateway(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "complete" => Some(TransactionStatus::Complete),
            "cancelled" => Some(TransactionStatus::Cancelled),
            "error" => Some(TransactionStatus::Error),
            "abandoned" => Some(TransactionStatus::Abandoned),
            "pending" => Some(TransactionStatus::Pending),
            "pendinginvestigation" => Some(TransactionStatus::PendingInvestigation),
            _ => None,
        }
    }

    pub fn family(&self) -> StatusFamily {
        match self {
            TransactionStatus::Complete => StatusFamily::Complete,
            TransactionStatus::Cancelled | TransactionStatus::Error | TransactionStatus::Abandoned => {
                StatusFamily::Failed
            }
            TransactionStatus::Pending
            | TransactionStatus::Processing
            | TransactionStatus::PendingInvestigation => StatusFamily::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "processing" {
            return Ok(TransactionStatus::Processing);
        }
        TransactionStatus::from_gateway(s).ok_or_else(|| format!("unknown status '{}'", s))
    }
}

/// Domain entity representing a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub transaction_reference: String,
    pub from_user_id: Option<String>,
    pub to_user_id: String,
    pub transaction_type: TransactionType,
    pub amount: BigDecimal,
    pub fee: BigDecimal,
    pub total: BigDecimal,
    pub currency: String,
    pub status: TransactionStatus,
    pub note: Option<String>,
    pub gateway_transaction_id: Option<String>,
    pub is_processed: bool,
    pub failure_reason: Option<String>,
    pub pending_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// A deposit from outside the platform into `to_user_id`'s wallet.
    pub fn new_deposit(
        to_user_id: String,
        amount: BigDecimal,
        fee: BigDecimal,
        currency: String,
    ) -> Self {
        Self::build(
            None,
            to_user_id,
            TransactionType::Deposit,
            amount,
            fee,
            currency,
            TransactionStatus::Pending,
            None,
        )
    }

    /// A peer-to-peer transfer, created in `processing`.
    pub fn new_transfer(
        from_user_id: String,
        to_user_id: String,
        amount: BigDecimal,
        fee: BigDecimal,
        currency: String,
        note: Option<String>,
    ) -> Self {
        Self::build(
            Some(from_user_id),
            to_user_id,
            TransactionType::Transfer,
            amount,
            fee,
            currency,
            TransactionStatus::Processing,
            note,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        from_user_id: Option<String>,
        to_user_id: String,
        transaction_type: TransactionType,
        amount: BigDecimal,
        fee: BigDecimal,
        currency: String,
        status: TransactionStatus,
        note: Option<String>,
    ) -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let total = &amount + &fee;
        Self {
            id,
            transaction_reference: id.simple().to_string(),
            from_user_id,
            to_user_id,
            transaction_type,
            amount,
            fee,
            total,
            currency,
            status,
            note,
            gateway_transaction_id: None,
            is_processed: false,
            failure_reason: None,
            pending_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            failed_at: None,
            processed_at: None,
        }
    }

    /// What the payer is charged: principal plus fee.
    pub fn expected_total(&self) -> BigDecimal {
        &self.amount + &self.fee
    }
}

/// A non-crediting status transition, applied only while the transaction is
/// unprocessed and not terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusChange {
    Failed {
        status: TransactionStatus,
        reason: Option<String>,
        gateway_transaction_id: Option<String>,
    },
    Pending {
        status: TransactionStatus,
        reason: Option<String>,
        gateway_transaction_id: Option<String>,
    },
}

impl StatusChange {
    pub fn status(&self) -> TransactionStatus {
        match self {
            StatusChange::Failed { status, .. } | StatusChange::Pending { status, .. } => *status,
        }
    }

    /// Applies the change to an in-memory record. Stores use this to keep
    /// field semantics identical across backends.
    pub fn apply_to(&self, tx: &mut Transaction, at: DateTime<Utc>) {
        tx.updated_at = at;
        match self {
            StatusChange::Failed {
                status,
                reason,
                gateway_transaction_id,
            } => {
                tx.status = *status;
                tx.failed_at = Some(at);
                tx.failure_reason = reason.clone();
                if gateway_transaction_id.is_some() {
                    tx.gateway_transaction_id = gateway_transaction_id.clone();
                }
            }
            StatusChange::Pending {
                status,
                reason,
                gateway_transaction_id,
            } => {
                tx.status = *status;
                tx.pending_reason = reason.clone();
                if gateway_transaction_id.is_some() {
                    tx.gateway_transaction_id = gateway_transaction_id.clone();
                }
            }
        }
    }
}
