//! Peer-to-peer transfers.
//!
//! Legs are applied in a fixed order (debit sender, credit recipient, close
//! the transaction). A failure after the debit reverses whatever was applied;
//! a failed reversal leaves the transaction in `pendinginvestigation` and is
//! escalated as funds-at-risk.

use bigdecimal::{BigDecimal, Zero};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::{StatusChange, Transaction, TransactionStatus};
use crate::error::AppError;
use crate::ports::LedgerStore;

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub sender_id: String,
    pub recipient_id: String,
    pub amount: BigDecimal,
    pub fee: BigDecimal,
    pub note: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
struct AppliedLegs {
    debited: bool,
    credited: bool,
}

/// Sole writer of transfer transactions and their debit/credit pair.
#[derive(Clone)]
pub struct TransferExecutor {
    store: Arc<dyn LedgerStore>,
    currency: String,
}

impl TransferExecutor {
    pub fn new(store: Arc<dyn LedgerStore>, currency: String) -> Self {
        Self { store, currency }
    }

    pub async fn transfer(&self, request: TransferRequest) -> Result<Transaction, AppError> {
        if request.amount <= BigDecimal::zero() {
            return Err(AppError::Validation("amount must be positive".to_string()));
        }
        if request.fee < BigDecimal::zero() {
            return Err(AppError::Validation("fee must not be negative".to_string()));
        }
        if request.sender_id == request.recipient_id {
            return Err(AppError::Validation(
                "sender and recipient must differ".to_string(),
            ));
        }

        let total = &request.amount + &request.fee;
        let sufficient = self
            .store
            .get_wallet(&request.sender_id)
            .await?
            .map(|wallet| wallet.balance >= total)
            .unwrap_or(false);
        if !sufficient {
            info!(
                sender_id = %request.sender_id,
                amount = %request.amount,
                fee = %request.fee,
                "Transfer rejected: insufficient balance"
            );
            return Err(AppError::InsufficientBalance);
        }

        let tx = Transaction::new_transfer(
            request.sender_id,
            request.recipient_id,
            request.amount,
            request.fee,
            self.currency.clone(),
            request.note,
        );
        let tx = self.store.insert_transaction(&tx).await?;
        let mut legs = AppliedLegs::default();

        match self.store.debit_wallet(sender(&tx), &tx.total).await {
            Ok(Some(_)) => legs.debited = true,
            Ok(None) => {
                // Balance changed between the read and the conditional debit.
                self.mark_failed(&tx, "insufficient balance").await;
                return Err(AppError::InsufficientBalance);
            }
            Err(e) => return Err(self.compensate(&tx, legs, &e.to_string()).await),
        }

        if let Err(e) = self.store.credit_wallet(&tx.to_user_id, &tx.amount).await {
            return Err(self.compensate(&tx, legs, &e.to_string()).await);
        }
        legs.credited = true;

        match self.store.complete_transfer(tx.id, Utc::now()).await {
            Ok(Some(completed)) => {
                info!(
                    transaction_id = %completed.id,
                    sender_id = %sender(&completed),
                    recipient_id = %completed.to_user_id,
                    amount = %completed.amount,
                    fee = %completed.fee,
                    "Transfer completed"
                );
                Ok(completed)
            }
            Ok(None) => Err(self
                .compensate(&tx, legs, "transaction closed before completion")
                .await),
            Err(e) => {
                // The commit may have landed even though its acknowledgement
                // did not.
                match self.store.get_transaction(tx.id).await {
                    Ok(current) if current.status == TransactionStatus::Complete => {
                        warn!(
                            transaction_id = %current.id,
                            error = %e,
                            "Transfer completion reported an error but was committed"
                        );
                        Ok(current)
                    }
                    _ => Err(self.compensate(&tx, legs, &e.to_string()).await),
                }
            }
        }
    }

    /// Reverses applied legs, most recent first. Returns the error to surface.
    async fn compensate(&self, tx: &Transaction, legs: AppliedLegs, cause: &str) -> AppError {
        warn!(
            transaction_id = %tx.id,
            debited = legs.debited,
            credited = legs.credited,
            cause = %cause,
            "Transfer failed; reversing applied legs"
        );

        let mut unreversed = Vec::new();

        if legs.credited {
            match self.store.debit_wallet(&tx.to_user_id, &tx.amount).await {
                Ok(Some(_)) => {}
                Ok(None) => unreversed.push("recipient credit (balance already spent)".to_string()),
                Err(e) => unreversed.push(format!("recipient credit ({})", e)),
            }
        }
        if legs.debited {
            if let Err(e) = self.store.credit_wallet(sender(tx), &tx.total).await {
                unreversed.push(format!("sender debit ({})", e));
            }
        }

        if unreversed.is_empty() {
            if self.mark_failed(tx, cause).await {
                return AppError::TransferFailed(cause.to_string());
            }
            error!(
                alert = "funds_at_risk",
                transaction_id = %tx.id,
                sender_id = %sender(tx),
                recipient_id = %tx.to_user_id,
                amount = %tx.amount,
                fee = %tx.fee,
                cause = %cause,
                "Transfer legs reversed but transaction could not be marked failed"
            );
            return AppError::FundsAtRisk;
        }

        error!(
            alert = "funds_at_risk",
            transaction_id = %tx.id,
            sender_id = %sender(tx),
            recipient_id = %tx.to_user_id,
            amount = %tx.amount,
            fee = %tx.fee,
            unreversed = ?unreversed,
            cause = %cause,
            "Transfer reversal failed; manual review required"
        );
        let change = StatusChange::Pending {
            status: TransactionStatus::PendingInvestigation,
            reason: Some(format!("{}; unreversed: {}", cause, unreversed.join(", "))),
            gateway_transaction_id: None,
        };
        if let Err(e) = self
            .store
            .record_status_change(tx.id, &change, Utc::now())
            .await
        {
            error!(
                alert = "funds_at_risk",
                transaction_id = %tx.id,
                error = %e,
                "Could not flag transfer for investigation"
            );
        }
        AppError::FundsAtRisk
    }

    /// Returns whether the transaction now records the failure.
    async fn mark_failed(&self, tx: &Transaction, reason: &str) -> bool {
        let change = StatusChange::Failed {
            status: TransactionStatus::Error,
            reason: Some(reason.to_string()),
            gateway_transaction_id: None,
        };
        match self
            .store
            .record_status_change(tx.id, &change, Utc::now())
            .await
        {
            Ok(Some(_)) => true,
            Ok(None) => {
                error!(transaction_id = %tx.id, "Transfer already closed; cannot mark it failed");
                false
            }
            Err(e) => {
                error!(transaction_id = %tx.id, error = %e, "Failed to mark transfer as failed");
                false
            }
        }
    }
}

fn sender(tx: &Transaction) -> &str {
    tx.from_user_id.as_deref().unwrap_or_default()
}
