//! Deposit reconciliation.
//!
//! Drives a deposit through `received -> hash-verified -> gateway-cross-checked
//! -> applied-{complete,failed,pending}`. Every attempt, successful or not,
//! leaves one verification log entry.

use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::{
    NotificationPayload, NotificationRecord, StatusChange, StatusFamily, Transaction,
    TransactionStatus, TransactionType, VerificationLog, VerificationOutcome, VerificationSource,
};
use crate::error::AppError;
use crate::ozow::{hash, GatewayTransaction, PaymentGateway};
use crate::ports::{DepositCommit, LedgerStore};
use crate::services::idempotency::IdempotencyGuard;

pub const PROCESSED_MESSAGE: &str = "Notification processed successfully";
pub const DUPLICATE_MESSAGE: &str = "Notification already processed";

#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    Applied {
        status: TransactionStatus,
        transaction: Transaction,
    },
    Duplicate,
}

impl ReconcileOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            ReconcileOutcome::Applied { .. } => PROCESSED_MESSAGE,
            ReconcileOutcome::Duplicate => DUPLICATE_MESSAGE,
        }
    }

    fn log_outcome(&self) -> VerificationOutcome {
        match self {
            ReconcileOutcome::Applied { status, .. } => match status.family() {
                StatusFamily::Complete => VerificationOutcome::AppliedComplete,
                StatusFamily::Failed => VerificationOutcome::AppliedFailed,
                StatusFamily::Pending => VerificationOutcome::AppliedPending,
            },
            ReconcileOutcome::Duplicate => VerificationOutcome::Duplicate,
        }
    }
}

/// Verification request sent by the client after returning from the
/// payment page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientVerification {
    pub transaction_reference: String,
    pub gateway_transaction_id: String,
    #[serde(deserialize_with = "crate::ozow::decimal_from_number_or_string")]
    pub amount: BigDecimal,
    pub status: String,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub is_test: bool,
    /// Recorded for audit only; the stored notification carries the
    /// verified hash.
    #[serde(default)]
    pub hash: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetryReport {
    pub attempted: usize,
    pub applied: usize,
    pub failed: usize,
}

/// One claim about a gateway transaction, whatever channel it arrived on.
struct Claim<'a> {
    source: VerificationSource,
    gateway_transaction_id: &'a str,
    transaction_reference: &'a str,
    amount: &'a BigDecimal,
    status: &'a str,
    reason: Option<String>,
    is_test: bool,
    inputs: serde_json::Value,
}

impl<'a> Claim<'a> {
    fn from_record(record: &'a NotificationRecord, source: VerificationSource) -> Self {
        Self {
            source,
            gateway_transaction_id: &record.gateway_transaction_id,
            transaction_reference: &record.transaction_reference,
            amount: &record.amount,
            status: &record.status,
            reason: record.reason(),
            is_test: record.is_test,
            inputs: serde_json::to_value(record).unwrap_or_default(),
        }
    }

    fn log_entry(&self) -> VerificationLog {
        let mut entry = VerificationLog::new(self.source, VerificationOutcome::StoreError);
        entry.transaction_reference = Some(self.transaction_reference.to_string());
        entry.gateway_transaction_id = Some(self.gateway_transaction_id.to_string());
        entry.supplied_status = Some(self.status.to_string());
        entry.supplied_amount = Some(self.amount.clone());
        entry.inputs = self.inputs.clone();
        entry
    }
}

fn outcome_for_error(err: &AppError) -> VerificationOutcome {
    match err {
        AppError::InvalidHash => VerificationOutcome::InvalidHash,
        AppError::UnrecognizedStatus(_) => VerificationOutcome::UnrecognizedStatus,
        AppError::TransactionNotFound => VerificationOutcome::NotFound,
        AppError::AlreadyProcessed => VerificationOutcome::AlreadyProcessed,
        AppError::AmountMismatch => VerificationOutcome::AmountMismatch,
        AppError::VerificationFailed(_) => VerificationOutcome::Mismatch,
        AppError::GatewayUnavailable(_) => VerificationOutcome::GatewayUnavailable,
        _ => VerificationOutcome::StoreError,
    }
}

/// Failures a retry cannot fix. The notification is parked for manual review
/// instead of being picked up by every retry run. A missing transaction gets
/// one retry in case the deposit was not yet visible.
fn review_reason(err: &AppError, source: VerificationSource) -> Option<&'static str> {
    match (err, source) {
        (_, VerificationSource::ClientReturn) => None,
        (AppError::AmountMismatch, _) => Some("amount mismatch"),
        (AppError::UnrecognizedStatus(_), _) => Some("unrecognized status"),
        (AppError::VerificationFailed(_), _) => Some("gateway record disagrees"),
        (AppError::TransactionNotFound, VerificationSource::Retry) => Some("transaction not found"),
        _ => None,
    }
}

fn same_status(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Sole writer of deposit status transitions and deposit wallet credits.
#[derive(Clone)]
pub struct ReconciliationEngine {
    store: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
    guard: IdempotencyGuard,
    private_key: String,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn LedgerStore>, gateway: Arc<dyn PaymentGateway>, private_key: String) -> Self {
        let guard = IdempotencyGuard::new(store.clone());
        Self {
            store,
            gateway,
            guard,
            private_key,
        }
    }

    /// Handles one webhook delivery.
    pub async fn reconcile(&self, payload: &NotificationPayload) -> Result<ReconcileOutcome, AppError> {
        if !hash::verify(payload, &self.private_key) {
            warn!(
                gateway_transaction_id = ?payload.gateway_transaction_id(),
                transaction_reference = ?payload.transaction_reference(),
                "Rejected notification with invalid hash"
            );
            let mut entry = VerificationLog::new(VerificationSource::Webhook, VerificationOutcome::InvalidHash);
            entry.transaction_reference = payload.transaction_reference().map(str::to_string);
            entry.gateway_transaction_id = payload.gateway_transaction_id().map(str::to_string);
            entry.supplied_status = payload.status.clone();
            entry.supplied_amount = payload.amount.as_deref().and_then(|a| a.parse().ok());
            entry.inputs = serde_json::to_value(payload).unwrap_or_default();
            self.audit(entry).await;
            return Err(AppError::InvalidHash);
        }

        let record = NotificationRecord::from_payload(payload).map_err(|missing| {
            AppError::Validation(format!("missing or malformed fields: {}", missing.join(", ")))
        })?;

        let reservation = self.guard.check_and_reserve(&record).await?;
        if reservation.is_duplicate {
            info!(
                gateway_transaction_id = %record.gateway_transaction_id,
                transaction_reference = %record.transaction_reference,
                "Duplicate notification ignored"
            );
            let claim = Claim::from_record(&record, VerificationSource::Webhook);
            let mut entry = claim.log_entry();
            entry.outcome = VerificationOutcome::Duplicate;
            self.audit(entry).await;
            return Ok(ReconcileOutcome::Duplicate);
        }

        self.apply(Claim::from_record(&record, VerificationSource::Webhook), None)
            .await
    }

    /// Client-initiated verification on return from the payment page.
    ///
    /// Gateway API, stored notification and client input must agree on the
    /// gateway transaction id, reference and amount, and the gateway's status
    /// must equal the client's, before anything is applied.
    pub async fn verify_client_return(
        &self,
        request: &ClientVerification,
    ) -> Result<ReconcileOutcome, AppError> {
        let inputs = serde_json::to_value(request).unwrap_or_default();
        let claim = Claim {
            source: VerificationSource::ClientReturn,
            gateway_transaction_id: &request.gateway_transaction_id,
            transaction_reference: &request.transaction_reference,
            amount: &request.amount,
            status: &request.status,
            reason: request.status_message.clone(),
            is_test: request.is_test,
            inputs,
        };

        let gateway = match self
            .gateway
            .get_transaction(&request.gateway_transaction_id, request.is_test)
            .await
        {
            Ok(gateway) => gateway,
            Err(e) => {
                let mut entry = claim.log_entry();
                entry.outcome = VerificationOutcome::GatewayUnavailable;
                entry.details.push(e.to_string());
                self.audit(entry).await;
                return Err(AppError::GatewayUnavailable(e));
            }
        };

        let notification = self
            .store
            .find_notification(&request.gateway_transaction_id)
            .await?;

        let details = cross_check_client(request, &gateway, notification.as_ref());
        if !details.is_empty() {
            warn!(
                gateway_transaction_id = %request.gateway_transaction_id,
                transaction_reference = %request.transaction_reference,
                mismatches = ?details,
                "Client verification failed cross-check"
            );
            let mut entry = claim.log_entry();
            entry.gateway_status = Some(gateway.status.clone());
            entry.gateway_amount = Some(gateway.amount.clone());
            entry.outcome = VerificationOutcome::Mismatch;
            entry.details = details.clone();
            self.audit(entry).await;
            return Err(AppError::VerificationFailed(details));
        }

        self.apply(claim, Some(&gateway)).await
    }

    /// Re-drives stored notifications that never reached a final state, for
    /// example because the gateway was unreachable when they arrived.
    /// Notifications parked for review are skipped.
    pub async fn retry_unprocessed(&self, limit: i64) -> Result<RetryReport, AppError> {
        let pending = self.store.list_unprocessed_notifications(limit).await?;
        let mut report = RetryReport::default();

        for record in &pending {
            report.attempted += 1;
            match self
                .apply(Claim::from_record(record, VerificationSource::Retry), None)
                .await
            {
                Ok(_) => report.applied += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        gateway_transaction_id = %record.gateway_transaction_id,
                        error = %e,
                        "Retry of unprocessed notification failed"
                    );
                }
            }
        }

        info!(
            attempted = report.attempted,
            applied = report.applied,
            failed = report.failed,
            "Unprocessed notification retry finished"
        );
        Ok(report)
    }

    async fn apply(
        &self,
        claim: Claim<'_>,
        cross_checked: Option<&GatewayTransaction>,
    ) -> Result<ReconcileOutcome, AppError> {
        let mut entry = claim.log_entry();
        let result = self.apply_inner(&claim, cross_checked, &mut entry).await;

        match &result {
            Ok(outcome) => entry.outcome = outcome.log_outcome(),
            Err(e) => {
                entry.outcome = outcome_for_error(e);
                if entry.details.is_empty() {
                    entry.details.push(e.to_string());
                }
                if let Some(reason) = review_reason(e, claim.source) {
                    self.flag_for_review(claim.gateway_transaction_id, reason).await;
                }
            }
        }
        self.audit(entry).await;
        result
    }

    async fn apply_inner(
        &self,
        claim: &Claim<'_>,
        cross_checked: Option<&GatewayTransaction>,
        entry: &mut VerificationLog,
    ) -> Result<ReconcileOutcome, AppError> {
        let status = TransactionStatus::from_gateway(claim.status).ok_or_else(|| {
            error!(
                gateway_transaction_id = %claim.gateway_transaction_id,
                status = %claim.status,
                "Unrecognized gateway status"
            );
            AppError::UnrecognizedStatus(claim.status.to_string())
        })?;

        let transaction = match self
            .store
            .find_transaction_by_reference(claim.transaction_reference)
            .await?
        {
            Some(tx) if tx.transaction_type == TransactionType::Deposit => tx,
            _ => {
                warn!(
                    transaction_reference = %claim.transaction_reference,
                    gateway_transaction_id = %claim.gateway_transaction_id,
                    "No deposit for notification"
                );
                return Err(AppError::TransactionNotFound);
            }
        };

        if transaction.is_processed || transaction.status.is_terminal() {
            info!(
                transaction_reference = %claim.transaction_reference,
                status = %transaction.status,
                "Transaction already processed"
            );
            self.close_notification(claim.gateway_transaction_id, transaction.status)
                .await?;
            return Err(AppError::AlreadyProcessed);
        }

        let expected = transaction.expected_total();
        if *claim.amount != expected {
            warn!(
                transaction_reference = %claim.transaction_reference,
                amount = %claim.amount,
                expected = %expected,
                "Notification amount does not match transaction total"
            );
            entry.details.push(format!(
                "amount: notified={} expected={}",
                hash::format_amount(claim.amount),
                hash::format_amount(&expected)
            ));
            return Err(AppError::AmountMismatch);
        }

        let now = Utc::now();
        let applied = match status.family() {
            StatusFamily::Complete => {
                let fetched;
                let gateway = match cross_checked {
                    Some(gateway) => gateway,
                    None => {
                        fetched = self
                            .gateway
                            .get_transaction(claim.gateway_transaction_id, claim.is_test)
                            .await?;
                        &fetched
                    }
                };
                entry.gateway_status = Some(gateway.status.clone());
                entry.gateway_amount = Some(gateway.amount.clone());

                let details = cross_check_gateway(claim, gateway);
                if !details.is_empty() {
                    warn!(
                        gateway_transaction_id = %claim.gateway_transaction_id,
                        mismatches = ?details,
                        "Gateway record disagrees with notification"
                    );
                    entry.details = details.clone();
                    return Err(AppError::VerificationFailed(details));
                }

                match self
                    .store
                    .complete_deposit(transaction.id, claim.gateway_transaction_id, now)
                    .await?
                {
                    DepositCommit::Applied { transaction, wallet } => {
                        info!(
                            transaction_reference = %transaction.transaction_reference,
                            gateway_transaction_id = %claim.gateway_transaction_id,
                            amount = %transaction.amount,
                            fee = %transaction.fee,
                            balance = %wallet.balance,
                            "Deposit credited"
                        );
                        transaction
                    }
                    DepositCommit::AlreadyProcessed => return Err(AppError::AlreadyProcessed),
                }
            }
            StatusFamily::Failed | StatusFamily::Pending => {
                let gateway_transaction_id = Some(claim.gateway_transaction_id.to_string());
                let change = if status.family() == StatusFamily::Failed {
                    StatusChange::Failed {
                        status,
                        reason: claim.reason.clone(),
                        gateway_transaction_id,
                    }
                } else {
                    StatusChange::Pending {
                        status,
                        reason: claim.reason.clone(),
                        gateway_transaction_id,
                    }
                };

                match self
                    .store
                    .record_status_change(transaction.id, &change, now)
                    .await?
                {
                    Some(updated) => {
                        info!(
                            transaction_reference = %updated.transaction_reference,
                            status = %status,
                            reason = ?claim.reason,
                            "Deposit status updated"
                        );
                        updated
                    }
                    None => return Err(AppError::AlreadyProcessed),
                }
            }
        };

        self.store
            .mark_notification_processed(claim.gateway_transaction_id, status, now)
            .await?;

        Ok(ReconcileOutcome::Applied {
            status,
            transaction: applied,
        })
    }

    /// Marks a notification processed when its transaction already reached a
    /// final state, so retries stop picking it up.
    async fn close_notification(
        &self,
        gateway_transaction_id: &str,
        final_status: TransactionStatus,
    ) -> Result<(), AppError> {
        if let Some(record) = self.store.find_notification(gateway_transaction_id).await? {
            if !record.processed {
                self.store
                    .mark_notification_processed(gateway_transaction_id, final_status, Utc::now())
                    .await?;
            }
        }
        Ok(())
    }

    async fn flag_for_review(&self, gateway_transaction_id: &str, reason: &str) {
        match self
            .store
            .flag_notification_for_review(gateway_transaction_id, reason, Utc::now())
            .await
        {
            Ok(()) => warn!(
                gateway_transaction_id = %gateway_transaction_id,
                reason = %reason,
                "Notification parked for manual review"
            ),
            Err(e) => error!(
                gateway_transaction_id = %gateway_transaction_id,
                error = %e,
                "Failed to flag notification for review"
            ),
        }
    }

    async fn audit(&self, entry: VerificationLog) {
        if let Err(e) = self.store.append_verification_log(&entry).await {
            error!(
                transaction_reference = ?entry.transaction_reference,
                outcome = entry.outcome.as_str(),
                error = %e,
                "Failed to write verification log"
            );
        }
    }
}

fn cross_check_gateway(claim: &Claim<'_>, gateway: &GatewayTransaction) -> Vec<String> {
    let mut details = Vec::new();
    if gateway.transaction_id != claim.gateway_transaction_id {
        details.push(format!(
            "gatewayTransactionId: gateway={} notified={}",
            gateway.transaction_id, claim.gateway_transaction_id
        ));
    }
    if gateway.transaction_reference != claim.transaction_reference {
        details.push(format!(
            "transactionReference: gateway={} notified={}",
            gateway.transaction_reference, claim.transaction_reference
        ));
    }
    if gateway.amount != *claim.amount {
        details.push(format!(
            "amount: gateway={} notified={}",
            hash::format_amount(&gateway.amount),
            hash::format_amount(claim.amount)
        ));
    }
    if !same_status(&gateway.status, claim.status) {
        details.push(format!(
            "status: gateway={} notified={}",
            gateway.status, claim.status
        ));
    }
    details
}

fn cross_check_client(
    request: &ClientVerification,
    gateway: &GatewayTransaction,
    notification: Option<&NotificationRecord>,
) -> Vec<String> {
    let mut details = Vec::new();

    if !same_status(&gateway.status, &request.status) {
        details.push(format!(
            "status: gateway={} client={}",
            gateway.status, request.status
        ));
    }
    if gateway.transaction_id != request.gateway_transaction_id {
        details.push(format!(
            "gatewayTransactionId: gateway={} client={}",
            gateway.transaction_id, request.gateway_transaction_id
        ));
    }
    if gateway.transaction_reference != request.transaction_reference {
        details.push(format!(
            "transactionReference: gateway={} client={}",
            gateway.transaction_reference, request.transaction_reference
        ));
    }
    if gateway.amount != request.amount {
        details.push(format!(
            "amount: gateway={} client={}",
            hash::format_amount(&gateway.amount),
            hash::format_amount(&request.amount)
        ));
    }

    match notification {
        None => details.push("notification: not received".to_string()),
        Some(record) => {
            if record.transaction_reference != request.transaction_reference {
                details.push(format!(
                    "transactionReference: notification={} client={}",
                    record.transaction_reference, request.transaction_reference
                ));
            }
            if record.amount != request.amount {
                details.push(format!(
                    "amount: notification={} client={}",
                    hash::format_amount(&record.amount),
                    hash::format_amount(&request.amount)
                ));
            }
        }
    }

    details
}
