//! Persistence port. Every mutation of transactions, wallets and notifications
//! goes through a `LedgerStore`.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    EarningsRate, NotificationRecord, StatusChange, Transaction, TransactionStatus,
    VerificationLog, Wallet,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Conflicting record: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid stored value: {0}")]
    InvalidData(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Result of reserving a notification slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationInsert {
    Inserted,
    /// A record with the same gateway transaction id already exists
    /// (either found up front or lost the insert race).
    Duplicate,
}

/// Result of the conditional "flip `is_processed` and credit" commit.
#[derive(Debug, Clone)]
pub enum DepositCommit {
    Applied {
        transaction: Transaction,
        wallet: Wallet,
    },
    /// The precondition `is_processed = false` no longer held; nothing was
    /// written.
    AlreadyProcessed,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn ping(&self) -> RepositoryResult<()>;

    // --- Transactions ---

    async fn insert_transaction(&self, tx: &Transaction) -> RepositoryResult<Transaction>;

    async fn get_transaction(&self, id: Uuid) -> RepositoryResult<Transaction>;

    async fn find_transaction_by_reference(
        &self,
        reference: &str,
    ) -> RepositoryResult<Option<Transaction>>;

    /// Applies a non-crediting transition. Only succeeds while the
    /// transaction is unprocessed and not terminal; returns `None` otherwise.
    async fn record_status_change(
        &self,
        id: Uuid,
        change: &StatusChange,
        at: DateTime<Utc>,
    ) -> RepositoryResult<Option<Transaction>>;

    /// Atomically marks a deposit complete and credits `to_user_id` by the
    /// principal, creating the wallet if needed. Guarded by
    /// `is_processed = false`.
    async fn complete_deposit(
        &self,
        id: Uuid,
        gateway_transaction_id: &str,
        at: DateTime<Utc>,
    ) -> RepositoryResult<DepositCommit>;

    /// Marks a transfer complete once both legs have been applied. Returns
    /// `None` if it was already processed or is terminal.
    async fn complete_transfer(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> RepositoryResult<Option<Transaction>>;

    // --- Wallets ---

    async fn get_wallet(&self, user_id: &str) -> RepositoryResult<Option<Wallet>>;

    /// Atomic increment; creates the wallet lazily.
    async fn credit_wallet(&self, user_id: &str, amount: &BigDecimal) -> RepositoryResult<Wallet>;

    /// Atomic conditional decrement. Returns `None` when the wallet is absent
    /// or the balance would go negative.
    async fn debit_wallet(
        &self,
        user_id: &str,
        amount: &BigDecimal,
    ) -> RepositoryResult<Option<Wallet>>;

    // --- Notifications ---

    /// Inserts under the uniqueness constraint on the gateway transaction id.
    async fn insert_notification(
        &self,
        record: &NotificationRecord,
    ) -> RepositoryResult<NotificationInsert>;

    async fn find_notification(
        &self,
        gateway_transaction_id: &str,
    ) -> RepositoryResult<Option<NotificationRecord>>;

    async fn mark_notification_processed(
        &self,
        gateway_transaction_id: &str,
        final_status: TransactionStatus,
        at: DateTime<Utc>,
    ) -> RepositoryResult<()>;

    /// Parks an unprocessed notification for manual review.
    async fn flag_notification_for_review(
        &self,
        gateway_transaction_id: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> RepositoryResult<()>;

    /// Oldest first; excludes notifications flagged for review.
    async fn list_unprocessed_notifications(
        &self,
        limit: i64,
    ) -> RepositoryResult<Vec<NotificationRecord>>;

    // --- Audit ---

    async fn append_verification_log(&self, entry: &VerificationLog) -> RepositoryResult<()>;

    async fn list_verification_logs(
        &self,
        transaction_reference: &str,
    ) -> RepositoryResult<Vec<VerificationLog>>;

    // --- Admin ---

    async fn get_earnings_rate(&self) -> RepositoryResult<Option<EarningsRate>>;

    async fn set_earnings_rate(&self, rate: f64, at: DateTime<Utc>) -> RepositoryResult<EarningsRate>;
}
