//! In-process implementation of LedgerStore.
//!
//! Every method takes the single state lock once, so each call is atomic in the
//! same way a conditional statement is atomic in Postgres. Used for local
//! development (`LEDGER_BACKEND=memory`) and tests.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::domain::{
    EarningsRate, NotificationRecord, StatusChange, Transaction, TransactionStatus,
    VerificationLog, Wallet,
};
use crate::ports::{
    DepositCommit, LedgerStore, NotificationInsert, RepositoryError, RepositoryResult,
};

#[derive(Default)]
struct State {
    transactions: HashMap<Uuid, Transaction>,
    references: HashMap<String, Uuid>,
    wallets: HashMap<String, Wallet>,
    notifications: HashMap<String, NotificationRecord>,
    notification_order: Vec<String>,
    verification_logs: Vec<VerificationLog>,
    earnings_rate: Option<EarningsRate>,
}

#[derive(Default)]
pub struct MemoryLedgerStore {
    state: Mutex<State>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> RepositoryResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("ledger state lock poisoned".to_string()))
    }

    /// Sum of all wallet balances. Handy for conservation checks.
    pub fn total_balance(&self) -> RepositoryResult<BigDecimal> {
        let state = self.state()?;
        Ok(state
            .wallets
            .values()
            .fold(BigDecimal::from(0), |acc, w| acc + &w.balance))
    }
}

fn open_for_change(tx: &Transaction) -> bool {
    !tx.is_processed && !tx.status.is_terminal()
}

fn credit(state: &mut State, user_id: &str, amount: &BigDecimal, at: DateTime<Utc>) -> Wallet {
    let wallet = state
        .wallets
        .entry(user_id.to_string())
        .or_insert_with(|| Wallet::empty(user_id));
    wallet.balance = &wallet.balance + amount;
    wallet.updated_at = at;
    wallet.clone()
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn ping(&self) -> RepositoryResult<()> {
        self.state().map(|_| ())
    }

    async fn insert_transaction(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        let mut state = self.state()?;
        if state.references.contains_key(&tx.transaction_reference) {
            return Err(RepositoryError::Conflict(format!(
                "transaction reference {} already exists",
                tx.transaction_reference
            )));
        }
        state
            .references
            .insert(tx.transaction_reference.clone(), tx.id);
        state.transactions.insert(tx.id, tx.clone());
        Ok(tx.clone())
    }

    async fn get_transaction(&self, id: Uuid) -> RepositoryResult<Transaction> {
        self.state()?
            .transactions
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn find_transaction_by_reference(
        &self,
        reference: &str,
    ) -> RepositoryResult<Option<Transaction>> {
        let state = self.state()?;
        Ok(state
            .references
            .get(reference)
            .and_then(|id| state.transactions.get(id))
            .cloned())
    }

    async fn record_status_change(
        &self,
        id: Uuid,
        change: &StatusChange,
        at: DateTime<Utc>,
    ) -> RepositoryResult<Option<Transaction>> {
        let mut state = self.state()?;
        let tx = state
            .transactions
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        if !open_for_change(tx) {
            return Ok(None);
        }
        change.apply_to(tx, at);
        Ok(Some(tx.clone()))
    }

    async fn complete_deposit(
        &self,
        id: Uuid,
        gateway_transaction_id: &str,
        at: DateTime<Utc>,
    ) -> RepositoryResult<DepositCommit> {
        let mut state = self.state()?;
        let tx = state
            .transactions
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        if !open_for_change(tx) {
            return Ok(DepositCommit::AlreadyProcessed);
        }

        tx.status = TransactionStatus::Complete;
        tx.is_processed = true;
        tx.completed_at = Some(at);
        tx.processed_at = Some(at);
        tx.updated_at = at;
        tx.gateway_transaction_id = Some(gateway_transaction_id.to_string());
        let transaction = tx.clone();

        let wallet = credit(&mut state, &transaction.to_user_id, &transaction.amount, at);
        Ok(DepositCommit::Applied { transaction, wallet })
    }

    async fn complete_transfer(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> RepositoryResult<Option<Transaction>> {
        let mut state = self.state()?;
        let tx = state
            .transactions
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        if !open_for_change(tx) {
            return Ok(None);
        }
        tx.status = TransactionStatus::Complete;
        tx.is_processed = true;
        tx.completed_at = Some(at);
        tx.processed_at = Some(at);
        tx.updated_at = at;
        Ok(Some(tx.clone()))
    }

    async fn get_wallet(&self, user_id: &str) -> RepositoryResult<Option<Wallet>> {
        Ok(self.state()?.wallets.get(user_id).cloned())
    }

    async fn credit_wallet(&self, user_id: &str, amount: &BigDecimal) -> RepositoryResult<Wallet> {
        let mut state = self.state()?;
        Ok(credit(&mut state, user_id, amount, Utc::now()))
    }

    async fn debit_wallet(
        &self,
        user_id: &str,
        amount: &BigDecimal,
    ) -> RepositoryResult<Option<Wallet>> {
        let mut state = self.state()?;
        match state.wallets.get_mut(user_id) {
            Some(wallet) if wallet.balance >= *amount => {
                wallet.balance = &wallet.balance - amount;
                wallet.updated_at = Utc::now();
                Ok(Some(wallet.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn insert_notification(
        &self,
        record: &NotificationRecord,
    ) -> RepositoryResult<NotificationInsert> {
        let mut state = self.state()?;
        if state
            .notifications
            .contains_key(&record.gateway_transaction_id)
        {
            return Ok(NotificationInsert::Duplicate);
        }
        state
            .notification_order
            .push(record.gateway_transaction_id.clone());
        state
            .notifications
            .insert(record.gateway_transaction_id.clone(), record.clone());
        Ok(NotificationInsert::Inserted)
    }

    async fn find_notification(
        &self,
        gateway_transaction_id: &str,
    ) -> RepositoryResult<Option<NotificationRecord>> {
        Ok(self
            .state()?
            .notifications
            .get(gateway_transaction_id)
            .cloned())
    }

    async fn mark_notification_processed(
        &self,
        gateway_transaction_id: &str,
        final_status: TransactionStatus,
        at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let mut state = self.state()?;
        let record = state
            .notifications
            .get_mut(gateway_transaction_id)
            .ok_or_else(|| RepositoryError::NotFound(gateway_transaction_id.to_string()))?;
        record.processed = true;
        record.processed_at = Some(at);
        record.updated_at = at;
        record.final_status = Some(final_status);
        Ok(())
    }

    async fn flag_notification_for_review(
        &self,
        gateway_transaction_id: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let mut state = self.state()?;
        let record = state
            .notifications
            .get_mut(gateway_transaction_id)
            .ok_or_else(|| RepositoryError::NotFound(gateway_transaction_id.to_string()))?;
        if !record.processed {
            record.needs_review = true;
            record.review_reason = Some(reason.to_string());
            record.updated_at = at;
        }
        Ok(())
    }

    async fn list_unprocessed_notifications(
        &self,
        limit: i64,
    ) -> RepositoryResult<Vec<NotificationRecord>> {
        let state = self.state()?;
        Ok(state
            .notification_order
            .iter()
            .filter_map(|id| state.notifications.get(id))
            .filter(|n| !n.processed && !n.needs_review)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn append_verification_log(&self, entry: &VerificationLog) -> RepositoryResult<()> {
        self.state()?.verification_logs.push(entry.clone());
        Ok(())
    }

    async fn list_verification_logs(
        &self,
        transaction_reference: &str,
    ) -> RepositoryResult<Vec<VerificationLog>> {
        Ok(self
            .state()?
            .verification_logs
            .iter()
            .filter(|l| l.transaction_reference.as_deref() == Some(transaction_reference))
            .cloned()
            .collect())
    }

    async fn get_earnings_rate(&self) -> RepositoryResult<Option<EarningsRate>> {
        Ok(self.state()?.earnings_rate.clone())
    }

    async fn set_earnings_rate(&self, rate: f64, at: DateTime<Utc>) -> RepositoryResult<EarningsRate> {
        let mut state = self.state()?;
        let value = EarningsRate {
            rate,
            updated_at: at,
        };
        state.earnings_rate = Some(value.clone());
        Ok(value)
    }
}
