#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use wallet_core::adapters::MemoryLedgerStore;
use wallet_core::config::{Config, LedgerBackend, LogFormat};
use wallet_core::domain::{
    EarningsRate, NotificationPayload, NotificationRecord, StatusChange, Transaction,
    TransactionStatus, VerificationLog, Wallet,
};
use wallet_core::middleware::auth::{sign_session, SESSION_SIGNATURE_HEADER, SESSION_USER_HEADER};
use wallet_core::ozow::{hash, GatewayError, GatewayTransaction, PaymentGateway, PaymentLink};
use wallet_core::ports::{
    DepositCommit, LedgerStore, NotificationInsert, RepositoryError, RepositoryResult,
};
use wallet_core::AppState;

pub const PRIVATE_KEY: &str = "secretkey";
pub const SITE_CODE: &str = "TSTSTE0001";
pub const SESSION_SECRET: &str = "session-secret";
pub const ADMIN_KEY: &str = "admin-key";

pub fn test_config() -> Config {
    Config {
        server_port: 0,
        ledger_backend: LedgerBackend::Memory,
        database_url: None,
        ozow_site_code: SITE_CODE.to_string(),
        ozow_private_key: PRIVATE_KEY.to_string(),
        ozow_api_key: "api-key".to_string(),
        ozow_country_code: "ZA".to_string(),
        ozow_currency_code: "ZAR".to_string(),
        ozow_api_url: "https://api.ozow.test".to_string(),
        ozow_staging_api_url: "https://stagingapi.ozow.test".to_string(),
        ozow_payouts_api_url: "https://payoutsapi.ozow.test".to_string(),
        ozow_pay_url: "https://pay.ozow.test".to_string(),
        ozow_timeout_secs: 5,
        ozow_bank_reference: "WALLET".to_string(),
        public_base_url: "https://wallet.test".to_string(),
        session_secret: SESSION_SECRET.to_string(),
        admin_api_key: ADMIN_KEY.to_string(),
        cors_allowed_origins: None,
        log_format: LogFormat::Text,
        log_request_body: false,
    }
}

pub fn dec(raw: &str) -> BigDecimal {
    raw.parse().unwrap()
}

/// Gateway double. Answers from a fixed table, or fails every call while
/// `unavailable` is set.
#[derive(Default)]
pub struct StubGateway {
    transactions: Mutex<HashMap<String, GatewayTransaction>>,
    unavailable: AtomicBool,
    pub calls: AtomicUsize,
    /// Signed fields of every payment-link request.
    pub link_requests: Mutex<Vec<Vec<(&'static str, String)>>>,
}

impl StubGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tx: GatewayTransaction) {
        self.transactions
            .lock()
            .unwrap()
            .insert(tx.transaction_id.clone(), tx);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn get_transaction(
        &self,
        transaction_id: &str,
        _is_test: bool,
    ) -> Result<GatewayTransaction, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GatewayError::Timeout);
        }
        self.transactions
            .lock()
            .unwrap()
            .get(transaction_id)
            .cloned()
            .ok_or(GatewayError::UnexpectedStatus(404))
    }

    async fn create_payment_link(
        &self,
        fields: &[(&'static str, String)],
    ) -> Result<PaymentLink, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GatewayError::Timeout);
        }
        self.link_requests.lock().unwrap().push(fields.to_vec());
        Ok(PaymentLink {
            payment_request_id: Some("pr-1".to_string()),
            url: "https://pay.ozow.test/s/short".to_string(),
        })
    }

    async fn available_banks(&self) -> Result<serde_json::Value, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GatewayError::Timeout);
        }
        Ok(serde_json::json!([
            { "bankGroupName": "Example Bank", "isAvailable": true }
        ]))
    }
}

pub fn gateway_tx(id: &str, reference: &str, amount: &str, status: &str) -> GatewayTransaction {
    GatewayTransaction {
        transaction_id: id.to_string(),
        merchant_code: None,
        site_code: Some(SITE_CODE.to_string()),
        transaction_reference: reference.to_string(),
        currency_code: Some("ZAR".to_string()),
        amount: dec(amount),
        status: status.to_string(),
        sub_status: None,
        status_message: None,
        created_date: None,
        payment_date: None,
        is_test: Some(true),
    }
}

/// Notification signed with [`PRIVATE_KEY`].
pub fn signed_notification(
    gateway_id: &str,
    reference: &str,
    amount: &str,
    status: &str,
) -> NotificationPayload {
    let mut payload = NotificationPayload {
        site_code: Some(SITE_CODE.to_string()),
        transaction_id: Some(gateway_id.to_string()),
        transaction_reference: Some(reference.to_string()),
        amount: Some(amount.to_string()),
        status: Some(status.to_string()),
        currency_code: Some("ZAR".to_string()),
        is_test: Some("true".to_string()),
        ..Default::default()
    };
    payload.hash = hash::compute_notification_hash(&payload, PRIVATE_KEY);
    payload
}

/// Form body exactly as the gateway posts it.
pub fn form_body(payload: &NotificationPayload) -> String {
    let value = serde_json::to_value(payload).unwrap();
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    if let serde_json::Value::Object(fields) = value {
        for (key, value) in fields {
            if let serde_json::Value::String(s) = value {
                serializer.append_pair(&key, &s);
            }
        }
    }
    serializer.finish()
}

pub async fn seed_deposit(
    store: &dyn LedgerStore,
    user_id: &str,
    amount: &str,
    fee: &str,
) -> Transaction {
    let tx = Transaction::new_deposit(user_id.to_string(), dec(amount), dec(fee), "ZAR".to_string());
    store.insert_transaction(&tx).await.unwrap()
}

pub async fn balance(store: &dyn LedgerStore, user_id: &str) -> BigDecimal {
    store
        .get_wallet(user_id)
        .await
        .unwrap()
        .map(|w| w.balance)
        .unwrap_or_else(|| BigDecimal::from(0))
}

/// `(X-Session-User, X-Session-Signature)` for `user_id`.
pub fn session_headers(user_id: &str) -> [(&'static str, String); 2] {
    let value = format!("{}:{}@example.test", user_id, user_id);
    let signature = sign_session(SESSION_SECRET, &value);
    [(SESSION_USER_HEADER, value), (SESSION_SIGNATURE_HEADER, signature)]
}

pub fn app_state(store: Arc<dyn LedgerStore>, gateway: Arc<dyn PaymentGateway>) -> AppState {
    AppState::new(test_config(), store, gateway)
}

/// Memory store with switchable failures on individual operations.
#[derive(Default)]
pub struct FaultyStore {
    pub inner: MemoryLedgerStore,
    fail_credit_for: Mutex<Option<String>>,
    fail_complete_transfer: AtomicBool,
    lose_complete_transfer_ack: AtomicBool,
    fail_get_transaction: AtomicBool,
    fail_verification_log: AtomicBool,
    last_inserted: Mutex<Option<Uuid>>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_credit_for(&self, user_id: &str) {
        *self.fail_credit_for.lock().unwrap() = Some(user_id.to_string());
    }

    pub fn fail_complete_transfer(&self) {
        self.fail_complete_transfer.store(true, Ordering::SeqCst);
    }

    /// `complete_transfer` commits, then reports a connection error.
    pub fn lose_complete_transfer_ack(&self) {
        self.lose_complete_transfer_ack.store(true, Ordering::SeqCst);
    }

    pub fn fail_get_transaction(&self) {
        self.fail_get_transaction.store(true, Ordering::SeqCst);
    }

    pub fn fail_verification_log(&self) {
        self.fail_verification_log.store(true, Ordering::SeqCst);
    }

    pub fn last_inserted(&self) -> Option<Uuid> {
        *self.last_inserted.lock().unwrap()
    }

    fn injected(what: &str) -> RepositoryError {
        RepositoryError::Unavailable(format!("injected failure: {}", what))
    }
}

#[async_trait]
impl LedgerStore for FaultyStore {
    async fn ping(&self) -> RepositoryResult<()> {
        self.inner.ping().await
    }

    async fn insert_transaction(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        let inserted = self.inner.insert_transaction(tx).await?;
        *self.last_inserted.lock().unwrap() = Some(inserted.id);
        Ok(inserted)
    }

    async fn get_transaction(&self, id: Uuid) -> RepositoryResult<Transaction> {
        if self.fail_get_transaction.load(Ordering::SeqCst) {
            return Err(Self::injected("get_transaction"));
        }
        self.inner.get_transaction(id).await
    }

    async fn find_transaction_by_reference(
        &self,
        reference: &str,
    ) -> RepositoryResult<Option<Transaction>> {
        self.inner.find_transaction_by_reference(reference).await
    }

    async fn record_status_change(
        &self,
        id: Uuid,
        change: &StatusChange,
        at: DateTime<Utc>,
    ) -> RepositoryResult<Option<Transaction>> {
        self.inner.record_status_change(id, change, at).await
    }

    async fn complete_deposit(
        &self,
        id: Uuid,
        gateway_transaction_id: &str,
        at: DateTime<Utc>,
    ) -> RepositoryResult<DepositCommit> {
        self.inner.complete_deposit(id, gateway_transaction_id, at).await
    }

    async fn complete_transfer(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> RepositoryResult<Option<Transaction>> {
        if self.fail_complete_transfer.load(Ordering::SeqCst) {
            return Err(Self::injected("complete_transfer"));
        }
        let committed = self.inner.complete_transfer(id, at).await?;
        if self.lose_complete_transfer_ack.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable(
                "connection reset after commit".to_string(),
            ));
        }
        Ok(committed)
    }

    async fn get_wallet(&self, user_id: &str) -> RepositoryResult<Option<Wallet>> {
        self.inner.get_wallet(user_id).await
    }

    async fn credit_wallet(&self, user_id: &str, amount: &BigDecimal) -> RepositoryResult<Wallet> {
        if self.fail_credit_for.lock().unwrap().as_deref() == Some(user_id) {
            return Err(Self::injected("credit_wallet"));
        }
        self.inner.credit_wallet(user_id, amount).await
    }

    async fn debit_wallet(
        &self,
        user_id: &str,
        amount: &BigDecimal,
    ) -> RepositoryResult<Option<Wallet>> {
        self.inner.debit_wallet(user_id, amount).await
    }

    async fn insert_notification(
        &self,
        record: &NotificationRecord,
    ) -> RepositoryResult<NotificationInsert> {
        self.inner.insert_notification(record).await
    }

    async fn find_notification(
        &self,
        gateway_transaction_id: &str,
    ) -> RepositoryResult<Option<NotificationRecord>> {
        self.inner.find_notification(gateway_transaction_id).await
    }

    async fn mark_notification_processed(
        &self,
        gateway_transaction_id: &str,
        final_status: TransactionStatus,
        at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        self.inner
            .mark_notification_processed(gateway_transaction_id, final_status, at)
            .await
    }

    async fn flag_notification_for_review(
        &self,
        gateway_transaction_id: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        self.inner
            .flag_notification_for_review(gateway_transaction_id, reason, at)
            .await
    }

    async fn list_unprocessed_notifications(
        &self,
        limit: i64,
    ) -> RepositoryResult<Vec<NotificationRecord>> {
        self.inner.list_unprocessed_notifications(limit).await
    }

    async fn append_verification_log(&self, entry: &VerificationLog) -> RepositoryResult<()> {
        if self.fail_verification_log.load(Ordering::SeqCst) {
            return Err(Self::injected("append_verification_log"));
        }
        self.inner.append_verification_log(entry).await
    }

    async fn list_verification_logs(
        &self,
        transaction_reference: &str,
    ) -> RepositoryResult<Vec<VerificationLog>> {
        self.inner.list_verification_logs(transaction_reference).await
    }

    async fn get_earnings_rate(&self) -> RepositoryResult<Option<EarningsRate>> {
        self.inner.get_earnings_rate().await
    }

    async fn set_earnings_rate(&self, rate: f64, at: DateTime<Utc>) -> RepositoryResult<EarningsRate> {
        self.inner.set_earnings_rate(rate, at).await
    }
}
