//! Postgres implementation of LedgerStore.
//!
//! Balance changes are single-statement deltas (`balance = balance + $n`), never
//! read-modify-write. The deposit commit flips `is_processed` with a
//! conditional UPDATE and credits the wallet inside the same database
//! transaction.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{
    EarningsRate, NotificationRecord, StatusChange, Transaction, TransactionStatus,
    VerificationLog, Wallet,
};
use crate::ports::{
    DepositCommit, LedgerStore, NotificationInsert, RepositoryError, RepositoryResult,
};

const TERMINAL_GUARD: &str =
    "is_processed = FALSE AND status NOT IN ('complete', 'cancelled', 'error', 'abandoned')";
const EARNINGS_RATE_KEY: &str = "earningsRate";

/// Postgres-backed ledger store.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn ping(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_transaction(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            INSERT INTO transactions (
                id, transaction_reference, from_user_id, to_user_id, transaction_type,
                amount, fee, total, currency, status, note, gateway_transaction_id,
                is_processed, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(tx.id)
        .bind(&tx.transaction_reference)
        .bind(&tx.from_user_id)
        .bind(&tx.to_user_id)
        .bind(tx.transaction_type.as_str())
        .bind(&tx.amount)
        .bind(&tx.fee)
        .bind(&tx.total)
        .bind(&tx.currency)
        .bind(tx.status.as_str())
        .bind(&tx.note)
        .bind(&tx.gateway_transaction_id)
        .bind(tx.is_processed)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict(
                format!("transaction reference {} already exists", tx.transaction_reference),
            ),
            _ => RepositoryError::from(e),
        })?;

        row.into_domain()
    }

    async fn get_transaction(&self, id: Uuid) -> RepositoryResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>("SELECT * FROM transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or_else(|| RepositoryError::NotFound(id.to_string()))?
            .into_domain()
    }

    async fn find_transaction_by_reference(
        &self,
        reference: &str,
    ) -> RepositoryResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(
            "SELECT * FROM transactions WHERE transaction_reference = $1",
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn record_status_change(
        &self,
        id: Uuid,
        change: &StatusChange,
        at: DateTime<Utc>,
    ) -> RepositoryResult<Option<Transaction>> {
        let failed_sql = format!(
            r#"
            UPDATE transactions
            SET status = $2, failed_at = $3, failure_reason = $4,
                gateway_transaction_id = COALESCE($5, gateway_transaction_id),
                updated_at = $3
            WHERE id = $1 AND {}
            RETURNING *
            "#,
            TERMINAL_GUARD
        );
        let pending_sql = format!(
            r#"
            UPDATE transactions
            SET status = $2, pending_reason = $4,
                gateway_transaction_id = COALESCE($5, gateway_transaction_id),
                updated_at = $3
            WHERE id = $1 AND {}
            RETURNING *
            "#,
            TERMINAL_GUARD
        );

        let query = match change {
            StatusChange::Failed {
                status,
                reason,
                gateway_transaction_id,
            } => sqlx::query_as::<_, TransactionRow>(&failed_sql)
                .bind(id)
                .bind(status.as_str())
                .bind(at)
                .bind(reason)
                .bind(gateway_transaction_id),
            StatusChange::Pending {
                status,
                reason,
                gateway_transaction_id,
            } => sqlx::query_as::<_, TransactionRow>(&pending_sql)
                .bind(id)
                .bind(status.as_str())
                .bind(at)
                .bind(reason)
                .bind(gateway_transaction_id),
        };

        match query.fetch_optional(&self.pool).await? {
            Some(row) => Ok(Some(row.into_domain()?)),
            None => {
                // Distinguish "closed" from "missing".
                self.get_transaction(id).await?;
                Ok(None)
            }
        }
    }

    async fn complete_deposit(
        &self,
        id: Uuid,
        gateway_transaction_id: &str,
        at: DateTime<Utc>,
    ) -> RepositoryResult<DepositCommit> {
        let flip_sql = format!(
            r#"
            UPDATE transactions
            SET status = 'complete', is_processed = TRUE, completed_at = $2,
                processed_at = $2, updated_at = $2, gateway_transaction_id = $3
            WHERE id = $1 AND {}
            RETURNING *
            "#,
            TERMINAL_GUARD
        );
        let mut db_tx = self.pool.begin().await?;

        let flipped = sqlx::query_as::<_, TransactionRow>(&flip_sql)
            .bind(id)
            .bind(at)
            .bind(gateway_transaction_id)
            .fetch_optional(&mut *db_tx)
            .await?;

        let transaction = match flipped {
            Some(row) => row.into_domain()?,
            None => {
                db_tx.rollback().await?;
                return Ok(DepositCommit::AlreadyProcessed);
            }
        };

        let wallet = sqlx::query_as::<_, WalletRow>(CREDIT_SQL)
            .bind(&transaction.to_user_id)
            .bind(&transaction.amount)
            .bind(at)
            .fetch_one(&mut *db_tx)
            .await?;

        db_tx.commit().await?;

        Ok(DepositCommit::Applied {
            transaction,
            wallet: wallet.into_domain(),
        })
    }

    async fn complete_transfer(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> RepositoryResult<Option<Transaction>> {
        let sql = format!(
            r#"
            UPDATE transactions
            SET status = 'complete', is_processed = TRUE, completed_at = $2,
                processed_at = $2, updated_at = $2
            WHERE id = $1 AND {}
            RETURNING *
            "#,
            TERMINAL_GUARD
        );
        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(id)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn get_wallet(&self, user_id: &str) -> RepositoryResult<Option<Wallet>> {
        let row = sqlx::query_as::<_, WalletRow>("SELECT * FROM wallets WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(WalletRow::into_domain))
    }

    async fn credit_wallet(&self, user_id: &str, amount: &BigDecimal) -> RepositoryResult<Wallet> {
        let row = sqlx::query_as::<_, WalletRow>(CREDIT_SQL)
            .bind(user_id)
            .bind(amount)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await?;

        Ok(row.into_domain())
    }

    async fn debit_wallet(
        &self,
        user_id: &str,
        amount: &BigDecimal,
    ) -> RepositoryResult<Option<Wallet>> {
        let row = sqlx::query_as::<_, WalletRow>(
            r#"
            UPDATE wallets
            SET balance = balance - $2, updated_at = NOW()
            WHERE user_id = $1 AND balance >= $2
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(WalletRow::into_domain))
    }

    async fn insert_notification(
        &self,
        record: &NotificationRecord,
    ) -> RepositoryResult<NotificationInsert> {
        let result = sqlx::query(
            r#"
            INSERT INTO notifications (
                gateway_transaction_id, site_code, transaction_reference, amount, status,
                currency_code, is_test, status_message, sub_status, masked_account_number,
                bank_name, smart_indicators, optional_fields, hash, processed,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, FALSE, $15, $15)
            ON CONFLICT (gateway_transaction_id) DO NOTHING
            "#,
        )
        .bind(&record.gateway_transaction_id)
        .bind(&record.site_code)
        .bind(&record.transaction_reference)
        .bind(&record.amount)
        .bind(&record.status)
        .bind(&record.currency_code)
        .bind(record.is_test)
        .bind(&record.status_message)
        .bind(&record.sub_status)
        .bind(&record.masked_account_number)
        .bind(&record.bank_name)
        .bind(&record.smart_indicators)
        .bind(Json(&record.optional_fields))
        .bind(&record.hash)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(NotificationInsert::Duplicate)
        } else {
            Ok(NotificationInsert::Inserted)
        }
    }

    async fn find_notification(
        &self,
        gateway_transaction_id: &str,
    ) -> RepositoryResult<Option<NotificationRecord>> {
        let row = sqlx::query_as::<_, NotificationRow>(
            "SELECT * FROM notifications WHERE gateway_transaction_id = $1",
        )
        .bind(gateway_transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(NotificationRow::into_domain).transpose()
    }

    async fn mark_notification_processed(
        &self,
        gateway_transaction_id: &str,
        final_status: TransactionStatus,
        at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET processed = TRUE, processed_at = $2, updated_at = $2, final_status = $3
            WHERE gateway_transaction_id = $1
            "#,
        )
        .bind(gateway_transaction_id)
        .bind(at)
        .bind(final_status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(gateway_transaction_id.to_string()));
        }
        Ok(())
    }

    async fn flag_notification_for_review(
        &self,
        gateway_transaction_id: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET needs_review = TRUE, review_reason = $2, updated_at = $3
            WHERE gateway_transaction_id = $1 AND processed = FALSE
            "#,
        )
        .bind(gateway_transaction_id)
        .bind(reason)
        .bind(at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0
            && self.find_notification(gateway_transaction_id).await?.is_none()
        {
            return Err(RepositoryError::NotFound(gateway_transaction_id.to_string()));
        }
        Ok(())
    }

    async fn list_unprocessed_notifications(
        &self,
        limit: i64,
    ) -> RepositoryResult<Vec<NotificationRecord>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT * FROM notifications
            WHERE processed = FALSE AND needs_review = FALSE
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(NotificationRow::into_domain).collect()
    }

    async fn append_verification_log(&self, entry: &VerificationLog) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO verification_logs (
                id, source, transaction_reference, gateway_transaction_id, supplied_status,
                supplied_amount, gateway_status, gateway_amount, outcome, details, inputs,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(entry.id)
        .bind(entry.source.as_str())
        .bind(&entry.transaction_reference)
        .bind(&entry.gateway_transaction_id)
        .bind(&entry.supplied_status)
        .bind(&entry.supplied_amount)
        .bind(&entry.gateway_status)
        .bind(&entry.gateway_amount)
        .bind(entry.outcome.as_str())
        .bind(Json(&entry.details))
        .bind(&entry.inputs)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_verification_logs(
        &self,
        transaction_reference: &str,
    ) -> RepositoryResult<Vec<VerificationLog>> {
        let rows = sqlx::query_as::<_, VerificationLogRow>(
            "SELECT * FROM verification_logs WHERE transaction_reference = $1 ORDER BY created_at ASC",
        )
        .bind(transaction_reference)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(VerificationLogRow::into_domain).collect()
    }

    async fn get_earnings_rate(&self) -> RepositoryResult<Option<EarningsRate>> {
        let row = sqlx::query_as::<_, (f64, DateTime<Utc>)>(
            "SELECT rate, updated_at FROM admin_settings WHERE key = $1",
        )
        .bind(EARNINGS_RATE_KEY)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(rate, updated_at)| EarningsRate { rate, updated_at }))
    }

    async fn set_earnings_rate(&self, rate: f64, at: DateTime<Utc>) -> RepositoryResult<EarningsRate> {
        sqlx::query(
            r#"
            INSERT INTO admin_settings (key, rate, updated_at) VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE SET rate = EXCLUDED.rate, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(EARNINGS_RATE_KEY)
        .bind(rate)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(EarningsRate {
            rate,
            updated_at: at,
        })
    }
}

const CREDIT_SQL: &str = r#"
    INSERT INTO wallets (user_id, balance, created_at, updated_at)
    VALUES ($1, $2, $3, $3)
    ON CONFLICT (user_id) DO UPDATE
    SET balance = wallets.balance + EXCLUDED.balance, updated_at = EXCLUDED.updated_at
    RETURNING *
"#;

fn parse_enum<T: serde::de::DeserializeOwned>(field: &str, raw: &str) -> RepositoryResult<T> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| RepositoryError::InvalidData(format!("{} '{}'", field, raw)))
}

/// Internal row types for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    transaction_reference: String,
    from_user_id: Option<String>,
    to_user_id: String,
    transaction_type: String,
    amount: BigDecimal,
    fee: BigDecimal,
    total: BigDecimal,
    currency: String,
    status: String,
    note: Option<String>,
    gateway_transaction_id: Option<String>,
    is_processed: bool,
    failure_reason: Option<String>,
    pending_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
    processed_at: Option<DateTime<Utc>>,
}

impl TransactionRow {
    fn into_domain(self) -> RepositoryResult<Transaction> {
        Ok(Transaction {
            id: self.id,
            transaction_reference: self.transaction_reference,
            from_user_id: self.from_user_id,
            to_user_id: self.to_user_id,
            transaction_type: self
                .transaction_type
                .parse()
                .map_err(RepositoryError::InvalidData)?,
            amount: self.amount,
            fee: self.fee,
            total: self.total,
            currency: self.currency,
            status: self.status.parse().map_err(RepositoryError::InvalidData)?,
            note: self.note,
            gateway_transaction_id: self.gateway_transaction_id,
            is_processed: self.is_processed,
            failure_reason: self.failure_reason,
            pending_reason: self.pending_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
            failed_at: self.failed_at,
            processed_at: self.processed_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WalletRow {
    user_id: String,
    balance: BigDecimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WalletRow {
    fn into_domain(self) -> Wallet {
        Wallet {
            user_id: self.user_id,
            balance: self.balance,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    gateway_transaction_id: String,
    site_code: String,
    transaction_reference: String,
    amount: BigDecimal,
    status: String,
    currency_code: String,
    is_test: bool,
    status_message: Option<String>,
    sub_status: Option<String>,
    masked_account_number: Option<String>,
    bank_name: Option<String>,
    smart_indicators: Option<String>,
    optional_fields: Json<Vec<Option<String>>>,
    hash: String,
    processed: bool,
    final_status: Option<String>,
    needs_review: bool,
    review_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl NotificationRow {
    fn into_domain(self) -> RepositoryResult<NotificationRecord> {
        let final_status = self
            .final_status
            .map(|s| s.parse::<TransactionStatus>())
            .transpose()
            .map_err(RepositoryError::InvalidData)?;

        Ok(NotificationRecord {
            gateway_transaction_id: self.gateway_transaction_id,
            site_code: self.site_code,
            transaction_reference: self.transaction_reference,
            amount: self.amount,
            status: self.status,
            currency_code: self.currency_code,
            is_test: self.is_test,
            status_message: self.status_message,
            sub_status: self.sub_status,
            masked_account_number: self.masked_account_number,
            bank_name: self.bank_name,
            smart_indicators: self.smart_indicators,
            optional_fields: self.optional_fields.0,
            hash: self.hash,
            processed: self.processed,
            final_status,
            needs_review: self.needs_review,
            review_reason: self.review_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
            processed_at: self.processed_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct VerificationLogRow {
    id: Uuid,
    source: String,
    transaction_reference: Option<String>,
    gateway_transaction_id: Option<String>,
    supplied_status: Option<String>,
    supplied_amount: Option<BigDecimal>,
    gateway_status: Option<String>,
    gateway_amount: Option<BigDecimal>,
    outcome: String,
    details: Json<Vec<String>>,
    inputs: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl VerificationLogRow {
    fn into_domain(self) -> RepositoryResult<VerificationLog> {
        Ok(VerificationLog {
            id: self.id,
            source: parse_enum("source", &self.source)?,
            transaction_reference: self.transaction_reference,
            gateway_transaction_id: self.gateway_transaction_id,
            supplied_status: self.supplied_status,
            supplied_amount: self.supplied_amount,
            gateway_status: self.gateway_status,
            gateway_amount: self.gateway_amount,
            outcome: parse_enum("outcome", &self.outcome)?,
            details: self.details.0,
            inputs: self.inputs,
            created_at: self.created_at,
        })
    }
}
