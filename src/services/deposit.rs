use bigdecimal::BigDecimal;
use serde::Serialize;
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

use crate::domain::Transaction;
use crate::error::AppError;
use crate::ozow::hash::{format_amount, PaymentRequest};
use crate::ozow::PaymentGateway;
use crate::ports::LedgerStore;
use crate::validation;

/// Merchant settings used to build payment requests.
#[derive(Clone)]
pub struct DepositSettings {
    pub site_code: String,
    pub country_code: String,
    pub currency_code: String,
    pub private_key: String,
    pub pay_url: String,
    pub public_base_url: String,
    pub default_bank_reference: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositInitiation {
    pub transaction_id: Uuid,
    pub transaction_reference: String,
    pub amount: String,
    pub redirect_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_request_id: Option<String>,
}

/// Creates pending deposits and the signed redirect to the payment page, or
/// a gateway-hosted short link when asked for one.
#[derive(Clone)]
pub struct DepositService {
    store: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
    settings: DepositSettings,
}

impl DepositService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        settings: DepositSettings,
    ) -> Self {
        Self {
            store,
            gateway,
            settings,
        }
    }

    pub async fn initiate(
        &self,
        user_id: &str,
        amount: BigDecimal,
        fee: BigDecimal,
        bank_reference: Option<String>,
        is_test: bool,
        generate_url: bool,
    ) -> Result<DepositInitiation, AppError> {
        validation::validate_positive_amount("amount", &amount)?;
        validation::validate_fee(&fee)?;
        let bank_reference = bank_reference
            .map(|r| validation::sanitize_string(&r))
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| self.settings.default_bank_reference.clone());
        validation::validate_bank_reference(&bank_reference)?;

        let tx = Transaction::new_deposit(
            user_id.to_string(),
            amount,
            fee,
            self.settings.currency_code.clone(),
        );
        let tx = self.store.insert_transaction(&tx).await?;

        let request = self.payment_request(&tx, bank_reference, is_test);
        let (redirect_url, payment_request_id) = if generate_url {
            let fields = request.form_fields(&self.settings.private_key);
            let link = self.gateway.create_payment_link(&fields).await.map_err(|e| {
                tracing::warn!(
                    transaction_reference = %tx.transaction_reference,
                    error = %e,
                    "Payment link not created; deposit left pending"
                );
                AppError::from(e)
            })?;
            (link.url, link.payment_request_id)
        } else {
            (self.redirect_url(&request)?, None)
        };

        tracing::info!(
            transaction_id = %tx.id,
            transaction_reference = %tx.transaction_reference,
            amount = %tx.amount,
            fee = %tx.fee,
            is_test,
            short_link = generate_url,
            "Deposit initiated"
        );

        Ok(DepositInitiation {
            transaction_id: tx.id,
            transaction_reference: tx.transaction_reference,
            amount: format_amount(&tx.total),
            redirect_url,
            payment_request_id,
        })
    }

    fn payment_request(&self, tx: &Transaction, bank_reference: String, is_test: bool) -> PaymentRequest {
        let base = self.settings.public_base_url.trim_end_matches('/');
        PaymentRequest {
            site_code: self.settings.site_code.clone(),
            country_code: self.settings.country_code.clone(),
            currency_code: self.settings.currency_code.clone(),
            amount: tx.total.clone(),
            transaction_reference: tx.transaction_reference.clone(),
            bank_reference,
            cancel_url: format!("{}/cancel", base),
            error_url: format!("{}/error", base),
            success_url: format!("{}/success", base),
            notify_url: format!("{}/webhooks/ozow/notify", base),
            is_test,
        }
    }

    fn redirect_url(&self, request: &PaymentRequest) -> Result<String, AppError> {
        let fields = request.form_fields(&self.settings.private_key);
        let url = Url::parse_with_params(&self.settings.pay_url, fields.iter().map(|(k, v)| (*k, v.as_str())))
            .map_err(|e| AppError::Internal(format!("invalid pay URL: {}", e)))?;
        Ok(url.to_string())
    }
}
