//! Payment gateway integration: integrity hashes, the transaction-status
//! query API, hosted payment links and payout bank availability.

pub mod client;
pub mod hash;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;
use thiserror::Error;

pub use client::{OzowClient, OzowClientConfig, DEFAULT_PAYOUTS_API_URL};

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("Gateway request timed out")]
    Timeout,

    #[error("Gateway returned HTTP {0}")]
    UnexpectedStatus(u16),

    #[error("Invalid response from gateway: {0}")]
    InvalidResponse(String),

    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

impl GatewayError {
    /// Gateway failures never mean the payment failed; callers retry later.
    pub fn is_retryable(&self) -> bool {
        true
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout
        } else if e.is_decode() {
            GatewayError::InvalidResponse(e.to_string())
        } else {
            GatewayError::Request(e)
        }
    }
}

/// Authoritative transaction record returned by `GetTransaction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayTransaction {
    pub transaction_id: String,
    #[serde(default)]
    pub merchant_code: Option<String>,
    #[serde(default)]
    pub site_code: Option<String>,
    pub transaction_reference: String,
    #[serde(default)]
    pub currency_code: Option<String>,
    #[serde(deserialize_with = "decimal_from_number_or_string")]
    pub amount: BigDecimal,
    pub status: String,
    #[serde(default)]
    pub sub_status: Option<String>,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub created_date: Option<String>,
    #[serde(default)]
    pub payment_date: Option<String>,
    #[serde(default)]
    pub is_test: Option<bool>,
}

/// The query API answers with either a single object or a one-element array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum GatewayTransactionBody {
    One(GatewayTransaction),
    Many(Vec<GatewayTransaction>),
}

impl GatewayTransactionBody {
    pub(crate) fn into_single(self, gateway_transaction_id: &str) -> Result<GatewayTransaction, GatewayError> {
        match self {
            GatewayTransactionBody::One(tx) => Ok(tx),
            GatewayTransactionBody::Many(list) => list
                .into_iter()
                .find(|tx| tx.transaction_id == gateway_transaction_id)
                .ok_or_else(|| {
                    GatewayError::InvalidResponse(format!(
                        "no record for transaction {}",
                        gateway_transaction_id
                    ))
                }),
        }
    }
}

/// Hosted payment link created through `postpaymentrequest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLink {
    pub payment_request_id: Option<String>,
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PaymentLinkBody {
    #[serde(default)]
    payment_request_id: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

impl PaymentLinkBody {
    pub(crate) fn into_link(self) -> Result<PaymentLink, GatewayError> {
        if let Some(message) = self.error_message.filter(|m| !m.trim().is_empty()) {
            return Err(GatewayError::InvalidResponse(format!(
                "payment request rejected: {}",
                message
            )));
        }
        match self.url.filter(|u| !u.trim().is_empty()) {
            Some(url) => Ok(PaymentLink {
                payment_request_id: self.payment_request_id,
                url,
            }),
            None => Err(GatewayError::InvalidResponse(
                "payment request returned no URL".to_string(),
            )),
        }
    }
}

/// Accepts a JSON number or a numeric string without a float round trip.
pub(crate) fn decimal_from_number_or_string<'de, D>(deserializer: D) -> Result<BigDecimal, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    let text = match raw {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s,
        other => {
            return Err(serde::de::Error::custom(format!(
                "amount must be a number or string, got {}",
                other
            )))
        }
    };
    BigDecimal::from_str(text.trim()).map_err(serde::de::Error::custom)
}

/// Outbound calls to the payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Authoritative status of one gateway transaction.
    async fn get_transaction(
        &self,
        gateway_transaction_id: &str,
        is_test: bool,
    ) -> Result<GatewayTransaction, GatewayError>;

    /// Registers a signed payment request and returns the short payment link.
    /// `fields` are the signed form fields, `HashCheck` included.
    async fn create_payment_link(
        &self,
        fields: &[(&'static str, String)],
    ) -> Result<PaymentLink, GatewayError>;

    /// Banks currently available for payouts, as reported by the gateway.
    async fn available_banks(&self) -> Result<serde_json::Value, GatewayError>;

    /// "closed" while calls are permitted, "open" otherwise.
    fn circuit_state(&self) -> String {
        "closed".to_string()
    }
}
