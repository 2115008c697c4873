//! Payment gateway notifications: the raw delivery as posted by the gateway and
//! the record kept for audit and de-duplication.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::TransactionStatus;

/// Raw notification as the gateway posts it (form-encoded, PascalCase keys).
///
/// Every field is optional at the wire level so that a missing required field
/// surfaces as an integrity failure instead of a body-parsing rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NotificationPayload {
    pub site_code: Option<String>,
    pub transaction_id: Option<String>,
    pub transaction_reference: Option<String>,
    pub amount: Option<String>,
    pub status: Option<String>,
    pub optional1: Option<String>,
    pub optional2: Option<String>,
    pub optional3: Option<String>,
    pub optional4: Option<String>,
    pub optional5: Option<String>,
    pub currency_code: Option<String>,
    pub is_test: Option<String>,
    pub status_message: Option<String>,
    pub hash: Option<String>,
    pub sub_status: Option<String>,
    pub masked_account_number: Option<String>,
    pub bank_name: Option<String>,
    pub smart_indicators: Option<String>,
}

impl NotificationPayload {
    pub fn gateway_transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    pub fn transaction_reference(&self) -> Option<&str> {
        self.transaction_reference.as_deref()
    }

    /// Status message, falling back to the sub-status.
    pub fn reason(&self) -> Option<String> {
        non_empty(&self.status_message).or_else(|| non_empty(&self.sub_status))
    }
}

/// Parses the gateway's boolean representation (`true`/`True`/`false`...).
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Stored notification. At most one exists per `gateway_transaction_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub gateway_transaction_id: String,
    pub site_code: String,
    pub transaction_reference: String,
    pub amount: BigDecimal,
    pub status: String,
    pub currency_code: String,
    pub is_test: bool,
    pub status_message: Option<String>,
    pub sub_status: Option<String>,
    pub masked_account_number: Option<String>,
    pub bank_name: Option<String>,
    pub smart_indicators: Option<String>,
    pub optional_fields: Vec<Option<String>>,
    pub hash: String,
    pub processed: bool,
    pub final_status: Option<TransactionStatus>,
    /// Set when the notification failed for a reason a retry cannot fix.
    /// Flagged records are left for manual review and skipped by retries.
    pub needs_review: bool,
    pub review_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl NotificationRecord {
    /// Builds an unprocessed record from a payload. Returns the names of the
    /// required fields that are missing or malformed.
    pub fn from_payload(payload: &NotificationPayload) -> Result<Self, Vec<&'static str>> {
        let mut missing = Vec::new();

        let mut required = |name: &'static str, value: &Option<String>| -> String {
            match value.as_deref().map(str::trim) {
                Some(v) if !v.is_empty() => v.to_string(),
                _ => {
                    missing.push(name);
                    String::new()
                }
            }
        };

        let gateway_transaction_id = required("TransactionId", &payload.transaction_id);
        let site_code = required("SiteCode", &payload.site_code);
        let transaction_reference = required("TransactionReference", &payload.transaction_reference);
        let amount_raw = required("Amount", &payload.amount);
        let status = required("Status", &payload.status);
        let currency_code = required("CurrencyCode", &payload.currency_code);
        let is_test_raw = required("IsTest", &payload.is_test);
        let hash = required("Hash", &payload.hash);

        let amount = BigDecimal::from_str(&amount_raw).ok();
        if amount.is_none() && !missing.contains(&"Amount") {
            missing.push("Amount");
        }
        let is_test = parse_flag(&is_test_raw);
        if is_test.is_none() && !missing.contains(&"IsTest") {
            missing.push("IsTest");
        }

        match (amount, is_test) {
            (Some(amount), Some(is_test)) if missing.is_empty() => {
                let now = Utc::now();
                Ok(Self {
                    gateway_transaction_id,
                    site_code,
                    transaction_reference,
                    amount,
                    status,
                    currency_code,
                    is_test,
                    status_message: payload.status_message.clone(),
                    sub_status: payload.sub_status.clone(),
                    masked_account_number: payload.masked_account_number.clone(),
                    bank_name: payload.bank_name.clone(),
                    smart_indicators: payload.smart_indicators.clone(),
                    optional_fields: vec![
                        payload.optional1.clone(),
                        payload.optional2.clone(),
                        payload.optional3.clone(),
                        payload.optional4.clone(),
                        payload.optional5.clone(),
                    ],
                    hash,
                    processed: false,
                    final_status: None,
                    needs_review: false,
                    review_reason: None,
                    created_at: now,
                    updated_at: now,
                    processed_at: None,
                })
            }
            _ => Err(missing),
        }
    }

    /// Status message, falling back to the sub-status.
    pub fn reason(&self) -> Option<String> {
        non_empty(&self.status_message).or_else(|| non_empty(&self.sub_status))
    }
}
