//! Integrity hashes shared with the payment gateway.
//!
//! Both hashes are SHA-512 over a lowercased concatenation of fields followed
//! by the merchant private key. The input string is never logged.

use bigdecimal::BigDecimal;
use sha2::{Digest, Sha512};
use std::str::FromStr;

use crate::domain::{parse_flag, NotificationPayload};
use crate::utils::constant_time_eq;

/// Fixed-point amount with exactly two fraction digits, as the gateway hashes it.
pub fn format_amount(amount: &BigDecimal) -> String {
    amount.with_scale(2).to_string()
}

fn sha512_hex(input: &str) -> String {
    hex::encode(Sha512::digest(input.to_lowercase().as_bytes()))
}

/// Computes the notification hash. Returns `None` when a required field is
/// missing or malformed; optional fields and the status message hash as "".
pub fn compute_notification_hash(payload: &NotificationPayload, private_key: &str) -> Option<String> {
    fn required(value: &Option<String>) -> Option<&str> {
        value.as_deref().filter(|v| !v.trim().is_empty())
    }
    fn optional(value: &Option<String>) -> &str {
        value.as_deref().unwrap_or("")
    }

    let amount = BigDecimal::from_str(required(&payload.amount)?.trim()).ok()?;
    let is_test = parse_flag(required(&payload.is_test)?)?;

    let mut input = String::with_capacity(256);
    input.push_str(required(&payload.site_code)?);
    input.push_str(required(&payload.transaction_id)?);
    input.push_str(required(&payload.transaction_reference)?);
    input.push_str(&format_amount(&amount));
    input.push_str(required(&payload.status)?);
    for field in [
        &payload.optional1,
        &payload.optional2,
        &payload.optional3,
        &payload.optional4,
        &payload.optional5,
    ] {
        input.push_str(optional(field));
    }
    input.push_str(required(&payload.currency_code)?);
    input.push_str(if is_test { "true" } else { "false" });
    input.push_str(optional(&payload.status_message));
    input.push_str(private_key);

    Some(sha512_hex(&input))
}

/// Checks the supplied `Hash` against the computed one. Leading zeros are
/// stripped from both sides before the comparison.
pub fn verify(payload: &NotificationPayload, private_key: &str) -> bool {
    let supplied = match payload.hash.as_deref().map(str::trim) {
        Some(h) if !h.is_empty() => h,
        _ => return false,
    };
    match compute_notification_hash(payload, private_key) {
        Some(computed) => constant_time_eq(
            computed.trim_start_matches('0').as_bytes(),
            supplied.trim_start_matches('0').as_bytes(),
        ),
        None => false,
    }
}

/// Fields of an outbound payment request, in hashing order.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub site_code: String,
    pub country_code: String,
    pub currency_code: String,
    pub amount: BigDecimal,
    pub transaction_reference: String,
    pub bank_reference: String,
    pub cancel_url: String,
    pub error_url: String,
    pub success_url: String,
    pub notify_url: String,
    pub is_test: bool,
}

impl PaymentRequest {
    /// `HashCheck` value for the payment page.
    pub fn hash_check(&self, private_key: &str) -> String {
        let input = format!(
            "{}{}{}{}{}{}{}{}{}{}{}{}",
            self.site_code,
            self.country_code,
            self.currency_code,
            format_amount(&self.amount),
            self.transaction_reference,
            self.bank_reference,
            self.cancel_url,
            self.error_url,
            self.success_url,
            self.notify_url,
            self.is_test,
            private_key
        );
        sha512_hex(&input)
    }

    /// Form fields for the pay-page redirect, including `HashCheck`.
    pub fn form_fields(&self, private_key: &str) -> Vec<(&'static str, String)> {
        vec![
            ("SiteCode", self.site_code.clone()),
            ("CountryCode", self.country_code.clone()),
            ("CurrencyCode", self.currency_code.clone()),
            ("Amount", format_amount(&self.amount)),
            ("TransactionReference", self.transaction_reference.clone()),
            ("BankReference", self.bank_reference.clone()),
            ("CancelUrl", self.cancel_url.clone()),
            ("ErrorUrl", self.error_url.clone()),
            ("SuccessUrl", self.success_url.clone()),
            ("NotifyUrl", self.notify_url.clone()),
            ("IsTest", self.is_test.to_string()),
            ("HashCheck", self.hash_check(private_key)),
        ]
    }
}
