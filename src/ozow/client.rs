use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use std::future::Future;
use std::time::Duration;

use super::{
    GatewayError, GatewayTransaction, GatewayTransactionBody, PaymentGateway, PaymentLink,
    PaymentLinkBody,
};

pub const DEFAULT_PAYOUTS_API_URL: &str = "https://payoutsapi.ozow.com";

#[derive(Debug, Clone)]
pub struct OzowClientConfig {
    pub api_url: String,
    pub staging_api_url: String,
    pub payouts_api_url: String,
    pub api_key: String,
    pub site_code: String,
    pub timeout: Duration,
    pub failure_threshold: u32,
    pub reset_timeout_secs: u64,
}

impl OzowClientConfig {
    pub fn new(api_url: String, staging_api_url: String, api_key: String, site_code: String) -> Self {
        Self {
            api_url,
            staging_api_url,
            payouts_api_url: DEFAULT_PAYOUTS_API_URL.to_string(),
            api_key,
            site_code,
            timeout: Duration::from_secs(10),
            failure_threshold: 3,
            reset_timeout_secs: 60,
        }
    }
}

/// HTTP client for the gateway APIs. All calls share one circuit breaker.
#[derive(Clone)]
pub struct OzowClient {
    client: Client,
    config: OzowClientConfig,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl OzowClient {
    pub fn new(config: OzowClientConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(config.reset_timeout_secs),
            Duration::from_secs(config.reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(config.failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        OzowClient {
            client,
            config,
            circuit_breaker,
        }
    }

    fn base_url(&self, is_test: bool) -> &str {
        let url = if is_test {
            &self.config.staging_api_url
        } else {
            &self.config.api_url
        };
        url.trim_end_matches('/')
    }

    /// Runs a request through the circuit breaker.
    async fn guarded<T, F>(&self, request: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        match self.circuit_breaker.call(request).await {
            Ok(value) => Ok(value),
            Err(FailsafeError::Rejected) => Err(GatewayError::CircuitBreakerOpen(
                "gateway API circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

#[async_trait]
impl PaymentGateway for OzowClient {
    async fn get_transaction(
        &self,
        gateway_transaction_id: &str,
        is_test: bool,
    ) -> Result<GatewayTransaction, GatewayError> {
        let url = format!("{}/GetTransaction", self.base_url(is_test));
        let request = self
            .client
            .get(&url)
            .query(&[
                ("siteCode", self.config.site_code.as_str()),
                ("transactionId", gateway_transaction_id),
                ("isTest", if is_test { "true" } else { "false" }),
            ])
            .header("ApiKey", &self.config.api_key)
            .header("Accept", "application/json")
            .timeout(self.config.timeout);
        let id = gateway_transaction_id.to_string();

        let result = self
            .guarded(async move {
                let response = request.send().await?;

                if !response.status().is_success() {
                    return Err(GatewayError::UnexpectedStatus(response.status().as_u16()));
                }

                let body = response.json::<GatewayTransactionBody>().await?;
                body.into_single(&id)
            })
            .await;

        match result {
            Ok(tx) => {
                tracing::debug!(
                    gateway_transaction_id = %tx.transaction_id,
                    status = %tx.status,
                    "Fetched gateway transaction"
                );
                Ok(tx)
            }
            Err(e) => {
                tracing::warn!(
                    gateway_transaction_id = %gateway_transaction_id,
                    error = %e,
                    "Gateway transaction lookup failed"
                );
                Err(e)
            }
        }
    }

    async fn create_payment_link(
        &self,
        fields: &[(&'static str, String)],
    ) -> Result<PaymentLink, GatewayError> {
        let mut body = serde_json::Map::new();
        for (name, value) in fields {
            body.insert((*name).to_string(), serde_json::Value::String(value.clone()));
        }
        body.insert("GenerateShortUrl".to_string(), serde_json::Value::Bool(true));

        let url = format!("{}/postpaymentrequest", self.base_url(false));
        let request = self
            .client
            .post(&url)
            .header("ApiKey", &self.config.api_key)
            .header("Accept", "application/json")
            .json(&body)
            .timeout(self.config.timeout);

        // A rejected request is a well-formed answer and does not count
        // against the breaker.
        let body = self
            .guarded(async move {
                let response = request.send().await?;
                if !response.status().is_success() {
                    return Err(GatewayError::UnexpectedStatus(response.status().as_u16()));
                }
                Ok(response.json::<PaymentLinkBody>().await?)
            })
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Payment link request failed");
                e
            })?;

        let link = body.into_link()?;
        tracing::info!(
            payment_request_id = ?link.payment_request_id,
            "Payment link created"
        );
        Ok(link)
    }

    async fn available_banks(&self) -> Result<serde_json::Value, GatewayError> {
        let url = format!(
            "{}/getavailablebanks",
            self.config.payouts_api_url.trim_end_matches('/')
        );
        let request = self
            .client
            .get(&url)
            .header("APIKey", &self.config.api_key)
            .header("SiteCode", &self.config.site_code)
            .header("Accept", "application/json")
            .timeout(self.config.timeout);

        self.guarded(async move {
            let response = request.send().await?;
            if !response.status().is_success() {
                return Err(GatewayError::UnexpectedStatus(response.status().as_u16()));
            }
            Ok(response.json::<serde_json::Value>().await?)
        })
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Payout bank availability lookup failed");
            e
        })
    }

    fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }
}
