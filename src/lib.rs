pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod ozow;
pub mod ports;
pub mod services;
pub mod startup;
pub mod utils;
pub mod validation;

use axum::{
    http::{HeaderName, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::Config;
use crate::ozow::PaymentGateway;
use crate::ports::LedgerStore;
use crate::services::{
    DepositService, DepositSettings, EarningsRateService, ReconciliationEngine, TransferExecutor,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn LedgerStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub reconciliation: Arc<ReconciliationEngine>,
    pub transfers: Arc<TransferExecutor>,
    pub deposits: Arc<DepositService>,
    pub earnings: Arc<EarningsRateService>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn LedgerStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        let reconciliation = ReconciliationEngine::new(
            store.clone(),
            gateway.clone(),
            config.ozow_private_key.clone(),
        );
        let transfers = TransferExecutor::new(store.clone(), config.ozow_currency_code.clone());
        let deposits = DepositService::new(
            store.clone(),
            gateway.clone(),
            DepositSettings {
                site_code: config.ozow_site_code.clone(),
                country_code: config.ozow_country_code.clone(),
                currency_code: config.ozow_currency_code.clone(),
                private_key: config.ozow_private_key.clone(),
                pay_url: config.ozow_pay_url.clone(),
                public_base_url: config.public_base_url.clone(),
                default_bank_reference: config.ozow_bank_reference.clone(),
            },
        );
        let earnings = EarningsRateService::new(store.clone());

        Self {
            config: Arc::new(config),
            store,
            gateway,
            reconciliation: Arc::new(reconciliation),
            transfers: Arc::new(transfers),
            deposits: Arc::new(deposits),
            earnings: Arc::new(earnings),
        }
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("authorization"),
            HeaderName::from_static("x-session-user"),
            HeaderName::from_static("x-session-signature"),
            HeaderName::from_static("x-request-id"),
        ]);

    match &config.cors_allowed_origins {
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            layer.allow_origin(AllowOrigin::list(origins))
        }
        None => layer.allow_origin(Any),
    }
}

pub fn create_app(state: AppState) -> Router {
    let log_request_body = state.config.log_request_body;
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/webhooks/ozow/notify", post(handlers::webhook::ozow_notify))
        .route("/payments/verify", post(handlers::verify::verify_payment))
        .route("/transfers", post(handlers::transfer::create_transfer))
        .route("/deposits", post(handlers::deposit::create_deposit))
        .route("/payouts/banks", get(handlers::payout::available_banks))
        .nest("/admin", handlers::admin::admin_routes(state.clone()))
        .layer(axum::middleware::from_fn_with_state(
            log_request_body,
            middleware::request_logger_middleware,
        ))
        .layer(cors)
        .with_state(state)
}
