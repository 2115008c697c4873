use crate::adapters::{MemoryLedgerStore, PostgresLedgerStore};
use crate::config::{Config, LedgerBackend};
use crate::ozow::{OzowClient, OzowClientConfig, PaymentGateway};
use crate::ports::LedgerStore;
use crate::AppState;
use anyhow::{Context, Result};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

pub struct ValidationReport {
    pub environment: bool,
    pub ledger: bool,
    pub gateway: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.ledger && self.gateway
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Ledger Connectivity:   {}", status(self.ledger));
        println!("Gateway Connectivity:  {}", status(self.gateway));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "✅ OK" } else { "❌ FAIL" }
}

pub async fn validate_environment(config: &Config) -> Result<ValidationReport> {
    let mut report = ValidationReport {
        environment: true,
        ledger: true,
        gateway: true,
        errors: Vec::new(),
    };

    if let Err(e) = config.validate() {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    if let Err(e) = validate_ledger(config).await {
        report.ledger = false;
        report.errors.push(format!("Ledger: {}", e));
    }

    if let Err(e) = validate_gateway(&config.ozow_api_url).await {
        report.gateway = false;
        report.errors.push(format!("Gateway: {}", e));
    }

    Ok(report)
}

async fn validate_ledger(config: &Config) -> Result<()> {
    if config.ledger_backend == LedgerBackend::Memory {
        return Ok(());
    }
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL is not set")?;

    let pool = crate::db::create_pool(database_url)
        .await
        .context("Failed to connect to database")?;
    validate_database(&pool).await
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}

/// Any HTTP answer counts as reachable; the API root has no success route.
async fn validate_gateway(api_url: &str) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let response = client
        .get(api_url)
        .send()
        .await
        .context("Failed to connect to payment gateway")?;

    if response.status().is_server_error() {
        anyhow::bail!("Payment gateway returned status: {}", response.status());
    }

    Ok(())
}

pub async fn build_store(config: &Config) -> Result<Arc<dyn LedgerStore>> {
    match config.ledger_backend {
        LedgerBackend::Memory => {
            tracing::warn!("Using in-memory ledger store; balances are lost on restart");
            Ok(Arc::new(MemoryLedgerStore::new()))
        }
        LedgerBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set when LEDGER_BACKEND=postgres")?;
            let pool = crate::db::create_pool(database_url).await?;
            crate::db::run_migrations(&pool).await?;
            Ok(Arc::new(PostgresLedgerStore::new(pool)))
        }
    }
}

pub fn build_gateway(config: &Config) -> Arc<dyn PaymentGateway> {
    let mut gateway_config = OzowClientConfig::new(
        config.ozow_api_url.clone(),
        config.ozow_staging_api_url.clone(),
        config.ozow_api_key.clone(),
        config.ozow_site_code.clone(),
    );
    gateway_config.payouts_api_url = config.ozow_payouts_api_url.clone();
    gateway_config.timeout = config.ozow_timeout();
    tracing::info!(api_url = %config.ozow_api_url, "Payment gateway client initialized");
    Arc::new(OzowClient::new(gateway_config))
}

pub async fn build_state(config: Config) -> Result<AppState> {
    let store = build_store(&config).await?;
    let gateway = build_gateway(&config);
    Ok(AppState::new(config, store, gateway))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_requires_every_check() {
        let mut report = ValidationReport {
            environment: true,
            ledger: true,
            gateway: true,
            errors: Vec::new(),
        };
        assert!(report.is_valid());

        report.gateway = false;
        assert!(!report.is_valid());
    }

    #[tokio::test]
    async fn test_gateway_check_accepts_not_found_root() {
        let mut server = mockito::Server::new_async().await;
        let _m = server.mock("GET", "/").with_status(404).create_async().await;

        assert!(validate_gateway(&server.url()).await.is_ok());
    }

    #[tokio::test]
    async fn test_gateway_check_rejects_server_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server.mock("GET", "/").with_status(503).create_async().await;

        assert!(validate_gateway(&server.url()).await.is_err());
    }
}
