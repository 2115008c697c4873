use clap::{Parser, Subcommand};
use crate::config::{mask_password, Config};

#[derive(Parser)]
#[command(name = "wallet-core")]
#[command(about = "Wallet Core - P2P wallet ledger and payment notification reconciler", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Configuration validation
    Config,

    /// Earnings rate commands
    #[command(subcommand)]
    Rates(RatesCommands),

    /// Notification reconciliation commands
    #[command(subcommand)]
    Reconcile(ReconcileCommands),
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

#[derive(Subcommand)]
pub enum RatesCommands {
    /// Draw a new earnings rate and store it
    Refresh,
}

#[derive(Subcommand)]
pub enum ReconcileCommands {
    /// Re-run reconciliation for stored notifications that never completed
    Retry {
        /// Maximum number of notifications to retry
        #[arg(short, long, default_value_t = 50)]
        limit: i64,
    },
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set to run migrations"))?;
    let pool = crate::db::create_pool(database_url).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;

    println!("✓ Database migrations completed");

    Ok(())
}

pub async fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Ledger Backend: {:?}", config.ledger_backend);
    if let Some(url) = &config.database_url {
        println!("  Database URL: {}", mask_password(url));
    }
    println!("  Gateway Site Code: {}", config.ozow_site_code);
    println!("  Gateway API URL: {}", config.ozow_api_url);
    println!("  Public Base URL: {}", config.public_base_url);

    let report = crate::startup::validate_environment(config).await?;
    report.print();

    if !report.is_valid() {
        anyhow::bail!("Configuration validation failed");
    }

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

pub async fn handle_rates_refresh(config: &Config) -> anyhow::Result<()> {
    let store = crate::startup::build_store(config).await?;
    let service = crate::services::EarningsRateService::new(store);

    let rate = service.refresh().await?;
    println!("✓ Earnings rate set to {:.2}%", rate.rate);

    Ok(())
}

pub async fn handle_reconcile_retry(config: Config, limit: i64) -> anyhow::Result<()> {
    let state = crate::startup::build_state(config).await?;

    tracing::info!(limit, "Retrying unprocessed notifications...");
    let report = state.reconciliation.retry_unprocessed(limit).await?;

    println!("✓ Retry finished:");
    println!("  Attempted: {}", report.attempted);
    println!("  Applied:   {}", report.applied);
    println!("  Failed:    {}", report.failed);

    Ok(())
}
