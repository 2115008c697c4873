use clap::Parser;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use wallet_core::cli::{Cli, Commands, DbCommands, RatesCommands, ReconcileCommands};
use wallet_core::config::{Config, LogFormat};
use wallet_core::{cli, create_app, startup};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Config => cli::handle_config_validate(&config).await,
        Commands::Rates(RatesCommands::Refresh) => cli::handle_rates_refresh(&config).await,
        Commands::Reconcile(ReconcileCommands::Retry { limit }) => {
            cli::handle_reconcile_retry(config, limit).await
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    config.validate()?;
    tracing::info!(config = ?config, "Starting wallet core");

    let port = config.server_port;
    let state = startup::build_state(config).await?;
    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
