use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerBackend {
    Postgres,
    Memory,
}

impl FromStr for LedgerBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "postgres" => Ok(LedgerBackend::Postgres),
            "memory" => Ok(LedgerBackend::Memory),
            other => bail!("LEDGER_BACKEND must be 'postgres' or 'memory', got '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone)]
pub struct Config {
    pub server_port: u16,
    pub ledger_backend: LedgerBackend,
    pub database_url: Option<String>,
    pub ozow_site_code: String,
    pub ozow_private_key: String,
    pub ozow_api_key: String,
    pub ozow_country_code: String,
    pub ozow_currency_code: String,
    pub ozow_api_url: String,
    pub ozow_staging_api_url: String,
    pub ozow_payouts_api_url: String,
    pub ozow_pay_url: String,
    pub ozow_timeout_secs: u64,
    pub ozow_bank_reference: String,
    pub public_base_url: String,
    pub session_secret: String,
    pub admin_api_key: String,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub log_format: LogFormat,
    pub log_request_body: bool,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn required(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("{} must be set", name))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load .env file if present

        let ledger_backend: LedgerBackend = var_or("LEDGER_BACKEND", "postgres").parse()?;
        let database_url = env::var("DATABASE_URL").ok();
        if ledger_backend == LedgerBackend::Postgres && database_url.is_none() {
            bail!("DATABASE_URL must be set when LEDGER_BACKEND=postgres");
        }

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS").ok().map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        });

        let log_format = match env::var("LOG_FORMAT").ok().as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Config {
            server_port: var_or("SERVER_PORT", "3000")
                .parse()
                .context("SERVER_PORT must be a port number")?,
            ledger_backend,
            database_url,
            ozow_site_code: required("OZOW_SITE_CODE")?,
            ozow_private_key: required("OZOW_PRIVATE_KEY")?,
            ozow_api_key: required("OZOW_API_KEY")?,
            ozow_country_code: var_or("OZOW_COUNTRY_CODE", "ZA"),
            ozow_currency_code: var_or("OZOW_CURRENCY_CODE", "ZAR"),
            ozow_api_url: var_or("OZOW_API_URL", "https://api.ozow.com"),
            ozow_staging_api_url: var_or("OZOW_STAGING_API_URL", "https://stagingapi.ozow.com"),
            ozow_payouts_api_url: var_or("OZOW_PAYOUTS_API_URL", "https://payoutsapi.ozow.com"),
            ozow_pay_url: var_or("OZOW_PAY_URL", "https://pay.ozow.com"),
            ozow_timeout_secs: var_or("OZOW_TIMEOUT_SECS", "10")
                .parse()
                .context("OZOW_TIMEOUT_SECS must be a number of seconds")?,
            ozow_bank_reference: var_or("OZOW_BANK_REFERENCE", "WALLET DEPOSIT"),
            public_base_url: required("PUBLIC_BASE_URL")?,
            session_secret: required("SESSION_SECRET")?,
            admin_api_key: required("ADMIN_API_KEY")?,
            cors_allowed_origins,
            log_format,
            log_request_body: var_or("LOG_REQUEST_BODY", "false") == "true",
        })
    }

    /// Checks values that parse but cannot work at runtime.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("OZOW_SITE_CODE", &self.ozow_site_code),
            ("OZOW_PRIVATE_KEY", &self.ozow_private_key),
            ("OZOW_API_KEY", &self.ozow_api_key),
            ("SESSION_SECRET", &self.session_secret),
            ("ADMIN_API_KEY", &self.admin_api_key),
        ] {
            if value.trim().is_empty() {
                bail!("{} must not be empty", name);
            }
        }

        for (name, value) in [
            ("OZOW_API_URL", &self.ozow_api_url),
            ("OZOW_STAGING_API_URL", &self.ozow_staging_api_url),
            ("OZOW_PAYOUTS_API_URL", &self.ozow_payouts_api_url),
            ("OZOW_PAY_URL", &self.ozow_pay_url),
            ("PUBLIC_BASE_URL", &self.public_base_url),
        ] {
            Url::parse(value).with_context(|| format!("{} is not a valid URL", name))?;
        }

        if self.ozow_timeout_secs == 0 {
            bail!("OZOW_TIMEOUT_SECS must be greater than zero");
        }
        if let Some(url) = &self.database_url {
            Url::parse(url).context("DATABASE_URL is not a valid URL")?;
        }
        Ok(())
    }

    pub fn ozow_timeout(&self) -> Duration {
        Duration::from_secs(self.ozow_timeout_secs)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("server_port", &self.server_port)
            .field("ledger_backend", &self.ledger_backend)
            .field("database_url", &self.database_url.as_deref().map(mask_password))
            .field("ozow_site_code", &self.ozow_site_code)
            .field("ozow_private_key", &"****")
            .field("ozow_api_key", &"****")
            .field("ozow_api_url", &self.ozow_api_url)
            .field("ozow_staging_api_url", &self.ozow_staging_api_url)
            .field("ozow_payouts_api_url", &self.ozow_payouts_api_url)
            .field("ozow_pay_url", &self.ozow_pay_url)
            .field("public_base_url", &self.public_base_url)
            .field("session_secret", &"****")
            .field("admin_api_key", &"****")
            .field("log_format", &self.log_format)
            .finish_non_exhaustive()
    }
}

/// Hides the password in a connection URL.
pub fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user_start = slash_pos + 2;
                let user = &url[user_start..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
