use std::{env, net::SocketAddr, time::Duration};

use anyhow::{Context, bail};
use dotenv::dotenv;
use tracing::info;

const DEFAULT_DATABASE_URL: &str = "sqlite:todo.db?mode=rwc";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_STORE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

impl StoreBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreBackend::Sqlite => "sqlite",
            StoreBackend::Memory => "memory",
        }
    }
}

/// Process-wide settings, loaded once at startup and handed to whoever needs them.
#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub store_backend: StoreBackend,
    pub store_timeout: Duration,
    pub bcrypt_cost: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file
        dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .context("BIND_ADDR must be a socket address")?;

        let access_token_secret =
            env::var("ACCESS_TOKEN_SECRET").context("ACCESS_TOKEN_SECRET must be set")?;
        let refresh_token_secret =
            env::var("REFRESH_TOKEN_SECRET").context("REFRESH_TOKEN_SECRET must be set")?;

        let store_backend = match env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "sqlite".to_string())
            .to_lowercase()
            .as_str()
        {
            "sqlite" => StoreBackend::Sqlite,
            "memory" => StoreBackend::Memory,
            other => bail!("Invalid STORE_BACKEND: '{}'. Valid options are 'sqlite', 'memory'", other),
        };

        let store_timeout = match env::var("STORE_TIMEOUT_SECS") {
            Ok(raw) => Duration::from_secs(
                raw.parse()
                    .context("STORE_TIMEOUT_SECS must be a whole number of seconds")?,
            ),
            Err(_) => Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECS),
        };

        let bcrypt_cost = match env::var("BCRYPT_COST") {
            Ok(raw) => raw.parse().context("BCRYPT_COST must be a number")?,
            Err(_) => bcrypt::DEFAULT_COST,
        };

        let config = Self {
            database_url,
            bind_addr,
            access_token_secret,
            refresh_token_secret,
            store_backend,
            store_timeout,
            bcrypt_cost,
        };
        config.validate()?;

        info!(
            bind_addr = %config.bind_addr,
            backend = ?config.store_backend,
            "Configuration loaded"
        );
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.access_token_secret.is_empty() || self.refresh_token_secret.is_empty() {
            bail!("token secrets must not be empty");
        }
        if self.access_token_secret == self.refresh_token_secret {
            bail!("ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ");
        }
        Ok(())
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &self.database_url)
            .field("bind_addr", &self.bind_addr)
            .field("store_backend", &self.store_backend)
            .field("store_timeout", &self.store_timeout)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .finish_non_exhaustive()
    }
}
