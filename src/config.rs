use std::{net::SocketAddr, time::Duration};

use anyhow::{Context, Result, bail};

use crate::settings::{MAX_RANGE_DAYS, Settings, active_codes};

pub const DEFAULT_SOURCE_URI: &str = "https://bank.gov.ua/NBU_Exchange/exchange_site";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    /// `None` keeps everything in process memory.
    pub database_url: Option<String>,
    pub http_timeout: Duration,
    pub backfill: bool,
    /// Used when the settings store has nothing saved yet.
    pub seed_settings: Settings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = env_or("RATES_LISTEN_ADDR", "127.0.0.1:8080")
            .parse()
            .context("Invalid RATES_LISTEN_ADDR")?;
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty());
        let timeout_secs: u64 = env_or("RATES_HTTP_TIMEOUT_SECS", "10")
            .parse()
            .context("Invalid RATES_HTTP_TIMEOUT_SECS")?;
        let backfill = parse_flag(&env_or("RATES_BACKFILL", "false"));

        let range_days: u32 = env_or("RATES_RANGE_DAYS", "1")
            .parse()
            .context("RATES_RANGE_DAYS must be a non-negative integer")?;
        if range_days > MAX_RANGE_DAYS {
            bail!("RATES_RANGE_DAYS must not exceed {}", MAX_RANGE_DAYS);
        }
        let currencies = env_or("RATES_CURRENCIES", "");
        let seed_settings = Settings {
            enabled: parse_flag(&env_or("RATES_ENABLED", "false")),
            source_uri: env_or("RATES_SOURCE_URI", DEFAULT_SOURCE_URI).trim().to_string(),
            range_days,
            selected_currency_codes: active_codes(currencies.split(',')),
        };

        Ok(Self {
            listen_addr,
            database_url,
            http_timeout: Duration::from_secs(timeout_secs),
            backfill,
            seed_settings,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags() {
        assert!(parse_flag("1"));
        assert!(parse_flag(" TRUE "));
        assert!(parse_flag("on"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag(""));
    }
}
