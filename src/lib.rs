//! Exchange-rate cache: polls a bank's JSON rate feed, keeps the records in a
//! local store and serves date-range and currency-filtered views of them.

pub mod admin;
pub mod api;
pub mod config;
pub mod errors;
pub mod exchange_rate;
pub mod rate_cache;
pub mod rate_feed;
pub mod settings;
pub mod source;
pub mod store;

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;

use config::AppConfig;
use rate_cache::RateCache;
use settings::SettingsStore;
use source::HttpRateSource;
use store::{
    MemoryRateStore, MemoryRefreshStateStore, MemorySettingsStore, PgRateStore,
    PgRefreshStateStore, PgSettingsStore,
};

pub use errors::{Error, ValidationErrors};
pub use exchange_rate::{ChartData, ExchangeRate, RatePoint};

/// Wires the cache to Postgres when `DATABASE_URL` is set, to process memory
/// otherwise, and seeds the settings store on first start.
pub async fn build_cache(config: &AppConfig) -> Result<RateCache> {
    let source = Arc::new(HttpRateSource::new(config.http_timeout)?);

    let cache = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
            store::init_schema(&pool).await?;
            log::info!("Using Postgres exchange rate store");
            RateCache::new(
                source,
                Arc::new(PgRateStore::new(pool.clone())),
                Arc::new(PgRefreshStateStore::new(pool.clone())),
                Arc::new(PgSettingsStore::new(pool)),
            )
        }
        None => {
            log::warn!("DATABASE_URL is not set, exchange rates are kept in memory");
            RateCache::new(
                source,
                Arc::new(MemoryRateStore::new()),
                Arc::new(MemoryRefreshStateStore::new()),
                Arc::new(MemorySettingsStore::default()),
            )
        }
    }
    .with_backfill(config.backfill);

    seed_settings(cache.settings_store().as_ref(), config).await?;
    Ok(cache)
}

async fn seed_settings(store: &dyn SettingsStore, config: &AppConfig) -> Result<()> {
    if store.load().await?.is_none() {
        log::info!("No saved exchange settings, using environment defaults");
        store.save(&config.seed_settings).await?;
    }
    Ok(())
}
