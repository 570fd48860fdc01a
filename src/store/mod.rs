mod memory;
mod postgres;

pub use memory::{MemoryRateStore, MemoryRefreshStateStore, MemorySettingsStore};
pub use postgres::{PgRateStore, PgRefreshStateStore, PgSettingsStore, init_schema};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::errors::Result;
use crate::exchange_rate::ExchangeRate;

/// Record store keyed by `(exchange_date, currency_code)`.
#[async_trait]
pub trait RateStore: Send + Sync {
    async fn find_by_date(&self, date: NaiveDate) -> Result<Vec<ExchangeRate>>;
    async fn exists(&self, date: NaiveDate, currency_code: &str) -> Result<bool>;
    /// Returns `false` when a record with the same key is already stored.
    async fn insert_if_absent(&self, rate: &ExchangeRate) -> Result<bool>;
    async fn clear(&self) -> Result<u64>;
}

/// Persisted "last refreshed" marker.
#[async_trait]
pub trait RefreshStateStore: Send + Sync {
    async fn last_refreshed_at(&self) -> Result<Option<DateTime<Utc>>>;
    /// Never moves the marker backwards.
    async fn mark_refreshed(&self, at: DateTime<Utc>) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}
