use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{RateStore, RefreshStateStore};
use crate::errors::Result;
use crate::exchange_rate::ExchangeRate;
use crate::settings::{Settings, SettingsStore};

const REFRESH_KEY: &str = "exchange_rates";
const SETTINGS_ID: i16 = 1;

pub async fn init_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS exchange_rates (
            id UUID PRIMARY KEY,
            exchange_date DATE NOT NULL,
            currency_code TEXT NOT NULL,
            currency_name TEXT NOT NULL,
            rate NUMERIC NOT NULL,
            UNIQUE (exchange_date, currency_code)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS refresh_state (
            key TEXT PRIMARY KEY,
            refreshed_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS exchange_settings (
            id SMALLINT PRIMARY KEY,
            enabled BOOLEAN NOT NULL,
            source_uri TEXT NOT NULL,
            range_days INTEGER NOT NULL CHECK (range_days BETWEEN 0 AND 366),
            selected_codes TEXT[] NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[derive(Debug, sqlx::FromRow)]
struct ExchangeRateRow {
    id: Uuid,
    exchange_date: NaiveDate,
    currency_code: String,
    currency_name: String,
    rate: Decimal,
}

impl From<ExchangeRateRow> for ExchangeRate {
    fn from(row: ExchangeRateRow) -> Self {
        ExchangeRate {
            id: row.id,
            exchange_date: row.exchange_date,
            currency_code: row.currency_code,
            currency_name: row.currency_name,
            rate: row.rate,
        }
    }
}

#[derive(Clone)]
pub struct PgRateStore {
    pool: PgPool,
}

impl PgRateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RateStore for PgRateStore {
    async fn find_by_date(&self, date: NaiveDate) -> Result<Vec<ExchangeRate>> {
        let rows: Vec<ExchangeRateRow> = sqlx::query_as(
            r#"
            SELECT id, exchange_date, currency_code, currency_name, rate
            FROM exchange_rates
            WHERE exchange_date = $1
            ORDER BY currency_code
            "#,
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ExchangeRate::from).collect())
    }

    async fn exists(&self, date: NaiveDate, currency_code: &str) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM exchange_rates
                WHERE exchange_date = $1 AND currency_code = $2
            ) AS found
            "#,
        )
        .bind(date)
        .bind(currency_code)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("found")?)
    }

    async fn insert_if_absent(&self, rate: &ExchangeRate) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO exchange_rates (id, exchange_date, currency_code, currency_name, rate)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (exchange_date, currency_code) DO NOTHING
            "#,
        )
        .bind(rate.id)
        .bind(rate.exchange_date)
        .bind(&rate.currency_code)
        .bind(&rate.currency_name)
        .bind(rate.rate)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM exchange_rates")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Clone)]
pub struct PgRefreshStateStore {
    pool: PgPool,
}

impl PgRefreshStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshStateStore for PgRefreshStateStore {
    async fn last_refreshed_at(&self) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT refreshed_at FROM refresh_state WHERE key = $1")
            .bind(REFRESH_KEY)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("refreshed_at")?)),
            None => Ok(None),
        }
    }

    async fn mark_refreshed(&self, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO refresh_state (key, refreshed_at)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE
            SET refreshed_at = GREATEST(refresh_state.refreshed_at, EXCLUDED.refreshed_at)
            "#,
        )
        .bind(REFRESH_KEY)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM refresh_state WHERE key = $1")
            .bind(REFRESH_KEY)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgSettingsStore {
    pool: PgPool,
}

impl PgSettingsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsStore for PgSettingsStore {
    async fn load(&self) -> Result<Option<Settings>> {
        let row = sqlx::query(
            r#"
            SELECT enabled, source_uri, range_days, selected_codes
            FROM exchange_settings
            WHERE id = $1
            "#,
        )
        .bind(SETTINGS_ID)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let range_days: i32 = row.try_get("range_days")?;
        let selected: Vec<String> = row.try_get("selected_codes")?;
        Ok(Some(Settings {
            enabled: row.try_get("enabled")?,
            source_uri: row.try_get("source_uri")?,
            range_days: u32::try_from(range_days).unwrap_or_default(),
            selected_currency_codes: selected.into_iter().collect(),
        }))
    }

    async fn save(&self, settings: &Settings) -> Result<()> {
        let selected: Vec<String> = settings.selected_currency_codes.iter().cloned().collect();
        let range_days = i32::try_from(settings.range_days).unwrap_or(i32::MAX);

        sqlx::query(
            r#"
            INSERT INTO exchange_settings (id, enabled, source_uri, range_days, selected_codes)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET enabled = EXCLUDED.enabled,
                source_uri = EXCLUDED.source_uri,
                range_days = EXCLUDED.range_days,
                selected_codes = EXCLUDED.selected_codes
            "#,
        )
        .bind(SETTINGS_ID)
        .bind(settings.enabled)
        .bind(&settings.source_uri)
        .bind(range_days)
        .bind(selected)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
