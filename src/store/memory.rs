use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use super::{RateStore, RefreshStateStore};
use crate::errors::Result;
use crate::exchange_rate::ExchangeRate;
use crate::settings::{Settings, SettingsStore};

/// In-process record store. Insertion order is kept within a date.
#[derive(Default)]
pub struct MemoryRateStore {
    rates: RwLock<BTreeMap<NaiveDate, Vec<ExchangeRate>>>,
}

impl MemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.rates.read()?.values().map(Vec::len).sum())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl RateStore for MemoryRateStore {
    async fn find_by_date(&self, date: NaiveDate) -> Result<Vec<ExchangeRate>> {
        Ok(self.rates.read()?.get(&date).cloned().unwrap_or_default())
    }

    async fn exists(&self, date: NaiveDate, currency_code: &str) -> Result<bool> {
        Ok(self
            .rates
            .read()?
            .get(&date)
            .is_some_and(|day| day.iter().any(|r| r.currency_code == currency_code)))
    }

    async fn insert_if_absent(&self, rate: &ExchangeRate) -> Result<bool> {
        let mut rates = self.rates.write()?;
        let day = rates.entry(rate.exchange_date).or_default();
        if day.iter().any(|r| r.key() == rate.key()) {
            return Ok(false);
        }
        day.push(rate.clone());
        Ok(true)
    }

    async fn clear(&self) -> Result<u64> {
        let mut rates = self.rates.write()?;
        let removed = rates.values().map(Vec::len).sum::<usize>() as u64;
        rates.clear();
        Ok(removed)
    }
}

#[derive(Default)]
pub struct MemoryRefreshStateStore {
    last: RwLock<Option<DateTime<Utc>>>,
}

impl MemoryRefreshStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_last_refreshed(at: DateTime<Utc>) -> Self {
        Self {
            last: RwLock::new(Some(at)),
        }
    }
}

#[async_trait]
impl RefreshStateStore for MemoryRefreshStateStore {
    async fn last_refreshed_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(*self.last.read()?)
    }

    async fn mark_refreshed(&self, at: DateTime<Utc>) -> Result<()> {
        let mut last = self.last.write()?;
        if last.is_none_or(|prev| at > prev) {
            *last = Some(at);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.last.write()? = None;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySettingsStore {
    settings: RwLock<Option<Settings>>,
}

impl MemorySettingsStore {
    pub fn new(settings: Option<Settings>) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn load(&self) -> Result<Option<Settings>> {
        Ok(self.settings.read()?.clone())
    }

    async fn save(&self, settings: &Settings) -> Result<()> {
        *self.settings.write()? = Some(settings.clone());
        Ok(())
    }
}
