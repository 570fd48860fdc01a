use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One currency's rate for one calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub id: Uuid,
    pub exchange_date: NaiveDate,
    pub currency_code: String,
    pub currency_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub rate: Decimal,
}

impl ExchangeRate {
    pub fn new(
        exchange_date: NaiveDate,
        currency_code: impl Into<String>,
        currency_name: impl Into<String>,
        rate: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            exchange_date,
            currency_code: currency_code.into(),
            currency_name: currency_name.into(),
            rate,
        }
    }

    /// Identity used for deduplication in the store.
    pub fn key(&self) -> (NaiveDate, &str) {
        (self.exchange_date, self.currency_code.as_str())
    }

    pub fn point(&self) -> RatePoint {
        RatePoint {
            date: self.exchange_date,
            rate: self.rate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatePoint {
    pub date: NaiveDate,
    #[serde(with = "rust_decimal::serde::float")]
    pub rate: Decimal,
}

/// Chart-ready view of a set of records. Labels and every series run oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub title: String,
    pub labels: Vec<NaiveDate>,
    pub series: BTreeMap<String, Vec<RatePoint>>,
}

impl ChartData {
    /// Builds the chart view from records ordered most recent date first.
    pub fn from_newest_first(title: impl Into<String>, records: &[ExchangeRate]) -> Self {
        let mut series: BTreeMap<String, Vec<RatePoint>> = BTreeMap::new();
        let mut dates = BTreeSet::new();

        for record in records.iter().rev() {
            dates.insert(record.exchange_date);
            series
                .entry(record.currency_code.clone())
                .or_default()
                .push(record.point());
        }

        Self {
            title: title.into(),
            labels: dates.into_iter().collect(),
            series,
        }
    }
}
