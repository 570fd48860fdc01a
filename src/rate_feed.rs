use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::exchange_rate::ExchangeRate;

const DATE_FORMATS: [&str; 3] = ["%d.%m.%Y", "%Y%m%d", "%Y-%m-%d"];

/// One item of the remote JSON feed. Every field is optional on the wire so that
/// shape problems surface per record instead of failing the whole payload.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct FeedRecord {
    #[serde(default, deserialize_with = "deserialize_text")]
    pub exchangedate: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub cc: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub txt: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_rate",
        serialize_with = "rust_decimal::serde::float_option::serialize"
    )]
    pub rate: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedRecord {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("unparsable exchange date `{0}`")]
    BadDate(String),
}

impl FeedRecord {
    /// Required fields that are absent or blank, in wire order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(&self.exchangedate) {
            missing.push("exchangedate");
        }
        if is_blank(&self.cc) {
            missing.push("cc");
        }
        if is_blank(&self.txt) {
            missing.push("txt");
        }
        if self.rate.is_none() {
            missing.push("rate");
        }
        missing
    }

    pub fn to_exchange_rate(&self) -> Result<ExchangeRate, MalformedRecord> {
        if let Some(&field) = self.missing_fields().first() {
            return Err(MalformedRecord::MissingField(field));
        }

        let raw_date = self.exchangedate.as_deref().unwrap_or_default().trim();
        let exchange_date = parse_exchange_date(raw_date)
            .ok_or_else(|| MalformedRecord::BadDate(raw_date.to_string()))?;

        Ok(ExchangeRate::new(
            exchange_date,
            self.cc.as_deref().unwrap_or_default().trim(),
            self.txt.as_deref().unwrap_or_default().trim(),
            self.rate.unwrap_or_default(),
        ))
    }
}

/// Decodes a feed body. The top level must be a JSON array.
pub fn parse_feed(text: &str) -> Result<Vec<FeedRecord>, serde_json::Error> {
    serde_json::from_str(text)
}

pub fn parse_exchange_date(s: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(s, format).ok())
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|s| s.trim().is_empty())
}

fn normalize_decimal_string(s: &str) -> String {
    s.trim().replace(',', ".")
}

fn deserialize_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn deserialize_rate<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => normalize_decimal_string(&s),
        _ => return Ok(None),
    };

    Ok(Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .ok())
}
