use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, ValidationErrors};

/// Value an unchecked currency box submits. Never a currency code.
pub const UNSELECTED: &str = "0";

/// Longest trailing window, in days, a query or saved setting may ask for.
pub const MAX_RANGE_DAYS: u32 = 366;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub enabled: bool,
    pub source_uri: String,
    pub range_days: u32,
    pub selected_currency_codes: BTreeSet<String>,
}

impl Settings {
    /// Whether a refresh may reach the remote source at all.
    pub fn fetch_allowed(&self) -> bool {
        self.enabled && !self.source_uri.trim().is_empty()
    }

    /// Selected codes with the unselected sentinel and blanks removed.
    pub fn active_codes(&self) -> BTreeSet<String> {
        active_codes(self.selected_currency_codes.iter().map(String::as_str))
    }
}

pub fn active_codes<'a>(codes: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    codes
        .into_iter()
        .map(str::trim)
        .filter(|code| !code.is_empty() && *code != UNSELECTED)
        .map(str::to_string)
        .collect()
}

/// Unvalidated settings as submitted by an operator.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsForm {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub source_uri: String,
    #[serde(default = "default_range")]
    pub range_days: i64,
    #[serde(default)]
    pub selected_currency_codes: Vec<String>,
}

fn default_range() -> i64 {
    1
}

impl SettingsForm {
    /// Errors for the fields that need no network access.
    pub fn field_errors(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::default();
        if self.range_days < 0 {
            errors.add(
                "range_days",
                "Exchange rate period in days must be greater than or equal to 0",
            );
        } else if self.range_days > i64::from(MAX_RANGE_DAYS) {
            errors.add(
                "range_days",
                format!(
                    "Exchange rate period in days must not exceed {}",
                    MAX_RANGE_DAYS
                ),
            );
        }
        errors
    }

    pub fn validate(&self) -> Result<Settings> {
        self.field_errors().into_result()?;
        let range_days = u32::try_from(self.range_days).unwrap_or(MAX_RANGE_DAYS);

        Ok(Settings {
            enabled: self.enabled,
            source_uri: self.source_uri.trim().to_string(),
            range_days,
            selected_currency_codes: active_codes(
                self.selected_currency_codes.iter().map(String::as_str),
            ),
        })
    }
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Returns `None` until settings are first saved.
    async fn load(&self) -> Result<Option<Settings>>;
    async fn save(&self, settings: &Settings) -> Result<()>;
}
