//! Operator-facing settings workflow.

use serde::Serialize;

use crate::errors::Result;
use crate::rate_cache::RateCache;
use crate::settings::{Settings, SettingsForm};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavedSettings {
    pub settings: Settings,
    pub removed_currencies: Vec<String>,
    pub warnings: Vec<String>,
}

/// Validates `form`, checks its source, stores it and resets the cache.
///
/// The refresh marker is always cleared so the next read refetches. Cached
/// records are dropped as well when the source URI changes.
pub async fn save_settings(cache: &RateCache, form: &SettingsForm) -> Result<SavedSettings> {
    let mut errors = form.field_errors();
    let check = cache.validate_source(&form.source_uri).await;
    if let Some(reason) = check.error {
        errors.add("source_uri", reason.to_string());
    }
    errors.into_result()?;

    let settings = form.validate()?;
    let removed = cache.reconcile_with(&settings).await;

    let store = cache.settings_store();
    let previous = store.load().await?;
    store.save(&settings).await?;

    let source_changed = previous.is_some_and(|p| p.source_uri != settings.source_uri);
    if source_changed {
        cache.clear_all().await?;
    } else {
        cache.clear_state().await?;
    }

    let removed_currencies: Vec<String> = removed.into_iter().collect();
    let warnings = removed_currencies
        .iter()
        .map(|code| format!("Currency is deleted {}", code))
        .collect();

    log::info!(
        "Exchange settings saved (enabled: {}, range: {} days, {} currencies)",
        settings.enabled,
        settings.range_days,
        settings.selected_currency_codes.len()
    );

    Ok(SavedSettings {
        settings,
        removed_currencies,
        warnings,
    })
}
