use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Days, Duration, Utc};
use serde::{Serialize, Serializer};

use crate::errors::Result;
use crate::exchange_rate::{ChartData, ExchangeRate};
use crate::rate_feed::FeedRecord;
use crate::settings::{MAX_RANGE_DAYS, Settings, SettingsStore};
use crate::source::{DateWindow, RateSource, SourceError};
use crate::store::{RateStore, RefreshStateStore};

/// Age after which the local store is considered stale.
pub const REFRESH_INTERVAL_HOURS: i64 = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshStats {
    pub fetched: usize,
    pub inserted: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Fetching is switched off or no source is configured.
    Disabled,
    /// The source could not be reached or decoded. Nothing was written.
    Failed,
    Completed(RefreshStats),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceInvalid {
    Empty,
    Unreachable,
    NotFound,
    Malformed,
}

impl fmt::Display for SourceInvalid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let message = match self {
            SourceInvalid::Empty => "The server URI field is empty.",
            SourceInvalid::Unreachable => "Server request error.",
            SourceInvalid::NotFound => "The exchange server not found.",
            SourceInvalid::Malformed => "Server response data is invalid.",
        };
        f.write_str(message)
    }
}

impl Serialize for SourceInvalid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceValidation {
    pub is_valid: bool,
    pub error: Option<SourceInvalid>,
}

impl SourceValidation {
    fn valid() -> Self {
        Self {
            is_valid: true,
            error: None,
        }
    }

    fn invalid(reason: SourceInvalid) -> Self {
        Self {
            is_valid: false,
            error: Some(reason),
        }
    }
}

pub struct RateCache {
    source: Arc<dyn RateSource>,
    rates: Arc<dyn RateStore>,
    refresh_state: Arc<dyn RefreshStateStore>,
    settings: Arc<dyn SettingsStore>,
    backfill: bool,
}

impl RateCache {
    pub fn new(
        source: Arc<dyn RateSource>,
        rates: Arc<dyn RateStore>,
        refresh_state: Arc<dyn RefreshStateStore>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            source,
            rates,
            refresh_state,
            settings,
            backfill: false,
        }
    }

    /// Makes refresh request the trailing `range_days` window instead of the
    /// latest snapshot.
    pub fn with_backfill(mut self, backfill: bool) -> Self {
        self.backfill = backfill;
        self
    }

    pub fn settings_store(&self) -> &Arc<dyn SettingsStore> {
        &self.settings
    }

    pub async fn settings(&self) -> Result<Settings> {
        Ok(self.settings.load().await?.unwrap_or_default())
    }

    pub async fn ensure_fresh(&self) -> Result<Option<RefreshOutcome>> {
        self.ensure_fresh_at(Utc::now()).await
    }

    /// Refreshes when the marker is absent or older than the refresh interval.
    /// Returns `None` when the store was fresh.
    pub async fn ensure_fresh_at(&self, now: DateTime<Utc>) -> Result<Option<RefreshOutcome>> {
        let last = self.refresh_state.last_refreshed_at().await?;
        let threshold = now - Duration::hours(REFRESH_INTERVAL_HOURS);

        if last.is_some_and(|at| at >= threshold) {
            return Ok(None);
        }

        let outcome = self.refresh_at(now).await?;
        self.refresh_state.mark_refreshed(now).await?;
        Ok(Some(outcome))
    }

    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        self.refresh_at(Utc::now()).await
    }

    pub async fn refresh_at(&self, now: DateTime<Utc>) -> Result<RefreshOutcome> {
        let settings = self.settings().await?;
        if !settings.fetch_allowed() {
            log::debug!("Exchange rate fetching is disabled, skipping refresh");
            return Ok(RefreshOutcome::Disabled);
        }

        let window = if self.backfill {
            DateWindow::trailing(now.date_naive(), settings.range_days)
        } else {
            None
        };

        let feed = match self.source.fetch(&settings.source_uri, window).await {
            Ok(feed) => feed,
            Err(e) => {
                log::error!("Exchange rate refresh abandoned: {}", e);
                return Ok(RefreshOutcome::Failed);
            }
        };

        let mut stats = RefreshStats {
            fetched: feed.len(),
            ..RefreshStats::default()
        };

        for item in &feed {
            let rate = match item.to_exchange_rate() {
                Ok(rate) => rate,
                Err(e) => {
                    log::warn!("Skipping exchange rate record {:?}: {}", item, e);
                    stats.skipped += 1;
                    continue;
                }
            };

            if self.rates.exists(rate.exchange_date, &rate.currency_code).await? {
                continue;
            }
            if self.rates.insert_if_absent(&rate).await? {
                stats.inserted += 1;
            }
        }

        log::info!(
            "Exchange rates refreshed: {} fetched, {} new, {} skipped",
            stats.fetched,
            stats.inserted,
            stats.skipped
        );
        Ok(RefreshOutcome::Completed(stats))
    }

    pub async fn get_by_range(&self, range_days: u32) -> Result<Vec<ExchangeRate>> {
        self.get_by_range_at(range_days, Utc::now()).await
    }

    /// Records for `today` back to `today - range_days`, most recent date first.
    pub async fn get_by_range_at(
        &self,
        range_days: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExchangeRate>> {
        self.ensure_fresh_at(now).await?;

        let today = now.date_naive();
        let mut records = Vec::new();
        for offset in 0..=u64::from(range_days) {
            let Some(date) = today.checked_sub_days(Days::new(offset)) else {
                break;
            };
            records.extend(self.rates.find_by_date(date).await?);
        }

        Ok(records)
    }

    /// Code to display name for every currency the source currently offers.
    /// Without an explicit `uri` the configured source is used, and only when
    /// fetching is enabled.
    pub async fn list_available_currencies(
        &self,
        uri: Option<&str>,
    ) -> Result<BTreeMap<String, String>> {
        let uri = match uri.map(str::trim).filter(|u| !u.is_empty()) {
            Some(uri) => uri.to_string(),
            None => {
                let settings = self.settings().await?;
                if !settings.fetch_allowed() {
                    return Ok(BTreeMap::new());
                }
                settings.source_uri
            }
        };

        match self.fetch_offered(&uri).await {
            Ok(offered) => Ok(offered),
            Err(e) => {
                log::error!("Can't list currencies: {}", e);
                Ok(BTreeMap::new())
            }
        }
    }

    /// Selected codes that the configured source no longer offers.
    pub async fn reconcile_selection(&self) -> Result<BTreeSet<String>> {
        let settings = self.settings().await?;
        Ok(self.reconcile_with(&settings).await)
    }

    /// Same as [`reconcile_selection`](Self::reconcile_selection) for settings
    /// that are not saved yet. An unreachable source yields an empty result.
    pub async fn reconcile_with(&self, settings: &Settings) -> BTreeSet<String> {
        let selected = settings.active_codes();
        if selected.is_empty() || settings.source_uri.trim().is_empty() {
            return BTreeSet::new();
        }

        let offered = match self.fetch_offered(&settings.source_uri).await {
            Ok(offered) => offered,
            Err(e) => {
                log::error!("Can't reconcile currency selection: {}", e);
                return BTreeSet::new();
            }
        };

        let removed: BTreeSet<String> = selected
            .into_iter()
            .filter(|code| !offered.contains_key(code))
            .collect();

        if !removed.is_empty() {
            let list: Vec<&str> = removed.iter().map(String::as_str).collect();
            log::error!(
                "There are no currency data on the server: {}",
                list.join("; ")
            );
        }
        removed
    }

    /// Single-attempt check of a candidate source URI.
    pub async fn validate_source(&self, uri: &str) -> SourceValidation {
        let uri = uri.trim();
        if uri.is_empty() {
            log::info!("{}", SourceInvalid::Empty);
            return SourceValidation::invalid(SourceInvalid::Empty);
        }

        let reason = match self.source.fetch(uri, None).await {
            Err(e) => {
                log::error!("Source {} unreachable: {}", uri, e);
                return SourceValidation::invalid(SourceInvalid::Unreachable);
            }
            Ok(feed) if feed.is_empty() => Some(SourceInvalid::NotFound),
            Ok(feed) if feed.iter().any(|r| !r.missing_fields().is_empty()) => {
                Some(SourceInvalid::Malformed)
            }
            Ok(_) => None,
        };

        match reason {
            Some(reason) => {
                log::error!("Source {} rejected: {}", uri, reason);
                SourceValidation::invalid(reason)
            }
            None => SourceValidation::valid(),
        }
    }

    /// Raw feed at `uri`, for inspecting what a source returns.
    pub async fn preview_source(&self, uri: &str) -> Result<Vec<FeedRecord>> {
        Ok(self.source.fetch(uri.trim(), None).await?)
    }

    pub async fn chart_data(&self, title: &str) -> Result<ChartData> {
        self.chart_data_at(title, Utc::now()).await
    }

    /// Selected currencies over the configured range, oldest first.
    pub async fn chart_data_at(&self, title: &str, now: DateTime<Utc>) -> Result<ChartData> {
        let settings = self.settings().await?;
        let range_days = settings.range_days.min(MAX_RANGE_DAYS);
        let records = self.get_by_range_at(range_days, now).await?;
        let selected = filter_by_selection(records, &settings.active_codes());
        Ok(ChartData::from_newest_first(title, &selected))
    }

    pub async fn clear_state(&self) -> Result<()> {
        self.refresh_state.clear().await
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.refresh_state.clear().await?;
        let removed = self.rates.clear().await?;
        log::info!("Cleared {} cached exchange rates", removed);
        Ok(())
    }

    async fn fetch_offered(
        &self,
        uri: &str,
    ) -> std::result::Result<BTreeMap<String, String>, SourceError> {
        let feed = self.source.fetch(uri, None).await?;
        Ok(currency_names(&feed))
    }
}

/// Records whose code is in `selected`, order preserved. An empty selection
/// selects nothing.
pub fn filter_by_selection(
    records: Vec<ExchangeRate>,
    selected: &BTreeSet<String>,
) -> Vec<ExchangeRate> {
    records
        .into_iter()
        .filter(|r| selected.contains(&r.currency_code))
        .collect()
}

fn currency_names(feed: &[FeedRecord]) -> BTreeMap<String, String> {
    feed.iter()
        .filter_map(|item| {
            let code = item.cc.as_deref()?.trim();
            if code.is_empty() {
                return None;
            }
            let name = item
                .txt
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(code);
            Some((code.to_string(), name.to_string()))
        })
        .collect()
}
