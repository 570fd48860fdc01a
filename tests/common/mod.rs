#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;

use valut_chart::rate_cache::RateCache;
use valut_chart::rate_feed::FeedRecord;
use valut_chart::settings::Settings;
use valut_chart::source::{DateWindow, RateSource, SourceError};
use valut_chart::store::{MemoryRateStore, MemoryRefreshStateStore, MemorySettingsStore};

pub const SOURCE_URI: &str = "https://bank.example/rates";

/// Source answering from a per-URI script. Unknown URIs answer 503.
#[derive(Default)]
pub struct ScriptedSource {
    feeds: Mutex<HashMap<String, Vec<FeedRecord>>>,
    calls: AtomicUsize,
    windows: Mutex<Vec<Option<DateWindow>>>,
}

impl ScriptedSource {
    pub fn with_feed(uri: &str, feed: Vec<FeedRecord>) -> Self {
        let source = Self::default();
        source.set_feed(uri, feed);
        source
    }

    pub fn set_feed(&self, uri: &str, feed: Vec<FeedRecord>) {
        self.feeds.lock().unwrap().insert(uri.to_string(), feed);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn windows(&self) -> Vec<Option<DateWindow>> {
        self.windows.lock().unwrap().clone()
    }
}

#[async_trait]
impl RateSource for ScriptedSource {
    async fn fetch(
        &self,
        uri: &str,
        window: Option<DateWindow>,
    ) -> Result<Vec<FeedRecord>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.windows.lock().unwrap().push(window);
        self.feeds
            .lock()
            .unwrap()
            .get(uri)
            .cloned()
            .ok_or_else(|| SourceError::Status {
                uri: uri.to_string(),
                status: 503,
            })
    }
}

pub struct Harness {
    pub cache: RateCache,
    pub source: Arc<ScriptedSource>,
    pub rates: Arc<MemoryRateStore>,
    pub state: Arc<MemoryRefreshStateStore>,
    pub settings: Arc<MemorySettingsStore>,
}

pub fn harness(source: ScriptedSource, settings: Settings) -> Harness {
    let source = Arc::new(source);
    let rates = Arc::new(MemoryRateStore::new());
    let state = Arc::new(MemoryRefreshStateStore::new());
    let settings = Arc::new(MemorySettingsStore::new(Some(settings)));
    let cache = RateCache::new(source.clone(), rates.clone(), state.clone(), settings.clone());

    Harness {
        cache,
        source,
        rates,
        state,
        settings,
    }
}

pub fn settings(codes: &[&str], range_days: u32) -> Settings {
    Settings {
        enabled: true,
        source_uri: SOURCE_URI.to_string(),
        range_days,
        selected_currency_codes: codes.iter().map(|c| c.to_string()).collect::<BTreeSet<_>>(),
    }
}

pub fn feed(date: &str, cc: &str, txt: &str, rate: Decimal) -> FeedRecord {
    FeedRecord {
        exchangedate: Some(date.to_string()),
        cc: Some(cc.to_string()),
        txt: Some(txt.to_string()),
        rate: Some(rate),
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}
