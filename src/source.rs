use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use reqwest::Client;

use crate::rate_feed::{FeedRecord, parse_feed};

const QUERY_TAIL: &str = "sort=exchangedate&order=desc&json";

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("request to {uri} failed: {source}")]
    Request {
        uri: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{uri} answered with status {status}")]
    Status { uri: String, status: u16 },
    #[error("can't decode response from {uri}: {source}")]
    Decode {
        uri: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Trailing window of days ending at `end`, both inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn trailing(end: NaiveDate, days: u32) -> Option<Self> {
        let start = end.checked_sub_days(Days::new(u64::from(days)))?;
        Some(Self { start, end })
    }
}

#[async_trait]
pub trait RateSource: Send + Sync {
    /// Fetches the feed at `uri`. With no window the source's latest snapshot is
    /// returned.
    async fn fetch(
        &self,
        uri: &str,
        window: Option<DateWindow>,
    ) -> Result<Vec<FeedRecord>, SourceError>;
}

pub fn build_url(uri: &str, window: Option<DateWindow>) -> String {
    match window {
        Some(window) if window.start < window.end => format!(
            "{}?start={}&end={}&{}",
            uri.trim(),
            window.start.format("%Y%m%d"),
            window.end.format("%Y%m%d"),
            QUERY_TAIL
        ),
        _ => format!("{}?{}", uri.trim(), QUERY_TAIL),
    }
}

pub struct HttpRateSource {
    client: Client,
}

impl HttpRateSource {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn load_json(&self, url: &str) -> Result<String, SourceError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| SourceError::Request {
                uri: url.to_string(),
                source,
            })?;
        if !resp.status().is_success() {
            return Err(SourceError::Status {
                uri: url.to_string(),
                status: resp.status().as_u16(),
            });
        }

        resp.text().await.map_err(|source| SourceError::Request {
            uri: url.to_string(),
            source,
        })
    }
}

#[async_trait]
impl RateSource for HttpRateSource {
    async fn fetch(
        &self,
        uri: &str,
        window: Option<DateWindow>,
    ) -> Result<Vec<FeedRecord>, SourceError> {
        let url = build_url(uri, window);
        log::debug!("Fetching exchange rates from {}", url);

        let text = self.load_json(&url).await?;
        parse_feed(&text).map_err(|source| SourceError::Decode { uri: url, source })
    }
}
