mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Duration;
use rust_decimal_macros::dec;

use common::*;
use valut_chart::rate_cache::{
    RateCache, RefreshOutcome, RefreshStats, SourceInvalid, filter_by_selection,
};
use valut_chart::rate_feed::FeedRecord;
use valut_chart::settings::Settings;
use valut_chart::store::{
    MemoryRateStore, MemoryRefreshStateStore, MemorySettingsStore, RateStore, RefreshStateStore,
};

fn january_snapshot() -> Vec<FeedRecord> {
    vec![
        feed("20240101", "USD", "US Dollar", dec!(100)),
        feed("20240101", "EUR", "Euro", dec!(90)),
    ]
}

#[tokio::test]
async fn refresh_twice_stores_each_record_once() {
    let h = harness(
        ScriptedSource::with_feed(SOURCE_URI, january_snapshot()),
        settings(&["USD"], 0),
    );

    let first = h.cache.refresh().await.unwrap();
    let second = h.cache.refresh().await.unwrap();

    assert_eq!(
        first,
        RefreshOutcome::Completed(RefreshStats {
            fetched: 2,
            inserted: 2,
            skipped: 0
        })
    );
    assert_eq!(
        second,
        RefreshOutcome::Completed(RefreshStats {
            fetched: 2,
            inserted: 0,
            skipped: 0
        })
    );
    assert_eq!(h.rates.len().unwrap(), 2);
}

#[tokio::test]
async fn refresh_never_overwrites_stored_rate() {
    let h = harness(
        ScriptedSource::with_feed(SOURCE_URI, january_snapshot()),
        settings(&["USD"], 0),
    );
    h.cache.refresh().await.unwrap();

    h.source.set_feed(
        SOURCE_URI,
        vec![feed("20240101", "USD", "US Dollar", dec!(101))],
    );
    h.cache.refresh().await.unwrap();

    let stored = h.rates.find_by_date(date(2024, 1, 1)).await.unwrap();
    let usd = stored.iter().find(|r| r.currency_code == "USD").unwrap();
    assert_eq!(usd.rate, dec!(100));
}

#[tokio::test]
async fn disabled_or_unconfigured_refresh_is_a_no_op() {
    let disabled = Settings {
        enabled: false,
        ..settings(&["USD"], 0)
    };
    let h = harness(
        ScriptedSource::with_feed(SOURCE_URI, january_snapshot()),
        disabled,
    );
    assert_eq!(h.cache.refresh().await.unwrap(), RefreshOutcome::Disabled);

    let no_uri = Settings {
        source_uri: "  ".into(),
        ..settings(&["USD"], 0)
    };
    let h2 = harness(
        ScriptedSource::with_feed(SOURCE_URI, january_snapshot()),
        no_uri,
    );
    assert_eq!(h2.cache.refresh().await.unwrap(), RefreshOutcome::Disabled);

    assert_eq!(h.source.calls() + h2.source.calls(), 0);
    assert!(h.rates.is_empty().unwrap());
}

#[tokio::test]
async fn unreachable_source_leaves_store_untouched() {
    let h = harness(ScriptedSource::default(), settings(&["USD"], 0));

    assert_eq!(h.cache.refresh().await.unwrap(), RefreshOutcome::Failed);
    assert!(h.rates.is_empty().unwrap());
}

#[tokio::test]
async fn malformed_records_are_skipped_not_fatal() {
    let mut snapshot = january_snapshot();
    snapshot.push(FeedRecord {
        rate: None,
        ..feed("20240101", "GBP", "Pound", dec!(0))
    });
    snapshot.push(feed("not a date", "PLN", "Zloty", dec!(10)));
    let h = harness(
        ScriptedSource::with_feed(SOURCE_URI, snapshot),
        settings(&["USD"], 0),
    );

    let outcome = h.cache.refresh().await.unwrap();

    assert_eq!(
        outcome,
        RefreshOutcome::Completed(RefreshStats {
            fetched: 4,
            inserted: 2,
            skipped: 2
        })
    );
    assert!(!h.rates.exists(date(2024, 1, 1), "GBP").await.unwrap());
}

#[tokio::test]
async fn freshness_gate_allows_one_fetch_per_window() {
    let h = harness(
        ScriptedSource::with_feed(SOURCE_URI, january_snapshot()),
        settings(&["USD"], 0),
    );
    let start = at(2024, 1, 1, 8);

    assert!(h.cache.ensure_fresh_at(start).await.unwrap().is_some());
    assert!(h.cache.ensure_fresh_at(start).await.unwrap().is_none());
    assert!(
        h.cache
            .ensure_fresh_at(start + Duration::hours(3))
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(h.source.calls(), 1);
    assert_eq!(h.state.last_refreshed_at().await.unwrap(), Some(start));

    let later = start + Duration::hours(4) + Duration::minutes(1);
    assert!(h.cache.ensure_fresh_at(later).await.unwrap().is_some());
    assert_eq!(h.source.calls(), 2);
    assert_eq!(h.state.last_refreshed_at().await.unwrap(), Some(later));
}

#[tokio::test]
async fn failed_refresh_still_marks_the_window() {
    let h = harness(ScriptedSource::default(), settings(&["USD"], 0));
    let now = at(2024, 1, 1, 8);

    assert_eq!(
        h.cache.ensure_fresh_at(now).await.unwrap(),
        Some(RefreshOutcome::Failed)
    );
    assert!(h.cache.ensure_fresh_at(now).await.unwrap().is_none());
    assert_eq!(h.source.calls(), 1);
}

#[tokio::test]
async fn range_covers_today_and_previous_days_newest_first() {
    let snapshot = vec![
        feed("05.01.2024", "USD", "US Dollar", dec!(105)),
        feed("04.01.2024", "USD", "US Dollar", dec!(104)),
        feed("03.01.2024", "USD", "US Dollar", dec!(103)),
        feed("03.01.2024", "EUR", "Euro", dec!(93)),
        feed("02.01.2024", "USD", "US Dollar", dec!(102)),
    ];
    let h = harness(
        ScriptedSource::with_feed(SOURCE_URI, snapshot),
        settings(&["USD"], 2),
    );

    let records = h.cache.get_by_range_at(2, at(2024, 1, 5, 12)).await.unwrap();

    let dates: Vec<_> = records.iter().map(|r| r.exchange_date).collect();
    assert_eq!(
        dates,
        vec![
            date(2024, 1, 5),
            date(2024, 1, 4),
            date(2024, 1, 3),
            date(2024, 1, 3)
        ]
    );
    let distinct: BTreeSet<_> = dates.into_iter().collect();
    assert_eq!(distinct.len(), 3);
}

#[tokio::test]
async fn range_is_anchored_on_today_even_when_source_lags() {
    let h = harness(
        ScriptedSource::with_feed(SOURCE_URI, january_snapshot()),
        settings(&["USD"], 0),
    );

    let records = h.cache.get_by_range_at(0, at(2024, 1, 2, 9)).await.unwrap();

    assert!(records.is_empty());
    assert_eq!(h.rates.len().unwrap(), 2);
}

#[tokio::test]
async fn single_day_usd_scenario() {
    let h = harness(
        ScriptedSource::with_feed(SOURCE_URI, january_snapshot()),
        settings(&["USD"], 0),
    );

    let records = h.cache.get_by_range_at(0, at(2024, 1, 1, 10)).await.unwrap();
    let selection = BTreeSet::from(["USD".to_string()]);
    let selected = filter_by_selection(records, &selection);

    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].exchange_date, date(2024, 1, 1));
    assert_eq!(selected[0].currency_code, "USD");
    assert_eq!(selected[0].rate, dec!(100));
}

#[tokio::test]
async fn backfill_requests_the_trailing_window() {
    let h = harness(
        ScriptedSource::with_feed(SOURCE_URI, january_snapshot()),
        settings(&["USD"], 7),
    );
    let cache = h.cache.with_backfill(true);

    cache.refresh_at(at(2024, 1, 10, 0)).await.unwrap();

    let window = h.source.windows()[0].unwrap();
    assert_eq!(window.start, date(2024, 1, 3));
    assert_eq!(window.end, date(2024, 1, 10));
}

#[tokio::test]
async fn chart_data_is_filtered_and_oldest_first() {
    let snapshot = vec![
        feed("20240102", "USD", "US Dollar", dec!(41.2)),
        feed("20240102", "EUR", "Euro", dec!(45.2)),
        feed("20240101", "USD", "US Dollar", dec!(41.1)),
        feed("20240101", "EUR", "Euro", dec!(45.1)),
    ];
    let h = harness(
        ScriptedSource::with_feed(SOURCE_URI, snapshot),
        settings(&["USD", "0"], 1),
    );

    let chart = h.cache.chart_data_at("Rates", at(2024, 1, 2, 12)).await.unwrap();

    assert_eq!(chart.labels, vec![date(2024, 1, 1), date(2024, 1, 2)]);
    assert_eq!(chart.series.keys().collect::<Vec<_>>(), vec!["USD"]);
    let rates: Vec<_> = chart.series["USD"].iter().map(|p| p.rate).collect();
    assert_eq!(rates, vec![dec!(41.1), dec!(41.2)]);
}

#[tokio::test]
async fn lists_currencies_offered_by_source() {
    let h = harness(
        ScriptedSource::with_feed(SOURCE_URI, january_snapshot()),
        settings(&[], 0),
    );

    let list = h.cache.list_available_currencies(None).await.unwrap();
    assert_eq!(list.get("USD").map(String::as_str), Some("US Dollar"));
    assert_eq!(list.get("EUR").map(String::as_str), Some("Euro"));

    let elsewhere = h
        .cache
        .list_available_currencies(Some("https://other.example"))
        .await
        .unwrap();
    assert!(elsewhere.is_empty());
}

#[tokio::test]
async fn reconcile_reports_codes_no_longer_offered() {
    let h = harness(
        ScriptedSource::with_feed(
            SOURCE_URI,
            vec![feed("20240101", "USD", "US Dollar", dec!(100))],
        ),
        settings(&["USD", "GBP", "0"], 0),
    );

    let removed = h.cache.reconcile_selection().await.unwrap();
    assert_eq!(removed, BTreeSet::from(["GBP".to_string()]));
}

#[tokio::test]
async fn reconcile_against_unreachable_source_reports_nothing() {
    let h = harness(ScriptedSource::default(), settings(&["USD", "GBP"], 0));
    assert!(h.cache.reconcile_selection().await.unwrap().is_empty());
}

#[tokio::test]
async fn validate_source_reasons() {
    let source = ScriptedSource::with_feed(SOURCE_URI, january_snapshot());
    source.set_feed("https://empty.example", vec![]);
    source.set_feed(
        "https://broken.example",
        vec![FeedRecord {
            rate: None,
            ..feed("20240101", "USD", "US Dollar", dec!(0))
        }],
    );
    let h = harness(source, settings(&[], 0));

    let empty = h.cache.validate_source("   ").await;
    assert_eq!(empty.error, Some(SourceInvalid::Empty));
    assert_eq!(h.source.calls(), 0);

    let down = h.cache.validate_source("https://down.example").await;
    assert_eq!(down.error, Some(SourceInvalid::Unreachable));

    let not_found = h.cache.validate_source("https://empty.example").await;
    assert_eq!(not_found.error, Some(SourceInvalid::NotFound));

    let malformed = h.cache.validate_source("https://broken.example").await;
    assert_eq!(malformed.error, Some(SourceInvalid::Malformed));
    assert!(!malformed.is_valid);

    let ok = h.cache.validate_source(SOURCE_URI).await;
    assert!(ok.is_valid);
    assert_eq!(ok.error, None);
}

#[tokio::test]
async fn clear_all_drops_records_and_marker() {
    let h = harness(
        ScriptedSource::with_feed(SOURCE_URI, january_snapshot()),
        settings(&["USD"], 0),
    );
    h.cache.ensure_fresh_at(at(2024, 1, 1, 8)).await.unwrap();

    h.cache.clear_all().await.unwrap();

    assert!(h.rates.is_empty().unwrap());
    assert_eq!(h.state.last_refreshed_at().await.unwrap(), None);
}

#[tokio::test]
async fn marker_inside_the_window_skips_the_fetch() {
    let source = Arc::new(ScriptedSource::with_feed(SOURCE_URI, january_snapshot()));
    let last = at(2024, 1, 1, 8);
    let cache = RateCache::new(
        source.clone(),
        Arc::new(MemoryRateStore::new()),
        Arc::new(MemoryRefreshStateStore::with_last_refreshed(last)),
        Arc::new(MemorySettingsStore::new(Some(settings(&["USD"], 0)))),
    );

    assert!(cache.ensure_fresh_at(last + Duration::hours(2)).await.unwrap().is_none());
    assert_eq!(source.calls(), 0);

    assert!(cache.ensure_fresh_at(last + Duration::hours(5)).await.unwrap().is_some());
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn chart_caps_an_oversized_saved_range() {
    let h = harness(
        ScriptedSource::with_feed(SOURCE_URI, january_snapshot()),
        settings(&["USD"], u32::MAX),
    );

    let chart = h.cache.chart_data_at("Rates", at(2024, 1, 1, 12)).await.unwrap();

    assert_eq!(chart.labels, vec![date(2024, 1, 1)]);
    assert_eq!(chart.series["USD"].len(), 1);
}
