#![cfg(feature = "sqlite")]
//! Property tests for cache invariants.
//!
//! Uses proptest to verify:
//! 1. Gap completeness: planned ranges cover exactly the uncovered days
//! 2. Grouping: planned ranges are sorted, disjoint and maximal
//! 3. Query exactness: a read returns exactly the stored bars in the window
//! 4. Merge: output is sorted, unique, and incoming values win

mod common;

use barcache::adapters::sqlite_catalog::SqliteCatalog;
use barcache::domain::coverage::{days_in_window, CoveragePlanner};
use barcache::domain::merge::merge_bars;
use barcache::domain::series::SeriesKey;
use barcache::ports::catalog_port::Catalog;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use common::*;
use proptest::prelude::*;
use std::collections::BTreeSet;

const WINDOW_DAYS: u32 = 60;

fn window_start() -> NaiveDate {
    day(2020, 1, 1)
}

// ── 1 & 2. Coverage planning ─────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn missing_ranges_cover_exactly_the_uncovered_days(
        covered in prop::collection::btree_set(0..WINDOW_DAYS, 0..40),
    ) {
        let catalog = SqliteCatalog::in_memory().unwrap();
        let key = daily_key("PROP");
        let first = window_start();
        let last = first + Duration::days(i64::from(WINDOW_DAYS) - 1);

        let covered_days: Vec<NaiveDate> = covered
            .iter()
            .map(|o| first + Duration::days(i64::from(*o)))
            .collect();
        catalog.mark_days_complete(&key, &covered_days).unwrap();

        let ranges = CoveragePlanner::new(&catalog)
            .missing_ranges(&key, first, last)
            .unwrap();

        let mut planned = BTreeSet::new();
        for range in &ranges {
            prop_assert!(range.first <= range.last);
            for d in range.days() {
                // no day is planned twice
                prop_assert!(planned.insert(d));
            }
        }
        let expected: BTreeSet<NaiveDate> = days_in_window(first, last)
            .into_iter()
            .filter(|d| !covered_days.contains(d))
            .collect();
        prop_assert_eq!(planned, expected);

        for pair in ranges.windows(2) {
            // a covered day separates neighbouring ranges
            prop_assert!(pair[0].last.succ_opt().unwrap() < pair[1].first);
        }
    }
}

// ── 3. Query exactness ───────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn read_returns_exactly_the_window(
        offsets in prop::collection::btree_set(0i64..3_000, 1..80),
        from in 0i64..3_000,
        len in 0i64..3_000,
    ) {
        let t = test_cache();
        let key = SeriesKey::parse("mock", "PROP", "1m").unwrap();
        // straddles a year boundary so two bucket files are involved
        let base = Utc.with_ymd_and_hms(2023, 12, 31, 23, 0, 0).unwrap();

        let bars: Vec<_> = offsets
            .iter()
            .map(|o| make_bar(base + Duration::minutes(*o), 1.0 + *o as f64))
            .collect();
        t.cache.ingest(&key, &bars).unwrap();

        let start = base + Duration::minutes(from);
        let end = start + Duration::minutes(len);
        let got: Vec<_> = t
            .cache
            .read(&key, start, end)
            .unwrap()
            .into_iter()
            .map(|b| b.timestamp)
            .collect();
        let expected: Vec<_> = bars
            .iter()
            .map(|b| b.timestamp)
            .filter(|ts| *ts >= start && *ts < end)
            .collect();

        prop_assert_eq!(got, expected);
    }
}

// ── 4. Merge ─────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn merge_is_sorted_unique_and_keeps_incoming(
        existing in prop::collection::vec(0i64..200, 0..60),
        incoming in prop::collection::vec(0i64..200, 0..60),
    ) {
        let base = at(2022, 1, 1);
        let existing: Vec<_> = existing
            .iter()
            .map(|o| make_bar(base + Duration::hours(*o), 1.0))
            .collect();
        let incoming: Vec<_> = incoming
            .iter()
            .map(|o| make_bar(base + Duration::hours(*o), 2.0))
            .collect();

        let merged = merge_bars(existing.clone(), &incoming);

        prop_assert!(merged.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        let incoming_ts: BTreeSet<_> = incoming.iter().map(|b| b.timestamp).collect();
        let all_ts: BTreeSet<_> = existing
            .iter()
            .chain(incoming.iter())
            .map(|b| b.timestamp)
            .collect();
        prop_assert_eq!(merged.len(), all_ts.len());
        for bar in &merged {
            if incoming_ts.contains(&bar.timestamp) {
                prop_assert_eq!(bar.close, 2.0);
            }
        }
    }
}
