//! Fetch orchestrator.
//!
//! Turns planned [`DayRange`]s into provider calls. Each range is fetched on
//! a worker thread bounded by the policy timeout, retried on provider
//! errors (never on timeouts), merged as soon as it arrives, and only then
//! marked complete.
//! One failing range never stops the others.

use crate::domain::bar::Bar;
use crate::domain::coverage::{settled_days, DayRange};
use crate::domain::error::CacheError;
use crate::domain::layout::StorageLayout;
use crate::domain::series::SeriesKey;
use crate::ports::catalog_port::Catalog;
use crate::ports::source_port::BarSource;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timeout and retry behaviour for provider calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
    /// Delay before the second attempt; grows linearly with each retry.
    pub retry_backoff: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Shared flag that stops a fill between ranges. It stays set until [`CancelToken::reset`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct RangeFailure {
    pub range: DayRange,
    pub error: CacheError,
}

/// Outcome of one fill, range by range.
#[derive(Debug, Default)]
pub struct FillReport {
    pub succeeded: Vec<DayRange>,
    /// Ranges the provider answered with no bars; left unmarked.
    pub empty: Vec<DayRange>,
    pub failed: Vec<RangeFailure>,
    pub rows_written: usize,
}

impl FillReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.empty.len() + self.failed.len()
    }
}

/// Catalog failures abort the fill; everything else is scoped to one range.
fn is_catalog_failure(err: &CacheError) -> bool {
    matches!(
        err,
        CacheError::Database { .. } | CacheError::DatabaseQuery { .. }
    )
}

pub struct FetchOrchestrator<'a> {
    layout: &'a StorageLayout,
    catalog: &'a dyn Catalog,
    policy: FetchPolicy,
    cancel: CancelToken,
}

impl<'a> FetchOrchestrator<'a> {
    pub fn new(
        layout: &'a StorageLayout,
        catalog: &'a dyn Catalog,
        policy: FetchPolicy,
        cancel: CancelToken,
    ) -> Self {
        Self {
            layout,
            catalog,
            policy,
            cancel,
        }
    }

    /// Fetches and stores every range. Without a client this is a no-op.
    pub fn fill(
        &self,
        key: &SeriesKey,
        ranges: &[DayRange],
        client: Option<Arc<dyn BarSource>>,
    ) -> Result<FillReport, CacheError> {
        let mut report = FillReport::default();
        let Some(client) = client else {
            if !ranges.is_empty() {
                debug!(series = %key, ranges = ranges.len(), "no provider client, serving local data only");
            }
            return Ok(report);
        };

        for (idx, range) in ranges.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(series = %key, remaining = ranges.len() - idx, "fill cancelled");
                report
                    .failed
                    .extend(ranges[idx..].iter().map(|r| RangeFailure {
                        range: *r,
                        error: CacheError::Cancelled,
                    }));
                break;
            }

            match self.fill_range(key, *range, &client) {
                Ok(0) => {
                    info!(series = %key, range = %range, "provider returned no bars");
                    report.empty.push(*range);
                }
                Ok(rows) => {
                    report.succeeded.push(*range);
                    report.rows_written += rows;
                }
                Err(e) if is_catalog_failure(&e) => return Err(e),
                Err(e) => {
                    warn!(series = %key, range = %range, error = %e, "range fill failed");
                    report.failed.push(RangeFailure {
                        range: *range,
                        error: e,
                    });
                }
            }
        }

        info!(
            series = %key,
            provider = client.name(),
            succeeded = report.succeeded.len(),
            empty = report.empty.len(),
            failed = report.failed.len(),
            rows = report.rows_written,
            "fill finished"
        );
        Ok(report)
    }

    fn fill_range(
        &self,
        key: &SeriesKey,
        range: DayRange,
        client: &Arc<dyn BarSource>,
    ) -> Result<usize, CacheError> {
        let start = range.start_instant();
        let end = range.end_instant();

        let fetched = self.fetch_with_retry(client, key, start, end)?;
        let total = fetched.len();
        let bars: Vec<Bar> = fetched
            .into_iter()
            .filter(|b| b.timestamp >= start && b.timestamp < end)
            .collect();
        if bars.len() < total {
            warn!(
                series = %key,
                range = %range,
                dropped = total - bars.len(),
                "provider returned bars outside the requested range"
            );
        }
        if bars.is_empty() {
            return Ok(0);
        }

        self.layout.merge(key, &bars)?;
        let settled = settled_days(&range.days(), Utc::now());
        self.catalog.mark_days_complete(key, &settled)?;

        debug!(series = %key, range = %range, rows = bars.len(), "range stored");
        Ok(bars.len())
    }

    fn fetch_with_retry(
        &self,
        client: &Arc<dyn BarSource>,
        key: &SeriesKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, CacheError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.fetch_once(client, key, start, end) {
                Ok(bars) => return Ok(bars),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    warn!(
                        series = %key,
                        attempt,
                        max_attempts,
                        error = %e,
                        "fetch failed, retrying"
                    );
                    thread::sleep(self.policy.retry_backoff * attempt);
                    if self.cancel.is_cancelled() {
                        return Err(CacheError::Cancelled);
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One provider call on its own thread. A call that outlives the timeout
    /// is abandoned; its result is discarded whenever it arrives.
    fn fetch_once(
        &self,
        client: &Arc<dyn BarSource>,
        key: &SeriesKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, CacheError> {
        let (tx, rx) = mpsc::channel();
        let worker = Arc::clone(client);
        let symbol = key.symbol.clone();
        let timeframe = key.timeframe;

        thread::Builder::new()
            .name(format!("fetch-{}", client.name()))
            .spawn(move || {
                let _ = tx.send(worker.fetch(&symbol, timeframe, start, end));
            })?;

        match rx.recv_timeout(self.policy.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(CacheError::Timeout {
                provider: client.name().to_string(),
                secs: self.policy.timeout.as_secs(),
            }),
            Err(RecvTimeoutError::Disconnected) => Err(CacheError::Provider {
                provider: client.name().to_string(),
                reason: "fetch worker exited without a result".into(),
            }),
        }
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::adapters::csv_bucket::CsvBucketStore;
    use crate::adapters::sqlite_catalog::SqliteCatalog;
    use crate::domain::bar::OhlcPolicy;
    use crate::domain::series::Timeframe;
    use chrono::{Duration as ChronoDuration, NaiveDate};
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    /// One daily bar per day in the window.
    struct DailySource {
        calls: AtomicUsize,
    }

    impl BarSource for DailySource {
        fn name(&self) -> &str {
            "daily"
        }

        fn fetch(
            &self,
            _symbol: &str,
            _timeframe: Timeframe,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<Bar>, CacheError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut bars = Vec::new();
            let mut ts = start;
            while ts < end {
                bars.push(Bar {
                    timestamp: ts,
                    open: 1.0,
                    high: 2.0,
                    low: 0.5,
                    close: 1.5,
                    volume: 100.0,
                });
                ts += ChronoDuration::days(1);
            }
            // one stray bar past the window
            bars.push(Bar {
                timestamp: end + ChronoDuration::days(3),
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 1.0,
            });
            Ok(bars)
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, d).unwrap()
    }

    fn fixture(dir: &TempDir) -> (StorageLayout, Arc<SqliteCatalog>) {
        let catalog = Arc::new(SqliteCatalog::in_memory().unwrap());
        let layout = StorageLayout::new(
            dir.path(),
            catalog.clone(),
            Arc::new(CsvBucketStore::new()),
            OhlcPolicy::Trust,
        );
        (layout, catalog)
    }

    #[test]
    fn fills_ranges_and_drops_stray_bars() {
        let dir = TempDir::new().unwrap();
        let (layout, catalog) = fixture(&dir);
        let key = SeriesKey::parse("test", "AAPL", "1d").unwrap();
        let source = Arc::new(DailySource {
            calls: AtomicUsize::new(0),
        });
        let orchestrator =
            FetchOrchestrator::new(&layout, &*catalog, FetchPolicy::default(), CancelToken::new());

        let ranges = vec![DayRange::new(day(1), day(3)), DayRange::single(day(10))];
        let report = orchestrator
            .fill(&key, &ranges, Some(source.clone()))
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.succeeded, ranges);
        assert_eq!(report.rows_written, 4);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(catalog.complete_days(&key, day(1), day(31)).unwrap().len(), 4);
    }

    #[test]
    fn no_client_is_noop() {
        let dir = TempDir::new().unwrap();
        let (layout, catalog) = fixture(&dir);
        let key = SeriesKey::parse("test", "AAPL", "1d").unwrap();
        let orchestrator =
            FetchOrchestrator::new(&layout, &*catalog, FetchPolicy::default(), CancelToken::new());

        let report = orchestrator
            .fill(&key, &[DayRange::single(day(1))], None)
            .unwrap();
        assert_eq!(report.attempted(), 0);
        assert!(report.is_complete());
    }

    #[test]
    fn cancelled_token_fails_all_ranges() {
        let dir = TempDir::new().unwrap();
        let (layout, catalog) = fixture(&dir);
        let key = SeriesKey::parse("test", "AAPL", "1d").unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let orchestrator = FetchOrchestrator::new(&layout, &*catalog, FetchPolicy::default(), cancel);
        let source = Arc::new(DailySource {
            calls: AtomicUsize::new(0),
        });

        let ranges = vec![DayRange::single(day(1)), DayRange::single(day(5))];
        let report = orchestrator.fill(&key, &ranges, Some(source.clone())).unwrap();

        assert_eq!(report.failed.len(), 2);
        assert!(matches!(report.failed[0].error, CacheError::Cancelled));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
        other.reset();
        assert!(!token.is_cancelled());
    }
}
