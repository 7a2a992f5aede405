#![allow(dead_code)]

use barcache::adapters::csv_bucket::CsvBucketStore;
use barcache::adapters::sqlite_catalog::SqliteCatalog;
use barcache::domain::bar::Bar;
use barcache::domain::cache::BarCache;
use barcache::domain::error::CacheError;
use barcache::domain::orchestrator::FetchPolicy;
use barcache::domain::series::{SeriesKey, Timeframe};
use barcache::domain::settings::CacheSettings;
use barcache::ports::source_port::BarSource;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use tempfile::TempDir;

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

pub fn make_bar(timestamp: DateTime<Utc>, close: f64) -> Bar {
    Bar {
        timestamp,
        open: close - 0.5,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 1_000.0,
    }
}

/// One bar at midnight for every day in `first..=last`, closes counting up from 100.
pub fn daily_bars(first: NaiveDate, last: NaiveDate) -> Vec<Bar> {
    first
        .iter_days()
        .take_while(|d| *d <= last)
        .enumerate()
        .map(|(i, d)| make_bar(d.and_hms_opt(0, 0, 0).unwrap().and_utc(), 100.0 + i as f64))
        .collect()
}

/// `count` consecutive minute bars starting at `from`.
pub fn minute_bars(from: DateTime<Utc>, count: i64) -> Vec<Bar> {
    (0..count)
        .map(|i| make_bar(from + Duration::minutes(i), 10.0 + i as f64))
        .collect()
}

pub fn daily_key(symbol: &str) -> SeriesKey {
    SeriesKey::parse("mock", symbol, "1d").unwrap()
}

/// Retries and timeouts short enough for tests.
pub fn fast_policy() -> FetchPolicy {
    FetchPolicy {
        timeout: std::time::Duration::from_secs(5),
        max_attempts: 3,
        retry_backoff: std::time::Duration::from_millis(5),
    }
}

pub struct TestCache {
    pub dir: TempDir,
    pub catalog: Arc<SqliteCatalog>,
    pub cache: BarCache,
}

pub fn test_cache() -> TestCache {
    test_cache_with(fast_policy())
}

pub fn test_cache_with(policy: FetchPolicy) -> TestCache {
    let dir = TempDir::new().unwrap();
    let catalog = Arc::new(SqliteCatalog::in_memory().unwrap());
    let mut settings = CacheSettings::new(dir.path().join("bars"));
    settings.fetch = policy;
    let cache = BarCache::new(catalog.clone(), Arc::new(CsvBucketStore::new()), settings);
    TestCache {
        dir,
        catalog,
        cache,
    }
}

/// Provider double serving a fixed set of bars, with scripted failures.
pub struct MockSource {
    name: String,
    bars: Vec<Bar>,
    failing_days: Vec<NaiveDate>,
    transient_failures: AtomicUsize,
    delay: Option<std::time::Duration>,
    calls: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
}

impl MockSource {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self {
            name: "mock".to_string(),
            bars,
            failing_days: Vec::new(),
            transient_failures: AtomicUsize::new(0),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every request whose window contains `day` fails.
    pub fn failing_on(mut self, day: NaiveDate) -> Self {
        self.failing_days.push(day);
        self
    }

    /// The first `n` requests fail, later ones succeed.
    pub fn failing_first(self, n: usize) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn into_client(self) -> (Arc<Self>, Option<Arc<dyn BarSource>>) {
        let source = Arc::new(self);
        let client: Arc<dyn BarSource> = source.clone();
        (source, Some(client))
    }

    fn error(&self, reason: &str) -> CacheError {
        CacheError::Provider {
            provider: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

impl BarSource for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(
        &self,
        _symbol: &str,
        _timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, CacheError> {
        self.calls.lock().unwrap().push((start, end));
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }

        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(self.error("503 service unavailable"));
        }

        let hits_failing_day = self.failing_days.iter().any(|d| {
            let ts = d.and_hms_opt(0, 0, 0).unwrap().and_utc();
            ts >= start && ts < end
        });
        if hits_failing_day {
            return Err(self.error("upstream rejected the request"));
        }

        Ok(self
            .bars
            .iter()
            .filter(|b| b.timestamp >= start && b.timestamp < end)
            .cloned()
            .collect())
    }
}
