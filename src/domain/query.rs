//! Query engine: answers range reads from local bucket files only.

use crate::domain::bar::Bar;
use crate::domain::error::CacheError;
use crate::domain::series::SeriesKey;
use crate::ports::bucket_port::BucketStore;
use crate::ports::catalog_port::Catalog;
use chrono::{DateTime, Utc};
use tracing::debug;

pub struct QueryEngine<'a> {
    catalog: &'a dyn Catalog,
    store: &'a dyn BucketStore,
}

impl<'a> QueryEngine<'a> {
    pub fn new(catalog: &'a dyn Catalog, store: &'a dyn BucketStore) -> Self {
        Self { catalog, store }
    }

    /// Bars with `start <= timestamp < end`, ascending and unique.
    ///
    /// A catalog entry whose file has disappeared is reported as
    /// [`CacheError::MissingFile`] rather than silently skipped.
    pub fn read(
        &self,
        key: &SeriesKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, CacheError> {
        if start >= end {
            return Ok(Vec::new());
        }

        let entries = self.catalog.files_covering(key, start, end)?;
        let mut bars = Vec::new();
        for entry in &entries {
            let rows = self.store.read(&entry.file_path)?;
            bars.extend(
                rows.into_iter()
                    .filter(|b| b.timestamp >= start && b.timestamp < end),
            );
        }

        bars.sort_by_key(|b| b.timestamp);
        bars.dedup_by_key(|b| b.timestamp);

        debug!(series = %key, files = entries.len(), rows = bars.len(), "query served");
        Ok(bars)
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::adapters::csv_bucket::CsvBucketStore;
    use crate::adapters::sqlite_catalog::SqliteCatalog;
    use crate::domain::bar::OhlcPolicy;
    use crate::domain::layout::StorageLayout;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn minute_bars(from: DateTime<Utc>, count: i64) -> Vec<Bar> {
        (0..count)
            .map(|i| Bar {
                timestamp: from + Duration::minutes(i),
                open: 1.0,
                high: 2.0,
                low: 0.5,
                close: 1.5,
                volume: i as f64,
            })
            .collect()
    }

    #[test]
    fn read_spans_year_buckets_with_half_open_window() {
        let dir = TempDir::new().unwrap();
        let catalog = Arc::new(SqliteCatalog::in_memory().unwrap());
        let store = Arc::new(CsvBucketStore::new());
        let layout = StorageLayout::new(dir.path(), catalog.clone(), store.clone(), OhlcPolicy::Trust);
        let key = SeriesKey::parse("binance", "ETHUSDT", "1m").unwrap();

        let from = Utc.with_ymd_and_hms(2023, 12, 31, 23, 55, 0).unwrap();
        layout.merge(&key, &minute_bars(from, 10)).unwrap();

        let engine = QueryEngine::new(&*catalog, &*store);
        let start = from + Duration::minutes(2);
        let end = from + Duration::minutes(7);
        let bars = engine.read(&key, start, end).unwrap();

        assert_eq!(bars.len(), 5);
        assert_eq!(bars.first().unwrap().timestamp, start);
        assert_eq!(bars.last().unwrap().timestamp, end - Duration::minutes(1));
        assert!(bars.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn empty_cache_and_inverted_window() {
        let catalog = SqliteCatalog::in_memory().unwrap();
        let store = CsvBucketStore::new();
        let engine = QueryEngine::new(&catalog, &store);
        let key = SeriesKey::parse("yahoo", "AAPL", "1d").unwrap();
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        assert!(engine.read(&key, t, t + Duration::days(5)).unwrap().is_empty());
        assert!(engine.read(&key, t + Duration::days(5), t).unwrap().is_empty());
    }
}
