//! The cache façade.
//!
//! [`BarCache`] wires the catalog, the bucket store, the storage layout, the
//! coverage planner, the fetch orchestrator and the query engine together.
//! `get` is the primary entry point:
//!
//! ```text
//! catalog -> coverage planner -> fetch orchestrator -> layout merge
//!         -> catalog update -> query engine -> caller
//! ```

use crate::domain::bar::Bar;
use crate::domain::catalog::{CatalogEntry, CatalogFilter, CoverageSummary};
use crate::domain::coverage::{day_start, settled_days, CoveragePlanner, DayRange};
use crate::domain::error::CacheError;
use crate::domain::layout::StorageLayout;
use crate::domain::orchestrator::{CancelToken, FetchOrchestrator, FillReport};
use crate::domain::query::QueryEngine;
use crate::domain::series::SeriesKey;
use crate::domain::settings::CacheSettings;
use crate::ports::bucket_port::BucketStore;
use crate::ports::catalog_port::Catalog;
use crate::ports::source_port::BarSource;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Bars served for a request plus what the fill did to get them.
#[derive(Debug, Default)]
pub struct CacheResponse {
    pub bars: Vec<Bar>,
    pub report: FillReport,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClearReport {
    pub entries_removed: usize,
    pub files_removed: Vec<PathBuf>,
}

pub struct BarCache {
    catalog: Arc<dyn Catalog>,
    store: Arc<dyn BucketStore>,
    layout: StorageLayout,
    settings: CacheSettings,
    cancel: CancelToken,
}

/// `[first 00:00, (last + 1) 00:00)`
fn day_window(first: NaiveDate, last: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    (day_start(first), day_start(last) + Duration::days(1))
}

impl BarCache {
    pub fn new(catalog: Arc<dyn Catalog>, store: Arc<dyn BucketStore>, settings: CacheSettings) -> Self {
        let layout = StorageLayout::new(
            settings.base_dir.clone(),
            Arc::clone(&catalog),
            Arc::clone(&store),
            settings.ohlc_policy,
        );
        Self {
            catalog,
            store,
            layout,
            settings,
            cancel: CancelToken::new(),
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Token that stops fills between ranges.
    ///
    /// Cancellation is sticky: once cancelled, every later `get` reports its
    /// missing ranges as [`CacheError::Cancelled`] without calling the
    /// provider, until [`CancelToken::reset`] is called. Local reads keep working.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Serves bars for the inclusive days `first..=last`, fetching missing
    /// days from `client` first when one is given.
    ///
    /// Provider failures never fail the call; they are reported in
    /// [`CacheResponse::report`] and the bars that are available locally are
    /// returned.
    pub fn get(
        &self,
        key: &SeriesKey,
        first: NaiveDate,
        last: NaiveDate,
        client: Option<Arc<dyn BarSource>>,
    ) -> Result<CacheResponse, CacheError> {
        if first > last {
            return Ok(CacheResponse::default());
        }

        let missing = self.missing_ranges(key, first, last)?;
        let report = if missing.is_empty() {
            debug!(series = %key, %first, %last, "fully cached");
            FillReport::default()
        } else {
            let orchestrator = FetchOrchestrator::new(
                &self.layout,
                self.catalog.as_ref(),
                self.settings.fetch.clone(),
                self.cancel.clone(),
            );
            orchestrator.fill(key, &missing, client)?
        };

        let (start, end) = day_window(first, last);
        let bars = self.read(key, start, end)?;
        Ok(CacheResponse { bars, report })
    }

    pub fn missing_ranges(
        &self,
        key: &SeriesKey,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<Vec<DayRange>, CacheError> {
        CoveragePlanner::new(self.catalog.as_ref()).missing_ranges(key, first, last)
    }

    /// Merges bars obtained outside of a fill. Settled days that carry at
    /// least one of the bars are marked complete.
    pub fn ingest(&self, key: &SeriesKey, bars: &[Bar]) -> Result<Vec<CatalogEntry>, CacheError> {
        let entries = self.layout.merge(key, bars)?;

        let mut days: Vec<NaiveDate> = bars.iter().map(Bar::day).collect();
        days.sort();
        days.dedup();
        let settled = settled_days(&days, Utc::now());
        self.catalog.mark_days_complete(key, &settled)?;

        info!(series = %key, rows = bars.len(), buckets = entries.len(), "bars ingested");
        Ok(entries)
    }

    /// Local-only read of `start <= timestamp < end`.
    pub fn read(
        &self,
        key: &SeriesKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, CacheError> {
        QueryEngine::new(self.catalog.as_ref(), self.store.as_ref()).read(key, start, end)
    }

    /// Whether any stored file overlaps the days at all. Says nothing about
    /// completeness; use [`BarCache::missing_ranges`] for that.
    pub fn has_data(&self, key: &SeriesKey, first: NaiveDate, last: NaiveDate) -> Result<bool, CacheError> {
        if first > last {
            return Ok(false);
        }
        let (start, end) = day_window(first, last);
        self.catalog.has_any_overlap(key, start, end)
    }

    pub fn coverage_summary(&self, filter: &CatalogFilter) -> Result<Vec<CoverageSummary>, CacheError> {
        self.catalog.coverage_summary(filter)
    }

    /// Removes catalog entries, day coverage and bucket files matching
    /// `filter`. An empty filter clears everything.
    pub fn clear(&self, filter: &CatalogFilter) -> Result<ClearReport, CacheError> {
        let removed = self.catalog.clear(filter)?;

        let mut report = ClearReport {
            entries_removed: removed.len(),
            files_removed: Vec::with_capacity(removed.len()),
        };
        for entry in removed {
            self.store.remove(&entry.file_path)?;
            report.files_removed.push(entry.file_path);
        }

        info!(
            provider = filter.provider.as_deref().unwrap_or("*"),
            symbol = filter.symbol.as_deref().unwrap_or("*"),
            timeframe = filter.timeframe.as_deref().unwrap_or("*"),
            files = report.files_removed.len(),
            "cache cleared"
        );
        Ok(report)
    }
}
