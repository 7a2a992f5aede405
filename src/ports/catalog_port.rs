//! Catalog port: durable metadata about bucket files and day coverage.
//!
//! Implementations never hold raw bars; every method is answerable from
//! metadata alone.

use crate::domain::catalog::{CatalogEntry, CatalogFilter, CoverageSummary};
use crate::domain::error::CacheError;
use crate::domain::series::SeriesKey;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeSet;
use std::path::Path;

pub trait Catalog: Send + Sync {
    /// Inserts or replaces the entry for `(entry.key, entry.file_path)`.
    fn upsert(&self, entry: &CatalogEntry) -> Result<(), CacheError>;

    fn entry(&self, key: &SeriesKey, file_path: &Path) -> Result<Option<CatalogEntry>, CacheError>;

    /// Entries whose `[min, max]` bounds intersect `[start, end)`, ordered by `min_timestamp`.
    fn files_covering(
        &self,
        key: &SeriesKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CatalogEntry>, CacheError>;

    /// Loose existence check: is there any file overlapping `[start, end)`?
    fn has_any_overlap(
        &self,
        key: &SeriesKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<bool, CacheError>;

    fn mark_days_complete(&self, key: &SeriesKey, days: &[NaiveDate]) -> Result<(), CacheError>;

    /// Days in `[first, last]` already marked complete.
    fn complete_days(
        &self,
        key: &SeriesKey,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<BTreeSet<NaiveDate>, CacheError>;

    fn coverage_summary(&self, filter: &CatalogFilter) -> Result<Vec<CoverageSummary>, CacheError>;

    /// Removes matching entries and day coverage; returns the removed entries.
    fn clear(&self, filter: &CatalogFilter) -> Result<Vec<CatalogEntry>, CacheError>;
}
