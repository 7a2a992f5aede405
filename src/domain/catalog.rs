//! Catalog records: one entry per bucket file, plus filters and summaries.

use crate::domain::series::SeriesKey;
use chrono::{DateTime, NaiveDate, Utc};
use std::path::PathBuf;

/// Metadata row describing one bucket file of a series.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub key: SeriesKey,
    pub file_path: PathBuf,
    pub min_timestamp: DateTime<Utc>,
    pub max_timestamp: DateTime<Utc>,
    pub row_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl CatalogEntry {
    /// Whether `[min_timestamp, max_timestamp]` intersects the half-open window `[start, end)`.
    pub fn intersects(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.min_timestamp < end && self.max_timestamp >= start
    }
}

/// Optional provider/symbol/timeframe filter. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogFilter {
    pub provider: Option<String>,
    pub symbol: Option<String>,
    pub timeframe: Option<String>,
}

impl CatalogFilter {
    pub fn for_key(key: &SeriesKey) -> Self {
        Self {
            provider: Some(key.provider.clone()),
            symbol: Some(key.symbol.clone()),
            timeframe: Some(key.timeframe.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.provider.is_none() && self.symbol.is_none() && self.timeframe.is_none()
    }
}

/// Per-series coverage statistics for operator tooling.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageSummary {
    pub key: SeriesKey,
    pub day_count: usize,
    pub first_day: Option<NaiveDate>,
    pub last_day: Option<NaiveDate>,
    pub total_rows: usize,
}
