//! Day-granularity coverage planning.
//!
//! A requested window is discretised into whole UTC calendar days and
//! compared against the days the catalog already marks complete. Missing
//! days are grouped into maximal runs so each run costs one provider call.

use crate::domain::error::CacheError;
use crate::domain::series::SeriesKey;
use crate::ports::catalog_port::Catalog;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use std::collections::BTreeSet;
use std::fmt;

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DayRange {
    pub first: NaiveDate,
    pub last: NaiveDate,
}

impl DayRange {
    pub fn new(first: NaiveDate, last: NaiveDate) -> Self {
        Self { first, last }
    }

    pub fn single(day: NaiveDate) -> Self {
        Self::new(day, day)
    }

    /// `first` at 00:00 UTC.
    pub fn start_instant(&self) -> DateTime<Utc> {
        day_start(self.first)
    }

    /// The day after `last` at 00:00 UTC (exclusive bound).
    pub fn end_instant(&self) -> DateTime<Utc> {
        day_start(self.last) + Duration::days(1)
    }

    pub fn len_days(&self) -> usize {
        ((self.last - self.first).num_days() + 1).max(0) as usize
    }

    pub fn days(&self) -> Vec<NaiveDate> {
        days_in_window(self.first, self.last)
    }
}

impl fmt::Display for DayRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.first, self.last)
    }
}

pub fn day_start(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

/// Every day in `[first, last]`; empty when `first > last`.
pub fn days_in_window(first: NaiveDate, last: NaiveDate) -> Vec<NaiveDate> {
    first.iter_days().take_while(|d| *d <= last).collect()
}

/// Requested days that are not covered, ascending.
pub fn missing_days(requested: &[NaiveDate], covered: &BTreeSet<NaiveDate>) -> Vec<NaiveDate> {
    let mut missing: Vec<NaiveDate> = requested
        .iter()
        .filter(|d| !covered.contains(d))
        .copied()
        .collect();
    missing.sort();
    missing.dedup();
    missing
}

/// Groups days into maximal runs of consecutive days.
pub fn group_consecutive(days: &[NaiveDate]) -> Vec<DayRange> {
    let mut sorted = days.to_vec();
    sorted.sort();
    sorted.dedup();

    let mut ranges = Vec::new();
    let mut iter = sorted.into_iter();
    let Some(first) = iter.next() else {
        return ranges;
    };

    let mut current = DayRange::single(first);
    for day in iter {
        if current.last.succ_opt() == Some(day) {
            current.last = day;
        } else {
            ranges.push(current);
            current = DayRange::single(day);
        }
    }
    ranges.push(current);
    ranges
}

/// Drops days that have not ended yet at `now`; a day in progress may still gain bars.
pub fn settled_days(days: &[NaiveDate], now: DateTime<Utc>) -> Vec<NaiveDate> {
    days.iter()
        .filter(|d| day_start(**d) + Duration::days(1) <= now)
        .copied()
        .collect()
}

/// Computes the ranges that must be fetched for a request.
pub struct CoveragePlanner<'a> {
    catalog: &'a dyn Catalog,
}

impl<'a> CoveragePlanner<'a> {
    pub fn new(catalog: &'a dyn Catalog) -> Self {
        Self { catalog }
    }

    pub fn missing_ranges(
        &self,
        key: &SeriesKey,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<Vec<DayRange>, CacheError> {
        let requested = days_in_window(first, last);
        if requested.is_empty() {
            return Ok(Vec::new());
        }

        let covered = self.catalog.complete_days(key, first, last)?;
        let missing = missing_days(&requested, &covered);
        Ok(group_consecutive(&missing))
    }
}
