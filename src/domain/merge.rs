//! Merge and dedup of bar slices.

use crate::domain::bar::Bar;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Concatenates `existing` and `incoming`, keeps the incoming bar when both
/// carry the same timestamp, and returns the result in ascending order.
pub fn merge_bars(existing: Vec<Bar>, incoming: &[Bar]) -> Vec<Bar> {
    let mut by_ts: BTreeMap<DateTime<Utc>, Bar> = BTreeMap::new();
    for bar in existing {
        by_ts.insert(bar.timestamp, bar);
    }
    for bar in incoming {
        by_ts.insert(bar.timestamp, bar.clone());
    }
    by_ts.into_values().collect()
}

/// (min timestamp, max timestamp, row count) of a slice; `None` when empty.
pub fn bounds(bars: &[Bar]) -> Option<(DateTime<Utc>, DateTime<Utc>, usize)> {
    let min = bars.iter().map(|b| b.timestamp).min()?;
    let max = bars.iter().map(|b| b.timestamp).max()?;
    Some((min, max, bars.len()))
}
