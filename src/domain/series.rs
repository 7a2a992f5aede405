//! Series identity, timeframes and the file layout policy.
//!
//! A [`SeriesKey`] partitions everything the cache stores: catalog rows,
//! day coverage and bucket files. The [`LayoutPolicy`] of its timeframe
//! decides whether a series lives in one file or in one file per year.

use crate::domain::error::CacheError;
use chrono::{DateTime, Datelike, Utc};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

/// Timeframe granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeframeUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

/// A bar interval: amount x unit (5m, 4h, 1d, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timeframe {
    amount: NonZeroU32,
    unit: TimeframeUnit,
}

impl Timeframe {
    pub const fn new(amount: NonZeroU32, unit: TimeframeUnit) -> Self {
        Self { amount, unit }
    }

    pub const fn amount(&self) -> NonZeroU32 {
        self.amount
    }

    pub const fn unit(&self) -> TimeframeUnit {
        self.unit
    }

    pub fn layout(&self) -> LayoutPolicy {
        match self.unit {
            TimeframeUnit::Minute => LayoutPolicy::HighFrequency,
            _ => LayoutPolicy::LowFrequency,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            TimeframeUnit::Minute => "m",
            TimeframeUnit::Hour => "h",
            TimeframeUnit::Day => "d",
            TimeframeUnit::Week => "w",
            TimeframeUnit::Month => "M",
        };
        write!(f, "{}{unit}", self.amount)
    }
}

impl FromStr for Timeframe {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| CacheError::InvalidTimeframe {
            value: s.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| invalid("missing unit"))?;
        let (digits, unit) = trimmed.split_at(split);
        if digits.is_empty() {
            return Err(invalid("missing amount"));
        }

        let amount: u32 = digits.parse().map_err(|_| invalid("amount out of range"))?;
        let amount = NonZeroU32::new(amount).ok_or_else(|| invalid("amount must be > 0"))?;
        let unit = match unit {
            "m" | "min" => TimeframeUnit::Minute,
            "h" | "H" => TimeframeUnit::Hour,
            "d" | "D" => TimeframeUnit::Day,
            "w" | "W" => TimeframeUnit::Week,
            "M" | "mo" => TimeframeUnit::Month,
            _ => return Err(invalid("unknown unit")),
        };
        Ok(Timeframe::new(amount, unit))
    }
}

/// Static classification of timeframes into file layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutPolicy {
    /// Intraday data: one file per calendar year keeps merge cost bounded.
    HighFrequency,
    /// Hourly and coarser: one file per series.
    LowFrequency,
}

/// Physical file-grouping unit of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bucket {
    Year(i32),
    Whole,
}

impl Bucket {
    pub fn for_timestamp(policy: LayoutPolicy, ts: DateTime<Utc>) -> Self {
        match policy {
            LayoutPolicy::HighFrequency => Bucket::Year(ts.year()),
            LayoutPolicy::LowFrequency => Bucket::Whole,
        }
    }
}

/// Identity of one logical series: provider + symbol + timeframe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    pub provider: String,
    pub symbol: String,
    pub timeframe: Timeframe,
}

impl SeriesKey {
    pub fn new(provider: impl Into<String>, symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            provider: provider.into(),
            symbol: symbol.into(),
            timeframe,
        }
    }

    /// Convenience constructor parsing the timeframe.
    pub fn parse(provider: &str, symbol: &str, timeframe: &str) -> Result<Self, CacheError> {
        Ok(Self::new(provider, symbol, timeframe.parse()?))
    }

    pub fn layout(&self) -> LayoutPolicy {
        self.timeframe.layout()
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.provider, self.symbol, self.timeframe)
    }
}

/// Makes a provider or symbol safe to use as a single path component.
pub fn path_component(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect()
}
