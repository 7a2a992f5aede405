//! OHLCV bar representation and batch validation.

use crate::domain::error::CacheError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One OHLCV observation anchored at `timestamp` (UTC).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Calendar day (UTC) the bar belongs to.
    pub fn day(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    /// Rejects missing (NaN), infinite or negative fields.
    pub fn validate(&self) -> Result<(), CacheError> {
        let fields = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ];
        for (name, value) in fields {
            if value.is_nan() {
                return Err(self.invalid(format!("missing {name}")));
            }
            if !value.is_finite() || value < 0.0 {
                return Err(self.invalid(format!("{name} must be a non-negative number, got {value}")));
            }
        }
        Ok(())
    }

    /// high >= max(open, close, low) and low <= min(open, close, high)
    pub fn is_consistent(&self) -> bool {
        self.high >= self.open.max(self.close).max(self.low)
            && self.low <= self.open.min(self.close).min(self.high)
    }

    fn invalid(&self, reason: String) -> CacheError {
        CacheError::Validation {
            reason: format!("bar at {}: {reason}", self.timestamp.to_rfc3339()),
        }
    }
}

/// What to do with bars whose OHLC values contradict each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OhlcPolicy {
    /// Persist provider bars as delivered.
    #[default]
    Trust,
    /// Reject the batch if any bar breaks the high/low envelope.
    Reject,
}

impl FromStr for OhlcPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trust" => Ok(OhlcPolicy::Trust),
            "reject" => Ok(OhlcPolicy::Reject),
            other => Err(format!("expected 'trust' or 'reject', got '{other}'")),
        }
    }
}

/// Checks every bar before any of them is written; the first failure wins.
pub fn validate_batch(bars: &[Bar], policy: OhlcPolicy) -> Result<(), CacheError> {
    for bar in bars {
        bar.validate()?;
        if policy == OhlcPolicy::Reject && !bar.is_consistent() {
            return Err(bar.invalid(format!(
                "inconsistent OHLC (o={} h={} l={} c={})",
                bar.open, bar.high, bar.low, bar.close
            )));
        }
    }
    Ok(())
}
