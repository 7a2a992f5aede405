//! Offline provider over CSV exports.
//!
//! Reads `<base_path>/<symbol>_<timeframe>.csv` with a
//! `timestamp,open,high,low,close,volume` header. Timestamps may be RFC 3339,
//! a bare `YYYY-MM-DD` date (midnight UTC) or Unix seconds. Blank cells are
//! passed through as NaN so batch validation rejects them.

use crate::domain::bar::Bar;
use crate::domain::error::CacheError;
use crate::domain::series::{path_component, Timeframe};
use crate::ports::source_port::BarSource;
use chrono::{DateTime, NaiveDate, Utc};
use std::fs;
use std::path::{Path, PathBuf};

pub struct CsvSource {
    name: String,
    base_path: PathBuf,
}

impl CsvSource {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            name: "csv".to_string(),
            base_path,
        }
    }

    /// Same reader, reported under a different provider name.
    pub fn named(name: impl Into<String>, base_path: PathBuf) -> Self {
        Self {
            name: name.into(),
            base_path,
        }
    }

    fn csv_path(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.base_path
            .join(format!("{}_{}.csv", path_component(symbol), timeframe))
    }

}

// Local files do not heal between attempts, so none of these are provider errors.
fn read_err(path: &Path, e: std::io::Error) -> CacheError {
    CacheError::Storage {
        path: path.display().to_string(),
        reason: format!("failed to read export: {e}"),
    }
}

fn row_err(path: &Path, reason: String) -> CacheError {
    CacheError::Validation {
        reason: format!("{}: {reason}", path.display()),
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(day) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return day.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    value
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

fn parse_field(record: &csv::StringRecord, idx: usize, name: &str) -> Result<f64, String> {
    let raw = record
        .get(idx)
        .ok_or_else(|| format!("missing {name} column"))?
        .trim();
    if raw.is_empty() {
        return Ok(f64::NAN);
    }
    raw.parse()
        .map_err(|e| format!("invalid {name} value '{raw}': {e}"))
}

impl BarSource for CsvSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, CacheError> {
        let path = self.csv_path(symbol, timeframe);
        let content = fs::read_to_string(&path)
            .map_err(|e| read_err(&path, e))?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for result in rdr.records() {
            let record = result.map_err(|e| row_err(&path, format!("CSV parse error: {e}")))?;

            let ts_str = record
                .get(0)
                .ok_or_else(|| row_err(&path, "missing timestamp column".into()))?;
            let timestamp = parse_timestamp(ts_str)
                .ok_or_else(|| row_err(&path, format!("invalid timestamp '{ts_str}'")))?;

            if timestamp < start || timestamp >= end {
                continue;
            }

            bars.push(Bar {
                timestamp,
                open: parse_field(&record, 1, "open").map_err(|e| row_err(&path, e))?,
                high: parse_field(&record, 2, "high").map_err(|e| row_err(&path, e))?,
                low: parse_field(&record, 3, "low").map_err(|e| row_err(&path, e))?,
                close: parse_field(&record, 4, "close").map_err(|e| row_err(&path, e))?,
                volume: parse_field(&record, 5, "volume").map_err(|e| row_err(&path, e))?,
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }
}
