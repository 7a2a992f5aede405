//! Cache settings built from the `[cache]` and `[fetch]` config sections.
//!
//! Catalog connection settings (`[catalog]`) are read by the catalog
//! adapter itself.

use crate::domain::bar::OhlcPolicy;
use crate::domain::error::CacheError;
use crate::domain::orchestrator::FetchPolicy;
use crate::ports::config_port::ConfigPort;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    pub base_dir: PathBuf,
    pub ohlc_policy: OhlcPolicy,
    pub fetch: FetchPolicy,
}

impl CacheSettings {
    /// Defaults for everything but the storage root.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ohlc_policy: OhlcPolicy::default(),
            fetch: FetchPolicy::default(),
        }
    }

    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, CacheError> {
        let base_dir = config.require_string("cache", "base_dir")?;

        let ohlc_policy = match config.get_string("cache", "ohlc_policy") {
            Some(raw) => raw.parse::<OhlcPolicy>().map_err(|reason| CacheError::ConfigInvalid {
                section: "cache".into(),
                key: "ohlc_policy".into(),
                reason,
            })?,
            None => OhlcPolicy::default(),
        };

        let defaults = FetchPolicy::default();
        let timeout_secs = positive_int(config, "timeout_secs", defaults.timeout.as_secs() as i64)?;
        let max_attempts = positive_int(config, "max_attempts", i64::from(defaults.max_attempts))?;
        let backoff_ms = fetch_int(config, "retry_backoff_ms", defaults.retry_backoff.as_millis() as i64)?;
        if backoff_ms < 0 {
            return Err(invalid_fetch("retry_backoff_ms", "retry_backoff_ms must be non-negative"));
        }
        let max_attempts = u32::try_from(max_attempts)
            .map_err(|_| invalid_fetch("max_attempts", "max_attempts is too large"))?;

        Ok(Self {
            base_dir: PathBuf::from(base_dir),
            ohlc_policy,
            fetch: FetchPolicy {
                timeout: Duration::from_secs(timeout_secs as u64),
                max_attempts,
                retry_backoff: Duration::from_millis(backoff_ms as u64),
            },
        })
    }
}

fn invalid_fetch(key: &str, reason: &str) -> CacheError {
    CacheError::ConfigInvalid {
        section: "fetch".to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn fetch_int(config: &dyn ConfigPort, key: &str, default: i64) -> Result<i64, CacheError> {
    match config.get_string("fetch", key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| invalid_fetch(key, &format!("{key} must be an integer, got '{raw}'"))),
    }
}

fn positive_int(config: &dyn ConfigPort, key: &str, default: i64) -> Result<i64, CacheError> {
    let value = fetch_int(config, key, default)?;
    if value < 1 {
        return Err(invalid_fetch(key, &format!("{key} must be at least 1")));
    }
    Ok(value)
}
