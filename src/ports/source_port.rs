//! Provider client port.
//!
//! Each remote market-data provider implements [`BarSource`]; the cache
//! only ever sees this one capability.

use crate::domain::bar::Bar;
use crate::domain::error::CacheError;
use crate::domain::series::Timeframe;
use chrono::{DateTime, Utc};

pub trait BarSource: Send + Sync {
    /// Provider name used in logs and errors.
    fn name(&self) -> &str;

    /// Bars with `start <= timestamp < end`, in any order.
    fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, CacheError>;
}
