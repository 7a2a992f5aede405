//! Storage layout manager.
//!
//! Maps a series to its bucket files and merges new bars into them:
//!
//! ```text
//! <base>/<provider>/<symbol>/<timeframe>/<year>.csv     high-frequency
//! <base>/<provider>/<symbol>/<timeframe>/<symbol>.csv   low-frequency
//! ```
//!
//! Every bucket rewrite is followed by a catalog upsert carrying the bounds
//! recomputed from the rows actually written.

use crate::domain::bar::{validate_batch, Bar, OhlcPolicy};
use crate::domain::catalog::CatalogEntry;
use crate::domain::error::CacheError;
use crate::domain::merge::{bounds, merge_bars};
use crate::domain::series::{path_component, Bucket, SeriesKey};
use crate::ports::bucket_port::BucketStore;
use crate::ports::catalog_port::Catalog;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

pub struct StorageLayout {
    base_dir: PathBuf,
    catalog: Arc<dyn Catalog>,
    store: Arc<dyn BucketStore>,
    ohlc_policy: OhlcPolicy,
    locks: Mutex<HashMap<SeriesKey, Arc<Mutex<()>>>>,
}

impl StorageLayout {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        catalog: Arc<dyn Catalog>,
        store: Arc<dyn BucketStore>,
        ohlc_policy: OhlcPolicy,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            catalog,
            store,
            ohlc_policy,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn series_dir(&self, key: &SeriesKey) -> PathBuf {
        self.base_dir
            .join(path_component(&key.provider))
            .join(path_component(&key.symbol))
            .join(key.timeframe.to_string())
    }

    pub fn bucket_path(&self, key: &SeriesKey, bucket: Bucket) -> PathBuf {
        let file_name = match bucket {
            Bucket::Year(year) => format!("{year}.csv"),
            Bucket::Whole => format!("{}.csv", path_component(&key.symbol)),
        };
        self.series_dir(key).join(file_name)
    }

    fn key_lock(&self, key: &SeriesKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Drops the key's lock once no merge holds or waits on it, so the
    /// table only holds series with a merge in flight.
    fn release_key_lock(&self, key: &SeriesKey) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }

    /// Merges `bars` into the series' bucket files and returns the catalog
    /// entry of every bucket the batch touched.
    ///
    /// The whole batch is validated first; a single invalid bar means nothing
    /// is written. A bucket whose merged rows equal its current rows is left
    /// alone, file and catalog entry alike.
    pub fn merge(&self, key: &SeriesKey, bars: &[Bar]) -> Result<Vec<CatalogEntry>, CacheError> {
        if bars.is_empty() {
            return Ok(Vec::new());
        }
        validate_batch(bars, self.ohlc_policy)?;

        let policy = key.layout();
        let mut by_bucket: BTreeMap<Bucket, Vec<Bar>> = BTreeMap::new();
        for bar in bars {
            by_bucket
                .entry(Bucket::for_timestamp(policy, bar.timestamp))
                .or_default()
                .push(bar.clone());
        }

        let result = {
            let lock = self.key_lock(key);
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            by_bucket
                .into_iter()
                .map(|(bucket, incoming)| {
                    let path = self.bucket_path(key, bucket);
                    self.merge_bucket(key, &path, &incoming)
                })
                .collect::<Result<Vec<_>, _>>()
        };
        self.release_key_lock(key);
        result
    }

    fn merge_bucket(
        &self,
        key: &SeriesKey,
        path: &Path,
        incoming: &[Bar],
    ) -> Result<CatalogEntry, CacheError> {
        let existing = if self.store.exists(path) {
            self.store.read(path)?
        } else {
            Vec::new()
        };
        let merged = merge_bars(existing.clone(), incoming);

        if merged == existing {
            if let Some(entry) = self.catalog.entry(key, path)? {
                debug!(series = %key, path = %path.display(), "bucket unchanged");
                return Ok(entry);
            }
        } else {
            self.store.write_atomic(path, &merged)?;
        }

        let (min_timestamp, max_timestamp, row_count) =
            bounds(&merged).ok_or_else(|| CacheError::Storage {
                path: path.display().to_string(),
                reason: "merged bucket is empty".into(),
            })?;
        let entry = CatalogEntry {
            key: key.clone(),
            file_path: path.to_path_buf(),
            min_timestamp,
            max_timestamp,
            row_count,
            updated_at: Utc::now(),
        };
        self.catalog.upsert(&entry)?;
        // hand back what the catalog holds so a later unchanged merge returns the same entry
        let entry = self.catalog.entry(key, path)?.ok_or_else(|| CacheError::Storage {
            path: path.display().to_string(),
            reason: "catalog entry vanished after upsert".into(),
        })?;

        debug!(
            series = %key,
            path = %path.display(),
            incoming = incoming.len(),
            rows = row_count,
            "bucket merged"
        );
        Ok(entry)
    }
}
