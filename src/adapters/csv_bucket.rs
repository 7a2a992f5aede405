//! CSV bucket file adapter.
//!
//! Files carry a `timestamp,open,high,low,close,volume` header with RFC 3339
//! UTC timestamps. Writes land in a temporary file next to the target and are
//! renamed into place, so a crash mid-write never exposes a partial bucket.

use crate::domain::bar::Bar;
use crate::domain::error::CacheError;
use crate::ports::bucket_port::BucketStore;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

#[derive(Debug, Default, Clone, Copy)]
pub struct CsvBucketStore;

impl CsvBucketStore {
    pub fn new() -> Self {
        Self
    }
}

fn storage_err(path: &Path, reason: impl ToString) -> CacheError {
    CacheError::Storage {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

impl BucketStore for CsvBucketStore {
    fn read(&self, path: &Path) -> Result<Vec<Bar>, CacheError> {
        if !path.exists() {
            return Err(CacheError::MissingFile {
                path: path.display().to_string(),
            });
        }

        let mut rdr = csv::Reader::from_path(path).map_err(|e| storage_err(path, e))?;
        let mut bars = Vec::new();
        for record in rdr.deserialize::<Bar>() {
            bars.push(record.map_err(|e| storage_err(path, format!("CSV parse error: {e}")))?);
        }
        Ok(bars)
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn write_atomic(&self, path: &Path, bars: &[Bar]) -> Result<(), CacheError> {
        let parent = path
            .parent()
            .ok_or_else(|| storage_err(path, "bucket path has no parent directory"))?;
        fs::create_dir_all(parent)?;

        let mut tmp = NamedTempFile::new_in(parent)?;
        {
            let mut wtr = csv::Writer::from_writer(tmp.as_file_mut());
            for bar in bars {
                wtr.serialize(bar).map_err(|e| storage_err(path, e))?;
            }
            wtr.flush()?;
        }
        tmp.as_file_mut().flush()?;
        tmp.as_file().sync_all()?;

        tmp.persist(path)
            .map_err(|e| storage_err(path, format!("atomic rename failed: {}", e.error)))?;
        debug!(path = %path.display(), rows = bars.len(), "bucket written");
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<(), CacheError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
