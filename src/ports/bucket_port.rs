//! Bucket file port: reads and atomically replaces one bucket file.

use crate::domain::bar::Bar;
use crate::domain::error::CacheError;
use std::path::Path;

pub trait BucketStore: Send + Sync {
    /// All rows of the file in stored order. A missing file is [`CacheError::MissingFile`].
    fn read(&self, path: &Path) -> Result<Vec<Bar>, CacheError>;

    fn exists(&self, path: &Path) -> bool;

    /// Replaces the file so readers see either the old or the new content, never a mix.
    fn write_atomic(&self, path: &Path, bars: &[Bar]) -> Result<(), CacheError>;

    /// Deletes the file; deleting a file that is already gone is not an error.
    fn remove(&self, path: &Path) -> Result<(), CacheError>;
}
