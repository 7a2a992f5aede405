//! Concrete adapter implementations for ports.

pub mod csv_bucket;
pub mod csv_source;
pub mod file_config_adapter;
#[cfg(feature = "sqlite")]
pub mod sqlite_catalog;
