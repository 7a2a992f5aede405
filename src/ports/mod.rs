//! Port traits the cache talks through.

pub mod bucket_port;
pub mod catalog_port;
pub mod config_port;
pub mod source_port;
