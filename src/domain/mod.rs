//! Core domain types and logic.

pub mod bar;
pub mod cache;
pub mod catalog;
pub mod coverage;
pub mod error;
pub mod layout;
pub mod merge;
pub mod orchestrator;
pub mod query;
pub mod series;
pub mod settings;
