//! Data models for mysql-kit.
//!
//! This module re-exports all model types used throughout the crate.

pub mod query;
pub mod value;

// Re-export commonly used types
pub use query::{ColumnMetadata, ExecResult};
pub use value::{Doc, Document, Record, Value};
