//! mysql-kit
//!
//! A thin convenience layer over the sqlx MySQL driver: builds connection
//! strings, issues parameterized INSERT / UPDATE / SELECT / EXISTS statements
//! from loosely-typed documents, and maps result rows into ordered records.

pub mod client;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod models;

pub use client::Client;
pub use config::{ClientOptions, Dsn};
pub use context::Ctx;
pub use db::RowCursor;
pub use error::{DbError, DbResult};
pub use models::{ColumnMetadata, Doc, Document, ExecResult, Record, Value};
