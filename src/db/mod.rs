//! Database access layer.
//!
//! This module provides the pieces the client is assembled from:
//! - Statement building from documents
//! - Parameter binding
//! - Row decoding into records
//! - Connection pool construction and SOCKS5 tunnelling
//! - Statement execution and result cursors

pub mod builder;
pub mod cursor;
pub mod executor;
pub mod params;
pub mod pool;
pub mod proxy;
pub mod types;

pub use builder::{InsertStatement, UpdateStatement};
pub use cursor::RowCursor;
pub use pool::ConnectedPool;
pub use proxy::{ProxyTunnel, Socks5Proxy};
pub use types::{RowToRecord, TypeCategory};
