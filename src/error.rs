//! Error types for mysql-kit.
//!
//! This module defines all error types using `thiserror`. Errors are returned
//! once to the immediate caller; nothing in the crate retries.

use crate::models::Record;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Connection failed: {message}")]
    Connect { message: String, suggestion: String },

    #[error("Refusing to {operation} without a WHERE clause")]
    EmptyWhereClause { operation: String },

    #[error("Decode error: {message}")]
    Decode {
        message: String,
        /// Columns decoded before the failure, when decoding a result row
        partial: Option<Record>,
    },

    #[error("Scan error: {message}")]
    Scan { message: String },

    #[error("Execution failed: {message}")]
    Exec {
        message: String,
        /// e.g., "42S02" for unknown table
        sql_state: Option<String>,
    },

    #[error("Client is closed")]
    ClientClosed,

    #[error("Timeout: {operation} exceeded its deadline")]
    Timeout { operation: String },

    #[error("Cancelled: {operation}")]
    Cancelled { operation: String },
}

impl DbError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connect(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an empty WHERE clause error for the named operation.
    pub fn empty_where(operation: impl Into<String>) -> Self {
        Self::EmptyWhereClause {
            operation: operation.into(),
        }
    }

    /// Create a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
            partial: None,
        }
    }

    /// Create a decode error that carries the partially decoded row.
    pub fn decode_partial(message: impl Into<String>, partial: Record) -> Self {
        Self::Decode {
            message: message.into(),
            partial: Some(partial),
        }
    }

    /// Create a scan error.
    pub fn scan(message: impl Into<String>) -> Self {
        Self::Scan {
            message: message.into(),
        }
    }

    /// Create an execution error with optional SQL state.
    pub fn exec(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Exec {
            message: message.into(),
            sql_state,
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a cancellation error.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connect { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Get the SQL state reported by the server, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Exec { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }

    /// Get the columns decoded before a row decode failure.
    pub fn partial_record(&self) -> Option<&Record> {
        match self {
            Self::Decode { partial, .. } => partial.as_ref(),
            _ => None,
        }
    }
}

/// Convert sqlx errors to DbError.
///
/// Connection-time failures are mapped to [`DbError::Connect`] where the pool
/// is built; here everything the server rejects is an execution failure.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::config(msg.to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::exec(db_err.message(), code)
            }
            sqlx::Error::PoolClosed => DbError::ClientClosed,
            sqlx::Error::PoolTimedOut => DbError::timeout("connection pool acquire"),
            sqlx::Error::TypeNotFound { type_name } => {
                DbError::scan(format!("Type not found: {}", type_name))
            }
            sqlx::Error::ColumnNotFound(col) => DbError::scan(format!("Column not found: {}", col)),
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::scan(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::scan(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::scan(format!("Decode error: {}", source)),
            sqlx::Error::Io(io_err) => DbError::exec(format!("I/O error: {}", io_err), None),
            sqlx::Error::Tls(tls_err) => DbError::exec(format!("TLS error: {}", tls_err), None),
            sqlx::Error::Protocol(msg) => DbError::exec(format!("Protocol error: {}", msg), None),
            other => DbError::exec(format!("Unknown database error: {}", other), None),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connect("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));

        let err = DbError::empty_where("update");
        assert_eq!(err.to_string(), "Refusing to update without a WHERE clause");
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::connect("refused", "Check that the server is running");
        assert_eq!(err.suggestion(), Some("Check that the server is running"));
        assert_eq!(DbError::ClientClosed.suggestion(), None);
    }

    #[test]
    fn test_error_sql_state() {
        let err = DbError::exec("Table 'x' doesn't exist", Some("42S02".to_string()));
        assert_eq!(err.sql_state(), Some("42S02"));
        assert_eq!(DbError::scan("bad").sql_state(), None);
    }

    #[test]
    fn test_decode_partial_record() {
        let partial = Record::new().with("id", 1);
        let err = DbError::decode_partial("overflow in 'big'", partial.clone());
        assert_eq!(err.partial_record(), Some(&partial));
        assert!(DbError::decode("plain").partial_record().is_none());
    }

    #[test]
    fn test_sqlx_pool_closed_maps_to_client_closed() {
        let err: DbError = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, DbError::ClientClosed));
    }

    #[test]
    fn test_sqlx_column_errors_map_to_scan() {
        let err: DbError = sqlx::Error::ColumnIndexOutOfBounds { index: 3, len: 2 }.into();
        assert!(matches!(err, DbError::Scan { .. }));
        assert!(err.to_string().contains("out of bounds"));
    }
}
