//! Query-related data models.
//!
//! This module defines the column metadata captured for result sets and the
//! outcome of write statements.

use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use sqlx::mysql::MySqlQueryResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    /// Declared type as reported by the server (e.g., "BIGINT", "VARCHAR")
    pub type_name: String,
}

impl ColumnMetadata {
    /// Create new column metadata.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Outcome of a write statement.
///
/// Each figure is retrieved separately because not every statement produces
/// both; asking for a missing one is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExecResult {
    rows_affected: Option<u64>,
    last_insert_id: Option<u64>,
}

impl ExecResult {
    pub fn new(rows_affected: Option<u64>, last_insert_id: Option<u64>) -> Self {
        Self {
            rows_affected,
            last_insert_id,
        }
    }

    /// Number of rows changed by the statement.
    pub fn rows_affected(&self) -> DbResult<u64> {
        self.rows_affected
            .ok_or_else(|| DbError::exec("rows affected not reported by the statement", None))
    }

    /// AUTO_INCREMENT value generated by the statement.
    pub fn last_insert_id(&self) -> DbResult<u64> {
        self.last_insert_id.ok_or_else(|| {
            DbError::exec("statement did not generate an AUTO_INCREMENT value", None)
        })
    }
}

/// MySQL reports 0 when no AUTO_INCREMENT value was generated.
impl From<MySqlQueryResult> for ExecResult {
    fn from(result: MySqlQueryResult) -> Self {
        let id = result.last_insert_id();
        Self {
            rows_affected: Some(result.rows_affected()),
            last_insert_id: (id != 0).then_some(id),
        }
    }
}
