//! INSERT / UPDATE statement assembly.
//!
//! Documents are decoded into [`Record`]s and flattened into statement text
//! with positional `?` placeholders plus an argument list aligned with them.
//! Nothing here touches the database; a failed build sends nothing.

use crate::error::{DbError, DbResult};
use crate::models::{Document, Record, Value};

/// Column list, placeholder groups and bound values for an INSERT.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    /// Empty for positional-row inserts
    pub columns: Vec<String>,
    /// One `(?, ...)` group per inserted row
    pub groups: Vec<String>,
    pub args: Vec<Value>,
}

impl InsertStatement {
    /// Render the full statement for `table`.
    pub fn to_sql(&self, table: &str, ignore: bool) -> String {
        let mut sql = String::with_capacity(64 + self.args.len() * 3);

        sql.push_str(if ignore {
            "INSERT IGNORE INTO "
        } else {
            "INSERT INTO "
        });
        sql.push_str(table);

        if !self.columns.is_empty() {
            sql.push_str(" (");
            sql.push_str(&self.columns.join(", "));
            sql.push(')');
        }

        sql.push_str(" VALUES ");
        sql.push_str(&self.groups.join(", "));
        sql
    }

    /// Total number of placeholders across all groups.
    pub fn placeholder_count(&self) -> usize {
        self.groups.iter().map(|g| g.matches('?').count()).sum()
    }
}

/// SET clause and bound values for an UPDATE.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub set_clause: String,
    /// SET values followed by the WHERE arguments
    pub args: Vec<Value>,
}

impl UpdateStatement {
    /// Render the full statement for `table`.
    pub fn to_sql(&self, table: &str, where_clause: &str) -> String {
        format!(
            "UPDATE {} SET {} WHERE {}",
            table, self.set_clause, where_clause
        )
    }
}

/// Build an INSERT from one or more documents.
///
/// The column list is the union of keys across all documents in first-seen
/// order; a document missing a column contributes NULL for it.
pub fn build_insert<D: Document>(documents: &[D]) -> DbResult<InsertStatement> {
    if documents.is_empty() {
        return Err(DbError::decode("no documents to insert"));
    }

    let records = documents
        .iter()
        .map(Document::to_record)
        .collect::<DbResult<Vec<Record>>>()?;

    let mut columns: Vec<String> = Vec::new();
    for record in &records {
        for key in record.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.to_string());
            }
        }
    }

    if columns.is_empty() {
        return Err(DbError::decode("documents have no fields to insert"));
    }

    let group = placeholder_group(columns.len());
    let mut groups = Vec::with_capacity(records.len());
    let mut args = Vec::with_capacity(records.len() * columns.len());

    for record in &records {
        for column in &columns {
            args.push(record.get(column).cloned().unwrap_or(Value::Null));
        }
        groups.push(group.clone());
    }

    Ok(InsertStatement {
        columns,
        groups,
        args,
    })
}

/// Build a column-less INSERT from positional rows.
///
/// Each row gets a group sized to its own length; matching the table's
/// column count is the caller's job.
pub fn build_insert_from_rows(rows: &[Vec<Value>]) -> DbResult<InsertStatement> {
    if rows.is_empty() {
        return Err(DbError::decode("no rows to insert"));
    }

    let mut groups = Vec::with_capacity(rows.len());
    let mut args = Vec::with_capacity(rows.iter().map(Vec::len).sum());

    for row in rows {
        groups.push(placeholder_group(row.len()));
        args.extend(row.iter().cloned());
    }

    Ok(InsertStatement {
        columns: Vec::new(),
        groups,
        args,
    })
}

/// Build an UPDATE's SET clause from a document.
///
/// A blank `where_clause` is rejected so a forgotten filter can never turn
/// into a full-table update.
pub fn build_update<D: Document + ?Sized>(
    document: &D,
    where_clause: &str,
    where_args: &[Value],
) -> DbResult<UpdateStatement> {
    ensure_where(where_clause, "update")?;

    let record = document.to_record()?;
    if record.is_empty() {
        return Err(DbError::decode("document has no fields to update"));
    }

    let mut set_clause = String::new();
    let mut args = Vec::with_capacity(record.len() + where_args.len());
    for (i, (key, value)) in record.into_iter().enumerate() {
        if i > 0 {
            set_clause.push_str(", ");
        }
        set_clause.push_str(&key);
        set_clause.push_str("=?");
        args.push(value);
    }
    args.extend(where_args.iter().cloned());

    Ok(UpdateStatement { set_clause, args })
}

/// Render the existence probe for `table`.
pub fn exists_sql(table: &str, where_clause: &str) -> String {
    format!("SELECT 1 FROM {} WHERE {} LIMIT 1", table, where_clause)
}

/// Reject a blank WHERE clause for `operation`.
pub fn ensure_where(where_clause: &str, operation: &str) -> DbResult<()> {
    if where_clause.trim().is_empty() {
        return Err(DbError::empty_where(operation));
    }
    Ok(())
}

fn placeholder_group(n: usize) -> String {
    let mut group = String::with_capacity(2 + n * 3);
    group.push('(');
    for i in 0..n {
        if i > 0 {
            group.push_str(", ");
        }
        group.push('?');
    }
    group.push(')');
    group
}
