//! Dynamic row decoding.
//!
//! This module maps MySQL rows into [`Record`]s using the declared type of
//! each column.
//!
//! # Architecture
//!
//! Decoding uses a two-phase approach:
//! 1. `TypeCategory` classifies the declared type name into the value kind it
//!    decodes to
//! 2. Per-category decoders read the column and resolve it into a [`Value`]
//!
//! Reading a column can fail at the driver (a scan error, the row is
//! unusable) or while resolving an already-read value (a decode error, the
//! columns read so far are kept on the error).

use crate::error::{DbError, DbResult};
use crate::models::{ColumnMetadata, Record, Value};
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::mysql::types::MySqlTime;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::{Column, Decode, Row, Type, TypeInfo};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for a declared column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    /// Decodes to [`Value::Int`]
    Integer,
    /// Decodes to [`Value::String`]
    Text,
    /// Decodes to [`Value::Bytes`]
    Binary,
    /// DATE, TIME, YEAR, DATETIME, TIMESTAMP; decodes to [`Value::String`]
    Temporal,
    /// DECIMAL, FLOAT, DOUBLE; decodes to [`Value::Float`]
    Float,
    /// Decodes to [`Value::Bool`]
    Boolean,
    /// No rule matched; decoded from the raw column representation
    Native,
}

/// Classify a declared type name. First matching rule wins.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let name = normalize_type_name(type_name);

    if name.starts_with("INT") || name.ends_with("INT") {
        return TypeCategory::Integer;
    }

    if name.ends_with("CHAR") || name.ends_with("TEXT") {
        return TypeCategory::Text;
    }

    if name.ends_with("BLOB") {
        return TypeCategory::Binary;
    }

    match name.as_str() {
        "DATE" | "TIME" | "YEAR" | "DATETIME" | "TIMESTAMP" => TypeCategory::Temporal,
        "DECIMAL" | "FLOAT" | "DOUBLE" => TypeCategory::Float,
        "BOOL" | "BOOLEAN" => TypeCategory::Boolean,
        _ => TypeCategory::Native,
    }
}

/// Upper-case a declared type and drop display width and sign qualifiers,
/// e.g. `bigint(20) unsigned` becomes `BIGINT`.
pub fn normalize_type_name(type_name: &str) -> String {
    let upper = type_name.trim().to_uppercase();
    let base = match upper.find('(') {
        Some(open) => {
            let close = upper[open..].find(')').map(|c| open + c + 1);
            let tail = close.map(|c| &upper[c..]).unwrap_or("");
            format!("{}{}", &upper[..open], tail)
        }
        None => upper,
    };

    base.split_whitespace()
        .filter(|word| *word != "UNSIGNED" && *word != "ZEROFILL" && *word != "SIGNED")
        .collect::<Vec<_>>()
        .join(" ")
}

/// Log each column whose declared type has no decoding rule.
pub fn log_unsupported_columns(columns: &[ColumnMetadata]) {
    for col in columns {
        if categorize_type(&col.type_name) == TypeCategory::Native {
            tracing::debug!(
                column = %col.name,
                type_name = %col.type_name,
                "Unsupported column type, decoding raw driver value"
            );
        }
    }
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL values as strings.
/// This preserves the exact database representation until it is resolved.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl RawDecimal {
    fn resolve(&self) -> Result<f64, String> {
        self.0
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid DECIMAL '{}': {}", self.0, e))
    }
}

// =============================================================================
// Row to Record Trait
// =============================================================================

/// Trait for converting database rows to records.
pub trait RowToRecord {
    /// Decode the row against previously captured column metadata.
    fn to_record(&self, columns: &[ColumnMetadata]) -> DbResult<Record>;
}

impl RowToRecord for MySqlRow {
    fn to_record(&self, columns: &[ColumnMetadata]) -> DbResult<Record> {
        decode_row(self, columns)
    }
}

/// Capture name and declared type for a set of driver columns.
pub fn column_metadata<C: Column>(columns: &[C]) -> Vec<ColumnMetadata> {
    columns
        .iter()
        .map(|col| ColumnMetadata::new(col.name(), col.type_info().name()))
        .collect()
}

/// Decode one row into a record keyed by column name.
pub fn decode_row(row: &MySqlRow, columns: &[ColumnMetadata]) -> DbResult<Record> {
    if row.len() != columns.len() {
        return Err(DbError::scan(format!(
            "row has {} columns, expected {}",
            row.len(),
            columns.len()
        )));
    }

    let mut record = Record::with_capacity(columns.len());
    for (idx, col) in columns.iter().enumerate() {
        let category = categorize_type(&col.type_name);
        match decode_column(row, idx, &col.type_name, category) {
            Ok(value) => {
                record.insert(col.name.clone(), value);
            }
            Err(ColumnError::Scan(err)) => return Err(err),
            Err(ColumnError::Resolve(message)) => {
                return Err(DbError::decode_partial(
                    format!("column '{}': {}", col.name, message),
                    record,
                ));
            }
        }
    }
    Ok(record)
}

// =============================================================================
// Column Decoders
// =============================================================================

enum ColumnError {
    /// The driver could not read the column
    Scan(DbError),
    /// The column was read but has no representation in [`Value`]
    Resolve(String),
}

impl From<sqlx::Error> for ColumnError {
    fn from(err: sqlx::Error) -> Self {
        ColumnError::Scan(DbError::from(err))
    }
}

type ColumnResult = Result<Value, ColumnError>;

fn decode_column(
    row: &MySqlRow,
    idx: usize,
    type_name: &str,
    category: TypeCategory,
) -> ColumnResult {
    match category {
        TypeCategory::Integer => decode_integer(row, idx),
        TypeCategory::Text => decode_text(row, idx),
        TypeCategory::Binary => decode_binary(row, idx),
        TypeCategory::Temporal => decode_temporal(row, idx, type_name),
        TypeCategory::Float => decode_float(row, idx),
        TypeCategory::Boolean => decode_boolean(row, idx),
        TypeCategory::Native => decode_native(row, idx, type_name),
    }
}

fn decode_integer(row: &MySqlRow, idx: usize) -> ColumnResult {
    let signed = match row.try_get::<Option<i64>, _>(idx) {
        Ok(v) => return Ok(v.map(Value::Int).unwrap_or(Value::Null)),
        Err(e) => e,
    };

    // Unsigned columns are not compatible with i64
    match row.try_get::<Option<u64>, _>(idx) {
        Ok(None) => Ok(Value::Null),
        Ok(Some(v)) => i64::try_from(v)
            .map(Value::Int)
            .map_err(|_| ColumnError::Resolve(format!("{} overflows a signed 64-bit integer", v))),
        Err(_) => Err(signed.into()),
    }
}

fn decode_text(row: &MySqlRow, idx: usize) -> ColumnResult {
    let value = row.try_get::<Option<String>, _>(idx)?;
    Ok(value.map(Value::String).unwrap_or(Value::Null))
}

fn decode_binary(row: &MySqlRow, idx: usize) -> ColumnResult {
    let value = row.try_get::<Option<Vec<u8>>, _>(idx)?;
    Ok(value.map(Value::Bytes).unwrap_or(Value::Null))
}

fn decode_boolean(row: &MySqlRow, idx: usize) -> ColumnResult {
    let value = row.try_get::<Option<bool>, _>(idx)?;
    Ok(value.map(Value::Bool).unwrap_or(Value::Null))
}

fn decode_float(row: &MySqlRow, idx: usize) -> ColumnResult {
    let err = match row.try_get::<Option<f64>, _>(idx) {
        Ok(v) => return Ok(v.map(Value::Float).unwrap_or(Value::Null)),
        Err(e) => e,
    };
    if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
        return Ok(v.map(|f| Value::Float(f as f64)).unwrap_or(Value::Null));
    }
    match row.try_get::<Option<RawDecimal>, _>(idx) {
        Ok(None) => Ok(Value::Null),
        Ok(Some(raw)) => raw.resolve().map(Value::Float).map_err(ColumnError::Resolve),
        Err(_) => Err(err.into()),
    }
}

/// Temporal columns come back as text in MySQL's own formats.
fn decode_temporal(row: &MySqlRow, idx: usize, type_name: &str) -> ColumnResult {
    let kind = normalize_type_name(type_name);
    let decoded = match kind.as_str() {
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(idx)
            .map(|v| v.map(|d| d.format("%Y-%m-%d").to_string())),
        // TIME is a signed interval of up to 838 hours, not a time of day
        "TIME" => {
            return Ok(row
                .try_get::<Option<MySqlTime>, _>(idx)?
                .map(|t| Value::String(format_time(&t.to_string())))
                .unwrap_or(Value::Null));
        }
        "YEAR" => row
            .try_get_unchecked::<Option<u16>, _>(idx)
            .map(|v| v.map(|y| y.to_string())),
        _ => row
            .try_get::<Option<NaiveDateTime>, _>(idx)
            .map(|v| v.map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.f").to_string())),
    };

    let text = match decoded {
        Ok(text) => text,
        Err(err) => {
            let raw = row.try_get_unchecked::<Option<Vec<u8>>, _>(idx)?;
            match raw.and_then(|bytes| zero_temporal(&bytes, &kind)) {
                Some(zero) => Some(zero),
                None => return Err(err.into()),
            }
        }
    };
    Ok(text.map(Value::String).unwrap_or(Value::Null))
}

/// Pad the hour field to two digits, e.g. `-1:00:00` becomes `-01:00:00`.
fn format_time(text: &str) -> String {
    let (sign, rest) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text),
    };
    match rest.find(':') {
        Some(1) => format!("{}0{}", sign, rest),
        _ => text.to_string(),
    }
}

/// Render a zero date (`0000-00-00`), which chrono cannot represent.
///
/// The binary protocol sends it as an empty payload (a lone length byte),
/// the text protocol as the literal string.
fn zero_temporal(raw: &[u8], kind: &str) -> Option<String> {
    let is_zero = raw.iter().all(|b| *b == 0) || raw.starts_with(b"0000-00-00");
    if !is_zero {
        return None;
    }
    Some(match kind {
        "DATE" => "0000-00-00".to_string(),
        _ => "0000-00-00 00:00:00".to_string(),
    })
}

/// Fallback for types without a rule: the raw column bytes. Binary string
/// and BIT types stay bytes; anything else becomes text when it is valid
/// UTF-8.
fn decode_native(row: &MySqlRow, idx: usize, type_name: &str) -> ColumnResult {
    let value = row.try_get_unchecked::<Option<Vec<u8>>, _>(idx)?;
    Ok(match value {
        None => Value::Null,
        Some(bytes) if is_raw_binary(type_name) => Value::Bytes(bytes),
        Some(bytes) => match String::from_utf8(bytes) {
            Ok(s) => Value::String(s),
            Err(e) => Value::Bytes(e.into_bytes()),
        },
    })
}

fn is_raw_binary(type_name: &str) -> bool {
    let name = normalize_type_name(type_name);
    name == "BIT" || name.contains("BINARY")
}
