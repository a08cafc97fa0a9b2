//! Dynamically-typed values and records.
//!
//! Every path through the crate (documents going in, rows coming out)
//! normalizes into the closed [`Value`] set. A [`Record`] is an ordered list
//! of named values; order is whatever the producer supplied, which keeps the
//! generated SQL text reproducible.

use crate::error::{DbError, DbResult};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;

/// A scalar value bound to or decoded from a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    /// Integers are widened to i64
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Bool(bool),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this value for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Bool(_) => "bool",
        }
    }

    /// Convert a JSON value into a scalar.
    ///
    /// Arrays and objects have no scalar form; they are stored as their JSON
    /// text so they can target MySQL `JSON` columns.
    pub fn from_json(value: JsonValue) -> DbResult<Self> {
        match value {
            JsonValue::Null => Ok(Self::Null),
            JsonValue::Bool(b) => Ok(Self::Bool(b)),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Int(i))
                } else if n.is_u64() {
                    Err(DbError::decode(format!(
                        "integer {} does not fit in a signed 64-bit value",
                        n
                    )))
                } else {
                    n.as_f64()
                        .map(Self::Float)
                        .ok_or_else(|| DbError::decode(format!("unrepresentable number: {}", n)))
                }
            }
            JsonValue::String(s) => Ok(Self::String(s)),
            nested @ (JsonValue::Array(_) | JsonValue::Object(_)) => {
                Ok(Self::String(nested.to_string()))
            }
        }
    }

    /// Parse a command-line argument: JSON scalars are taken literally,
    /// anything else is a plain string.
    pub fn parse_arg(arg: &str) -> Self {
        match serde_json::from_str::<JsonValue>(arg) {
            Ok(json @ (JsonValue::Null | JsonValue::Bool(_) | JsonValue::Number(_))) => {
                Self::from_json(json).unwrap_or_else(|_| Self::String(arg.to_string()))
            }
            Ok(JsonValue::String(s)) => Self::String(s),
            _ => Self::String(arg.to_string()),
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Self::Int(v as i64)
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Binary data serializes as base64, matching how results are printed.
impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use base64::{Engine as _, engine::general_purpose::STANDARD};

        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Int(v) => serializer.serialize_i64(*v),
            Self::Float(v) => serializer.serialize_f64(*v),
            Self::String(v) => serializer.serialize_str(v),
            Self::Bytes(v) => serializer.serialize_str(&STANDARD.encode(v)),
            Self::Bool(v) => serializer.serialize_bool(*v),
        }
    }
}

/// An ordered mapping from field name to [`Value`].
///
/// Keys are case-sensitive. Inserting an existing key replaces its value in
/// place, so the original position is kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Insert a field, returning the previous value for that key if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.fields.push((key, value));
                None
            }
        }
    }

    /// Builder-style [`Record::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Decode a JSON object into a record, keeping its key order.
    pub fn from_json_object(map: serde_json::Map<String, JsonValue>) -> DbResult<Self> {
        let mut record = Self::with_capacity(map.len());
        for (key, value) in map {
            let value = Value::from_json(value)
                .map_err(|e| DbError::decode(format!("field '{}': {}", key, e)))?;
            record.insert(key, value);
        }
        Ok(record)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl Serialize for Record {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

// =============================================================================
// Documents
// =============================================================================

/// Semi-structured input that can be turned into a [`Record`].
pub trait Document {
    fn to_record(&self) -> DbResult<Record>;
}

impl Document for Record {
    fn to_record(&self) -> DbResult<Record> {
        Ok(self.clone())
    }
}

impl Document for JsonValue {
    fn to_record(&self) -> DbResult<Record> {
        match self {
            JsonValue::Object(map) => Record::from_json_object(map.clone()),
            other => Err(DbError::decode(format!(
                "expected a JSON object, got {}",
                json_kind(other)
            ))),
        }
    }
}

impl Document for serde_json::Map<String, JsonValue> {
    fn to_record(&self) -> DbResult<Record> {
        Record::from_json_object(self.clone())
    }
}

impl<D: Document + ?Sized> Document for &D {
    fn to_record(&self) -> DbResult<Record> {
        (**self).to_record()
    }
}

/// Wraps any `Serialize` value so it can be used as a document.
///
/// The value must serialize to a map or struct; field order follows its
/// serialization order.
#[derive(Debug, Clone, Copy)]
pub struct Doc<T>(pub T);

impl<T: Serialize> Document for Doc<T> {
    fn to_record(&self) -> DbResult<Record> {
        let json = serde_json::to_value(&self.0)
            .map_err(|e| DbError::decode(format!("failed to serialize document: {}", e)))?;
        json.to_record()
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}
