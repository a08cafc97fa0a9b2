//! Parameter binding utilities for database queries.
//!
//! Binds [`Value`]s to MySQL query objects in placeholder order.

use crate::models::Value;
use sqlx::MySql;
use sqlx::mysql::MySqlArguments;

pub(crate) type MySqlQuery<'q> = sqlx::query::Query<'q, MySql, MySqlArguments>;

/// Bind a value to a MySQL query.
pub(crate) fn bind_value<'q>(query: MySqlQuery<'q>, value: &'q Value) -> MySqlQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(*v),
        Value::Int(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::String(v) => query.bind(v.as_str()),
        Value::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Build a query for `sql` with every value bound in order.
pub(crate) fn bind_all<'q>(sql: &'q str, values: &'q [Value]) -> MySqlQuery<'q> {
    values
        .iter()
        .fold(sqlx::query(sql), |query, value| bind_value(query, value))
}
