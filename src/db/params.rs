//! Parameter binding for statement values.
//!
//! This module binds [`Value`]s to database-specific query objects. Each
//! backend gets the closest native type; kinds a backend cannot carry fail
//! with `DbError::UnsupportedType` instead of being coerced silently.

use crate::error::{DbError, DbResult};
use crate::models::Value;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::{MySql, Postgres, Sqlite};

fn unsupported(value: &Value, backend: &str) -> DbError {
    DbError::unsupported_type(
        value.type_name(),
        format!("{} cannot bind this value as a parameter", backend),
    )
}

/// Bind a value to a MySQL query.
pub(crate) fn bind_mysql_value<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    value: &'q Value,
) -> DbResult<sqlx::query::Query<'q, MySql, MySqlArguments>> {
    Ok(match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(*v),
        Value::Int(v) => query.bind(*v),
        Value::Long(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::Double(v) => query.bind(*v),
        // MySQL converts string parameters to DECIMAL exactly
        Value::Decimal(v) => query.bind(v.as_str()),
        Value::Date(v) => query.bind(*v),
        Value::Timestamp(v) => query.bind(*v),
        Value::Text(v) => query.bind(v.as_str()),
        Value::Binary(v) => query.bind(v.as_slice()),
        Value::Array(_) => return Err(unsupported(value, "MySQL")),
    })
}

/// Bind a value to a PostgreSQL query.
///
/// Decimals bind as text; the statement builder casts their placeholder to
/// `numeric`.
pub(crate) fn bind_postgres_value<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    value: &'q Value,
) -> DbResult<sqlx::query::Query<'q, Postgres, PgArguments>> {
    Ok(match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(*v),
        Value::Int(v) => query.bind(*v),
        Value::Long(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::Double(v) => query.bind(*v),
        Value::Decimal(v) => query.bind(v.as_str()),
        Value::Date(v) => query.bind(*v),
        Value::Timestamp(v) => query.bind(*v),
        Value::Text(v) => query.bind(v.as_str()),
        Value::Binary(v) => query.bind(v.as_slice()),
        Value::Array(items) => bind_postgres_array(query, value, items)?,
    })
}

/// Homogeneous arrays of integers, floats, booleans or text.
fn bind_postgres_array<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    value: &Value,
    items: &[Value],
) -> DbResult<sqlx::query::Query<'q, Postgres, PgArguments>> {
    let Some(first) = items.first() else {
        return Err(DbError::unsupported_type(
            "array",
            "element type of an empty array cannot be inferred",
        ));
    };

    match first {
        Value::Int(_) | Value::Long(_) => {
            let ints = items
                .iter()
                .map(|v| match v {
                    Value::Int(i) => Ok(i64::from(*i)),
                    Value::Long(i) => Ok(*i),
                    _ => Err(mixed_array(value)),
                })
                .collect::<DbResult<Vec<i64>>>()?;
            Ok(query.bind(ints))
        }
        Value::Float(_) | Value::Double(_) => {
            let floats = items
                .iter()
                .map(|v| match v {
                    Value::Float(f) => Ok(f64::from(*f)),
                    Value::Double(f) => Ok(*f),
                    _ => Err(mixed_array(value)),
                })
                .collect::<DbResult<Vec<f64>>>()?;
            Ok(query.bind(floats))
        }
        Value::Bool(_) => {
            let bools = items
                .iter()
                .map(|v| match v {
                    Value::Bool(b) => Ok(*b),
                    _ => Err(mixed_array(value)),
                })
                .collect::<DbResult<Vec<bool>>>()?;
            Ok(query.bind(bools))
        }
        Value::Text(_) => {
            let texts = items
                .iter()
                .map(|v| match v {
                    Value::Text(s) => Ok(s.clone()),
                    _ => Err(mixed_array(value)),
                })
                .collect::<DbResult<Vec<String>>>()?;
            Ok(query.bind(texts))
        }
        _ => Err(unsupported(value, "PostgreSQL")),
    }
}

fn mixed_array(value: &Value) -> DbError {
    DbError::unsupported_type(value.type_name(), "array elements must share one type")
}

/// Bind a value to a SQLite query.
pub(crate) fn bind_sqlite_value<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q Value,
) -> DbResult<sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>> {
    Ok(match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(*v),
        Value::Int(v) => query.bind(*v),
        Value::Long(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::Double(v) => query.bind(*v),
        // Column affinity decides the storage class
        Value::Decimal(v) => query.bind(v.as_str()),
        Value::Date(v) => query.bind(*v),
        Value::Timestamp(v) => query.bind(*v),
        Value::Text(v) => query.bind(v.as_str()),
        Value::Binary(v) => query.bind(v.as_slice()),
        Value::Array(_) => return Err(unsupported(value, "SQLite")),
    })
}
