//! Row decoding into the store-neutral text form.
//!
//! # Architecture
//!
//! Decoding uses a two-phase approach:
//! 1. `TypeCategory` classifies the column type reported by the driver
//! 2. Database-specific decoders extract the value and render it as text
//!
//! The text produced here is what [`from_store_text`](crate::mapping::coerce::from_store_text)
//! parses: integers and floats in Rust's `Display` form, booleans as
//! `true`/`false`, dates as `YYYY-MM-DD`, timestamps as `YYYY-MM-DD HH:MM:SS[.f]`,
//! decimals in their exact textual form and binary data as base64.

use crate::error::{DbError, DbResult};
use crate::models::DatabaseType;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::Serialize;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueFormat, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const TIME_FORMAT: &str = "%H:%M:%S%.f";

// =============================================================================
// Text Rows
// =============================================================================

/// One result row: column names and per-column text (`None` for NULL).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextRow {
    columns: Vec<String>,
    values: Vec<Option<String>>,
}

impl TextRow {
    pub fn new(columns: Vec<String>, values: Vec<Option<String>>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Option<String>> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Position of a column, ignoring ASCII case.
    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
    }

    /// Text of a column; `None` when the column is absent from the row.
    pub fn get(&self, column: &str) -> Option<Option<&str>> {
        self.index_of(column)
            .map(|idx| self.values[idx].as_deref())
    }
}

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Temporal types first: "interval" and "point" would otherwise match "int"
    match lower.as_str() {
        "date" => return TypeCategory::Date,
        "time" | "timetz" => return TypeCategory::Time,
        "timestamptz" => return TypeCategory::TimestampTz,
        "timestamp" | "datetime" => return TypeCategory::Timestamp,
        "interval" | "point" => return TypeCategory::Unknown,
        _ => {}
    }

    // Decimal/Numeric - check before float since SQLite's NUMERIC is a float
    if lower.contains("decimal") || lower.contains("numeric") {
        if db == DatabaseType::SQLite {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("int") || lower.contains("serial") || lower == "year" {
        return TypeCategory::Integer;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.contains("char")
        || lower.contains("text")
        || lower == "name"
        || lower == "enum"
        || lower == "set"
    {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Raw DECIMAL/NUMERIC value in its exact textual form.
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

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("NUMERIC")
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        match value.format() {
            PgValueFormat::Text => Ok(RawDecimal(value.as_str()?.to_string())),
            PgValueFormat::Binary => Ok(RawDecimal(pg_numeric_to_string(value.as_bytes()?)?)),
        }
    }
}

/// Render PostgreSQL's binary NUMERIC (base-10000 digit groups) as text.
fn pg_numeric_to_string(buf: &[u8]) -> Result<String, sqlx::error::BoxDynError> {
    const SIGN_NEG: u16 = 0x4000;
    const SIGN_NAN: u16 = 0xC000;

    let read = |at: usize| -> Result<u16, sqlx::error::BoxDynError> {
        buf.get(at..at + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| "truncated NUMERIC value".into())
    };

    let ndigits = read(0)? as usize;
    let weight = read(2)? as i16;
    let sign = read(4)?;
    let dscale = read(6)? as usize;
    let digits = (0..ndigits)
        .map(|i| read(8 + i * 2))
        .collect::<Result<Vec<u16>, _>>()?;

    if sign == SIGN_NAN {
        return Ok("NaN".to_string());
    }

    let mut out = String::new();
    if sign == SIGN_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        for i in 0..=weight as usize {
            let group = digits.get(i).copied().unwrap_or(0);
            if i == 0 {
                out.push_str(&group.to_string());
            } else {
                out.push_str(&format!("{:04}", group));
            }
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut idx = i32::from(weight) + 1;
        while fraction.len() < dscale {
            let group = usize::try_from(idx)
                .ok()
                .and_then(|i| digits.get(i).copied())
                .unwrap_or(0);
            fraction.push_str(&format!("{:04}", group));
            idx += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }
    Ok(out)
}

// =============================================================================
// Binary Encoding
// =============================================================================

/// Binary column text: base64.
pub fn encode_binary_value(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

fn decode_error(column: &str, type_name: &str, err: impl std::fmt::Display) -> DbError {
    DbError::internal(format!(
        "Failed to decode column '{}' of type {}: {}",
        column, type_name, err
    ))
}

// =============================================================================
// Row to Text Trait
// =============================================================================

/// Conversion of a driver row into a [`TextRow`].
pub trait RowToText {
    fn to_text_row(&self) -> DbResult<TextRow>;
}

impl RowToText for MySqlRow {
    fn to_text_row(&self) -> DbResult<TextRow> {
        let mut names = Vec::with_capacity(self.columns().len());
        let mut values = Vec::with_capacity(self.columns().len());
        for (idx, col) in self.columns().iter().enumerate() {
            let type_name = col.type_info().name();
            let category = categorize_type(type_name, DatabaseType::MySQL);
            let value = mysql::decode_column(self, idx, category)
                .map_err(|e| decode_error(col.name(), type_name, e))?;
            names.push(col.name().to_string());
            values.push(value);
        }
        Ok(TextRow::new(names, values))
    }
}

impl RowToText for PgRow {
    fn to_text_row(&self) -> DbResult<TextRow> {
        let mut names = Vec::with_capacity(self.columns().len());
        let mut values = Vec::with_capacity(self.columns().len());
        for (idx, col) in self.columns().iter().enumerate() {
            let type_name = col.type_info().name();
            let category = categorize_type(type_name, DatabaseType::PostgreSQL);
            let value = postgres::decode_column(self, idx, type_name, category)?;
            names.push(col.name().to_string());
            values.push(value);
        }
        Ok(TextRow::new(names, values))
    }
}

impl RowToText for SqliteRow {
    fn to_text_row(&self) -> DbResult<TextRow> {
        let mut names = Vec::with_capacity(self.columns().len());
        let mut values = Vec::with_capacity(self.columns().len());
        for (idx, col) in self.columns().iter().enumerate() {
            let value = sqlite::decode_column(self, idx)
                .map_err(|e| decode_error(col.name(), col.type_info().name(), e))?;
            names.push(col.name().to_string());
            values.push(value);
        }
        Ok(TextRow::new(names, values))
    }
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

type Decoded = Result<Option<String>, sqlx::Error>;

mod mysql {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> Decoded {
        if row.try_get_raw(idx)?.is_null() {
            return Ok(None);
        }
        match category {
            TypeCategory::Decimal => Ok(Some(row.try_get::<RawDecimal, _>(idx)?.0)),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => Ok(Some(row.try_get::<bool, _>(idx)?.to_string())),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => {
                let bytes = row.try_get::<Vec<u8>, _>(idx)?;
                Ok(Some(encode_binary_value(&bytes)))
            }
            TypeCategory::Json => {
                let json = row.try_get::<serde_json::Value, _>(idx)?;
                Ok(Some(json.to_string()))
            }
            TypeCategory::Date => {
                let date = row.try_get::<NaiveDate, _>(idx)?;
                Ok(Some(date.format(DATE_FORMAT).to_string()))
            }
            TypeCategory::Timestamp | TypeCategory::TimestampTz => decode_timestamp(row, idx),
            TypeCategory::Time => {
                let time = row.try_get::<NaiveTime, _>(idx)?;
                Ok(Some(time.format(TIME_FORMAT).to_string()))
            }
            _ => decode_text(row, idx),
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> Decoded {
        // Try signed types
        if let Ok(v) = row.try_get::<i8, _>(idx) {
            return Ok(Some(v.to_string()));
        }
        if let Ok(v) = row.try_get::<i16, _>(idx) {
            return Ok(Some(v.to_string()));
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return Ok(Some(v.to_string()));
        }
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Ok(Some(v.to_string()));
        }
        // Try unsigned types
        if let Ok(v) = row.try_get::<u8, _>(idx) {
            return Ok(Some(v.to_string()));
        }
        if let Ok(v) = row.try_get::<u16, _>(idx) {
            return Ok(Some(v.to_string()));
        }
        if let Ok(v) = row.try_get::<u32, _>(idx) {
            return Ok(Some(v.to_string()));
        }
        row.try_get::<u64, _>(idx).map(|v| Some(v.to_string()))
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> Decoded {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Ok(Some(v.to_string()));
        }
        row.try_get::<f32, _>(idx).map(|v| Some(v.to_string()))
    }

    fn decode_timestamp(row: &MySqlRow, idx: usize) -> Decoded {
        if let Ok(v) = row.try_get::<NaiveDateTime, _>(idx) {
            return Ok(Some(v.format(TIMESTAMP_FORMAT).to_string()));
        }
        row.try_get::<DateTime<Utc>, _>(idx)
            .map(|v| Some(v.naive_utc().format(TIMESTAMP_FORMAT).to_string()))
    }

    fn decode_text(row: &MySqlRow, idx: usize) -> Decoded {
        if let Ok(v) = row.try_get::<String, _>(idx) {
            return Ok(Some(v));
        }
        // VARBINARY-backed text and unclassified types
        let bytes = row.try_get::<Vec<u8>, _>(idx)?;
        Ok(Some(match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => encode_binary_value(e.as_bytes()),
        }))
    }
}

mod postgres {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

    pub fn decode_column(
        row: &PgRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> DbResult<Option<String>> {
        let column = row.columns()[idx].name();
        decode_value(row, idx, category)
            .map_err(|e| decode_error(column, type_name, e))?
            .map_or_else(
                || {
                    Err(DbError::unsupported_type(
                        type_name,
                        format!("column '{}' has no text mapping", column),
                    ))
                },
                Ok,
            )
    }

    /// Outer `None` means the type is not supported.
    fn decode_value(
        row: &PgRow,
        idx: usize,
        category: TypeCategory,
    ) -> Result<Option<Option<String>>, sqlx::Error> {
        if row.try_get_raw(idx)?.is_null() {
            return Ok(Some(None));
        }
        let text = match category {
            TypeCategory::Decimal => row.try_get::<RawDecimal, _>(idx)?.0,
            TypeCategory::Integer => decode_integer(row, idx)?,
            TypeCategory::Boolean => row.try_get::<bool, _>(idx)?.to_string(),
            TypeCategory::Float => decode_float(row, idx)?,
            TypeCategory::Binary => encode_binary_value(&row.try_get::<Vec<u8>, _>(idx)?),
            TypeCategory::Json => row.try_get::<serde_json::Value, _>(idx)?.to_string(),
            TypeCategory::Uuid => row.try_get::<uuid::Uuid, _>(idx)?.to_string(),
            TypeCategory::Date => row
                .try_get::<NaiveDate, _>(idx)?
                .format(DATE_FORMAT)
                .to_string(),
            TypeCategory::Time => row
                .try_get::<NaiveTime, _>(idx)?
                .format(TIME_FORMAT)
                .to_string(),
            TypeCategory::Timestamp => row
                .try_get::<NaiveDateTime, _>(idx)?
                .format(TIMESTAMP_FORMAT)
                .to_string(),
            TypeCategory::TimestampTz => row
                .try_get::<DateTime<Utc>, _>(idx)?
                .naive_utc()
                .format(TIMESTAMP_FORMAT)
                .to_string(),
            TypeCategory::Text => row.try_get::<String, _>(idx)?,
            TypeCategory::Unknown => match row.try_get::<String, _>(idx) {
                Ok(v) => v,
                Err(_) => return Ok(None),
            },
        };
        Ok(Some(Some(text)))
    }

    fn decode_integer(row: &PgRow, idx: usize) -> Result<String, sqlx::Error> {
        if let Ok(v) = row.try_get::<i16, _>(idx) {
            return Ok(v.to_string());
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return Ok(v.to_string());
        }
        row.try_get::<i64, _>(idx).map(|v| v.to_string())
    }

    fn decode_float(row: &PgRow, idx: usize) -> Result<String, sqlx::Error> {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Ok(v.to_string());
        }
        row.try_get::<f32, _>(idx).map(|v| v.to_string())
    }
}

mod sqlite {
    use super::*;

    /// SQLite is dynamically typed, so decoding follows the stored value's
    /// runtime type rather than the declared column type.
    pub fn decode_column(row: &SqliteRow, idx: usize) -> Decoded {
        let raw = row.try_get_raw(idx)?;
        if raw.is_null() {
            return Ok(None);
        }
        let storage = raw.type_info().name().to_uppercase();
        match storage.as_str() {
            "INTEGER" => row.try_get::<i64, _>(idx).map(|v| Some(v.to_string())),
            "REAL" => row.try_get::<f64, _>(idx).map(|v| Some(v.to_string())),
            "BLOB" => row
                .try_get::<Vec<u8>, _>(idx)
                .map(|v| Some(encode_binary_value(&v))),
            _ => row.try_get::<String, _>(idx).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(
            categorize_type("INT", DatabaseType::MySQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("BIGINT", DatabaseType::PostgreSQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("INT4", DatabaseType::PostgreSQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("BIGINT UNSIGNED", DatabaseType::MySQL),
            TypeCategory::Integer
        );
    }

    #[test]
    fn test_categorize_type_decimal() {
        assert_eq!(
            categorize_type("DECIMAL", DatabaseType::MySQL),
            TypeCategory::Decimal
        );
        assert_eq!(
            categorize_type("NUMERIC", DatabaseType::PostgreSQL),
            TypeCategory::Decimal
        );
        assert_eq!(
            categorize_type("numeric", DatabaseType::SQLite),
            TypeCategory::Float
        );
    }

    #[test]
    fn test_categorize_type_temporal() {
        assert_eq!(
            categorize_type("DATE", DatabaseType::PostgreSQL),
            TypeCategory::Date
        );
        assert_eq!(
            categorize_type("TIMESTAMPTZ", DatabaseType::PostgreSQL),
            TypeCategory::TimestampTz
        );
        assert_eq!(
            categorize_type("DATETIME", DatabaseType::MySQL),
            TypeCategory::Timestamp
        );
        // must not be mistaken for integers
        assert_eq!(
            categorize_type("INTERVAL", DatabaseType::PostgreSQL),
            TypeCategory::Unknown
        );
        assert_eq!(
            categorize_type("POINT", DatabaseType::PostgreSQL),
            TypeCategory::Unknown
        );
    }

    #[test]
    fn test_categorize_type_text_and_json() {
        assert_eq!(
            categorize_type("VARCHAR", DatabaseType::MySQL),
            TypeCategory::Text
        );
        assert_eq!(
            categorize_type("BPCHAR", DatabaseType::PostgreSQL),
            TypeCategory::Text
        );
        assert_eq!(
            categorize_type("jsonb", DatabaseType::PostgreSQL),
            TypeCategory::Json
        );
        assert_eq!(
            categorize_type("BOOLEAN", DatabaseType::MySQL),
            TypeCategory::Boolean
        );
    }

    #[test]
    fn test_pg_numeric_binary() {
        // 12345.678: ndigits=3 weight=1 sign=+ dscale=3 digits=[1, 2345, 6780]
        let buf: Vec<u8> = [3u16, 1, 0, 3, 1, 2345, 6780]
            .iter()
            .flat_map(|v| v.to_be_bytes())
            .collect();
        assert_eq!(pg_numeric_to_string(&buf).unwrap(), "12345.678");

        // -0.05: ndigits=1 weight=-1 sign=- dscale=2 digits=[500]
        let buf: Vec<u8> = [1u16, (-1i16) as u16, 0x4000, 2, 500]
            .iter()
            .flat_map(|v| v.to_be_bytes())
            .collect();
        assert_eq!(pg_numeric_to_string(&buf).unwrap(), "-0.05");

        // 20000: ndigits=1 weight=1 digits=[2] (trailing zero group elided)
        let buf: Vec<u8> = [1u16, 1, 0, 0, 2]
            .iter()
            .flat_map(|v| v.to_be_bytes())
            .collect();
        assert_eq!(pg_numeric_to_string(&buf).unwrap(), "20000");

        assert!(pg_numeric_to_string(&[0, 1]).is_err());
    }

    #[test]
    fn test_encode_binary_value() {
        assert_eq!(encode_binary_value(b"hello world"), "aGVsbG8gd29ybGQ=");
        assert_eq!(encode_binary_value(&[0xFF, 0xFE, 0x00, 0x01]), "//4AAQ==");
        assert_eq!(encode_binary_value(&[]), "");
    }

    #[test]
    fn test_text_row_lookup() {
        let row = TextRow::new(
            vec!["post_id".to_string(), "Text".to_string()],
            vec![Some("1".to_string()), None],
        );
        assert_eq!(row.get("POST_ID"), Some(Some("1")));
        assert_eq!(row.get("text"), Some(None));
        assert_eq!(row.get("rating"), None);
        assert_eq!(row.len(), 2);
    }
}
