//! Type coercion between record fields, bindable values and the store's text form.
//!
//! Three directions are covered:
//! - native field → [`Value`] through [`ToValue`] (parameter binding)
//! - store text → [`Value`] of a declared [`FieldType`] through [`from_store_text`]
//! - [`Value`] → native field through [`FromValue`] (record population)
//!
//! Conversions never truncate silently: out-of-range numbers fail with
//! `DbError::Conversion`, kinds outside the supported set with
//! `DbError::UnsupportedType`.

use crate::error::{DbError, DbResult};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use crate::models::{Decimal, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Declared kind of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Char,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Decimal,
    Bool,
    Text,
    Date,
    DateTime,
    Binary,
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Char => "char",
            Self::Byte => "byte",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Decimal => "decimal",
            Self::Bool => "bool",
            Self::Text => "text",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Binary => "binary",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Compile-time mapping from a Rust field type to its declared [`FieldType`].
pub trait NativeType {
    const FIELD_TYPE: FieldType;
}

/// Native value → bindable value.
pub trait ToValue {
    fn to_value(&self) -> DbResult<Value>;
}

/// Bindable value → native value.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> DbResult<Self>;
}

/// Convert a native value into its bindable form.
pub fn to_store_value<T: ToValue + ?Sized>(value: &T) -> DbResult<Value> {
    value.to_value()
}

/// Parse the store's text form of a column into a value of the declared type.
pub fn from_store_text(text: &str, target: FieldType) -> DbResult<Value> {
    let trimmed = text.trim();
    let value = match target {
        FieldType::Char => Value::Text(parse_char(text)?.to_string()),
        FieldType::Byte => Value::Int(parse_number::<i8>(trimmed, target)?.into()),
        FieldType::Short => Value::Int(parse_number::<i16>(trimmed, target)?.into()),
        FieldType::Int => Value::Int(parse_number(trimmed, target)?),
        FieldType::Long => Value::Long(parse_number(trimmed, target)?),
        FieldType::Float => Value::Float(parse_number(trimmed, target)?),
        FieldType::Double => Value::Double(parse_number(trimmed, target)?),
        FieldType::Decimal => Value::Decimal(trimmed.parse()?),
        FieldType::Bool => Value::Bool(parse_bool(trimmed)?),
        FieldType::Text => Value::Text(text.to_string()),
        FieldType::Date => Value::Date(parse_date(trimmed)?),
        FieldType::DateTime => Value::Timestamp(parse_datetime(trimmed)?),
        FieldType::Binary => Value::Binary(
            STANDARD
                .decode(trimmed)
                .map_err(|_| DbError::conversion(text, target.name()))?,
        ),
    };
    Ok(value)
}

fn parse_number<N: std::str::FromStr>(text: &str, target: FieldType) -> DbResult<N> {
    text.parse::<N>()
        .map_err(|_| DbError::conversion(text, target.name()))
}

fn parse_char(text: &str) -> DbResult<char> {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        // CHAR(n) columns come back space padded
        (Some(c), Some(_)) if text.trim_end().chars().count() == 1 => Ok(c),
        _ => Err(DbError::conversion(text, "char")),
    }
}

fn parse_bool(text: &str) -> DbResult<bool> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" => Ok(true),
        "false" | "f" | "0" => Ok(false),
        _ => Err(DbError::conversion(text, "bool")),
    }
}

fn parse_date(text: &str) -> DbResult<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| DbError::conversion(text, "date"))
}

fn parse_datetime(text: &str) -> DbResult<NaiveDateTime> {
    const FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    for format in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(dt);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Ok(dt.naive_utc());
    }
    if let Ok(date) = parse_date(text) {
        return Ok(date.and_hms_opt(0, 0, 0).unwrap_or_default());
    }
    Err(DbError::conversion(text, "datetime"))
}

// =============================================================================
// Native type table
// =============================================================================

macro_rules! native_type {
    ($($native:ty => $field_type:ident),+ $(,)?) => {
        $(
            impl NativeType for $native {
                const FIELD_TYPE: FieldType = FieldType::$field_type;
            }
        )+
    };
}

native_type!(
    char => Char,
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    u8 => Short,
    u16 => Int,
    u32 => Long,
    u64 => Long,
    f32 => Float,
    f64 => Double,
    Decimal => Decimal,
    bool => Bool,
    String => Text,
    NaiveDate => Date,
    NaiveDateTime => DateTime,
    Vec<u8> => Binary,
);

impl<T: NativeType> NativeType for Option<T> {
    const FIELD_TYPE: FieldType = T::FIELD_TYPE;
}

// =============================================================================
// Native → Value
// =============================================================================

macro_rules! to_value_infallible {
    ($($native:ty),+ $(,)?) => {
        $(
            impl ToValue for $native {
                fn to_value(&self) -> DbResult<Value> {
                    Ok(Value::from(self.clone()))
                }
            }
        )+
    };
}

to_value_infallible!(
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    f32,
    f64,
    Decimal,
    NaiveDate,
    NaiveDateTime,
    String,
    Vec<u8>,
);

impl ToValue for u8 {
    fn to_value(&self) -> DbResult<Value> {
        Ok(Value::Int((*self).into()))
    }
}

impl ToValue for u16 {
    fn to_value(&self) -> DbResult<Value> {
        Ok(Value::Int((*self).into()))
    }
}

impl ToValue for u32 {
    fn to_value(&self) -> DbResult<Value> {
        Ok(Value::Long((*self).into()))
    }
}

impl ToValue for u64 {
    fn to_value(&self) -> DbResult<Value> {
        i64::try_from(*self).map(Value::Long).map_err(|_| {
            DbError::unsupported_type(
                "u64",
                format!("{} exceeds the signed 64-bit range of the store", self),
            )
        })
    }
}

impl ToValue for str {
    fn to_value(&self) -> DbResult<Value> {
        Ok(Value::Text(self.to_string()))
    }
}

impl ToValue for Value {
    fn to_value(&self) -> DbResult<Value> {
        Ok(self.clone())
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> DbResult<Value> {
        match self {
            Some(v) => v.to_value(),
            None => Ok(Value::Null),
        }
    }
}

impl<T: ToValue + ?Sized> ToValue for &T {
    fn to_value(&self) -> DbResult<Value> {
        (**self).to_value()
    }
}

// =============================================================================
// Value → Native
// =============================================================================

fn mismatch(value: &Value, target: &str) -> DbError {
    DbError::conversion(value.to_string(), target)
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Int(v) => Some((*v).into()),
        Value::Long(v) => Some(*v),
        _ => None,
    }
}

macro_rules! from_value_integer {
    ($($native:ty),+ $(,)?) => {
        $(
            impl FromValue for $native {
                fn from_value(value: Value) -> DbResult<Self> {
                    as_integer(&value)
                        .and_then(|v| <$native>::try_from(v).ok())
                        .ok_or_else(|| mismatch(&value, stringify!($native)))
                }
            }
        )+
    };
}

from_value_integer!(i8, i16, i32, i64, u8, u16, u32, u64);

impl FromValue for bool {
    fn from_value(value: Value) -> DbResult<Self> {
        match value {
            Value::Bool(v) => Ok(v),
            ref other => match as_integer(other) {
                Some(0) => Ok(false),
                Some(1) => Ok(true),
                _ => Err(mismatch(other, "bool")),
            },
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> DbResult<Self> {
        match value {
            Value::Float(v) => Ok(v),
            Value::Int(v) if v.unsigned_abs() <= 1 << 24 => Ok(v as f32),
            other => Err(mismatch(&other, "f32")),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> DbResult<Self> {
        match value {
            Value::Float(v) => Ok(v.into()),
            Value::Double(v) => Ok(v),
            Value::Int(v) => Ok(v.into()),
            Value::Long(v) if v.unsigned_abs() <= 1 << 53 => Ok(v as f64),
            other => Err(mismatch(&other, "f64")),
        }
    }
}

impl FromValue for Decimal {
    fn from_value(value: Value) -> DbResult<Self> {
        match value {
            Value::Decimal(v) => Ok(v),
            Value::Int(v) => v.to_string().parse(),
            Value::Long(v) => v.to_string().parse(),
            other => Err(mismatch(&other, "decimal")),
        }
    }
}

impl FromValue for char {
    fn from_value(value: Value) -> DbResult<Self> {
        match value {
            Value::Text(ref s) => parse_char(s),
            other => Err(mismatch(&other, "char")),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> DbResult<Self> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(mismatch(&other, "String")),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: Value) -> DbResult<Self> {
        match value {
            Value::Date(v) => Ok(v),
            other => Err(mismatch(&other, "date")),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> DbResult<Self> {
        match value {
            Value::Timestamp(v) => Ok(v),
            Value::Date(v) => Ok(v.and_hms_opt(0, 0, 0).unwrap_or_default()),
            other => Err(mismatch(&other, "datetime")),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> DbResult<Self> {
        match value {
            Value::Binary(v) => Ok(v),
            other => Err(mismatch(&other, "binary")),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> DbResult<Self> {
        Ok(value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> DbResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_store_text_integers() {
        assert_eq!(
            from_store_text("42", FieldType::Int).unwrap(),
            Value::Int(42)
        );
        assert_eq!(
            from_store_text(" 7 ", FieldType::Long).unwrap(),
            Value::Long(7)
        );
        assert_eq!(
            from_store_text("-12", FieldType::Byte).unwrap(),
            Value::Int(-12)
        );
        assert!(matches!(
            from_store_text("300", FieldType::Byte),
            Err(DbError::Conversion { .. })
        ));
        assert!(matches!(
            from_store_text("70000", FieldType::Short),
            Err(DbError::Conversion { .. })
        ));
    }

    #[test]
    fn test_from_store_text_char() {
        assert_eq!(
            from_store_text("M", FieldType::Char).unwrap(),
            Value::Text("M".to_string())
        );
        // padded CHAR(3)
        assert_eq!(
            from_store_text("F  ", FieldType::Char).unwrap(),
            Value::Text("F".to_string())
        );
        assert!(from_store_text("MF", FieldType::Char).is_err());
        assert!(from_store_text("", FieldType::Char).is_err());
    }

    #[test]
    fn test_from_store_text_bool() {
        for text in ["true", "T", "1"] {
            assert_eq!(
                from_store_text(text, FieldType::Bool).unwrap(),
                Value::Bool(true)
            );
        }
        for text in ["false", "f", "0"] {
            assert_eq!(
                from_store_text(text, FieldType::Bool).unwrap(),
                Value::Bool(false)
            );
        }
        assert!(from_store_text("yes please", FieldType::Bool).is_err());
    }

    #[test]
    fn test_from_store_text_dates() {
        let date = NaiveDate::from_ymd_opt(2021, 6, 1).unwrap();
        assert_eq!(
            from_store_text("2021-06-01", FieldType::Date).unwrap(),
            Value::Date(date)
        );

        let expected = date.and_hms_opt(13, 45, 10).unwrap();
        for text in [
            "2021-06-01T13:45:10",
            "2021-06-01 13:45:10",
            "2021-06-01 13:45:10.000",
            "2021-06-01T13:45:10+00:00",
        ] {
            assert_eq!(
                from_store_text(text, FieldType::DateTime).unwrap(),
                Value::Timestamp(expected),
                "{}",
                text
            );
        }
        assert_eq!(
            from_store_text("2021-06-01", FieldType::DateTime).unwrap(),
            Value::Timestamp(date.and_hms_opt(0, 0, 0).unwrap())
        );
        assert!(from_store_text("06/01/2021", FieldType::Date).is_err());
    }

    #[test]
    fn test_from_store_text_binary_is_base64() {
        assert_eq!(
            from_store_text("AAEC", FieldType::Binary).unwrap(),
            Value::Binary(vec![0, 1, 2])
        );
        assert_eq!(
            from_store_text("", FieldType::Binary).unwrap(),
            Value::Binary(Vec::new())
        );
        assert!(matches!(
            from_store_text("not base64!", FieldType::Binary),
            Err(DbError::Conversion { .. })
        ));
    }

    #[test]
    fn test_from_store_text_text_keeps_whitespace() {
        assert_eq!(
            from_store_text("  Naples ", FieldType::Text).unwrap(),
            Value::Text("  Naples ".to_string())
        );
    }

    #[test]
    fn test_to_store_value() {
        assert_eq!(to_store_value(&5u8).unwrap(), Value::Int(5));
        assert_eq!(to_store_value(&'x').unwrap(), Value::Text("x".to_string()));
        assert_eq!(to_store_value(&None::<i32>).unwrap(), Value::Null);
        assert_eq!(
            to_store_value("Italy").unwrap(),
            Value::Text("Italy".to_string())
        );
        assert_eq!(to_store_value(&(i64::MAX as u64)).unwrap(), Value::Long(i64::MAX));
        assert!(matches!(
            to_store_value(&u64::MAX),
            Err(DbError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_from_value_narrowing() {
        assert_eq!(i16::from_value(Value::Long(12)).unwrap(), 12);
        assert!(i8::from_value(Value::Int(1000)).is_err());
        assert!(u32::from_value(Value::Int(-1)).is_err());
        assert!(i32::from_value(Value::Text("1".to_string())).is_err());
    }

    #[test]
    fn test_from_value_option_and_bool() {
        assert_eq!(Option::<i32>::from_value(Value::Null).unwrap(), None);
        assert_eq!(Option::<i32>::from_value(Value::Int(3)).unwrap(), Some(3));
        assert!(bool::from_value(Value::Int(1)).unwrap());
        assert!(bool::from_value(Value::Int(2)).is_err());
    }

    #[test]
    fn test_field_type_of_native() {
        assert_eq!(<Option<String> as NativeType>::FIELD_TYPE, FieldType::Text);
        assert_eq!(<char as NativeType>::FIELD_TYPE, FieldType::Char);
        assert_eq!(<u64 as NativeType>::FIELD_TYPE, FieldType::Long);
    }

    #[test]
    fn test_store_text_round_trip_through_field() {
        let value = from_store_text("2", FieldType::Int).unwrap();
        assert_eq!(i32::from_value(value).unwrap(), 2);

        let value = from_store_text("Q", FieldType::Char).unwrap();
        assert_eq!(char::from_value(value).unwrap(), 'Q');
    }
}
