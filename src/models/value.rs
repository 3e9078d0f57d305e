//! Store-neutral values.
//!
//! `Value` is what moves between record fields and statement parameters. Each
//! variant maps onto one primitive binding kind of the store driver.

use crate::error::DbError;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A bindable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// NULL value
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// Exact numeric, kept in its textual form
    Decimal(Decimal),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Text(String),
    /// Binary data (base64 encoded when serialized)
    #[serde(with = "base64_bytes")]
    Binary(Vec<u8>),
    /// Homogeneous array; only PostgreSQL can bind these
    Array(Vec<Value>),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// True for the values an auto-generated key holds before insertion.
    pub fn is_unset_key(&self) -> bool {
        matches!(self, Self::Null | Self::Int(0) | Self::Long(0))
    }

    /// Get the type name of this value for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Decimal(_) => "decimal",
            Self::Date(_) => "date",
            Self::Timestamp(_) => "timestamp",
            Self::Text(_) => "text",
            Self::Binary(_) => "binary",
            Self::Array(_) => "array",
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Long(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::Decimal(v) => write!(f, "{}", v),
            Self::Date(v) => write!(f, "{}", v),
            Self::Timestamp(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "{}", v),
            Self::Binary(v) => write!(f, "<{} bytes>", v.len()),
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

macro_rules! value_from {
    ($($native:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$native> for Value {
                fn from(v: $native) -> Self {
                    Value::$variant(v.into())
                }
            }
        )+
    };
}

value_from!(
    bool => Bool,
    i8 => Int,
    i16 => Int,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    Decimal => Decimal,
    NaiveDate => Date,
    NaiveDateTime => Timestamp,
    String => Text,
    Vec<u8> => Binary,
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<char> for Value {
    fn from(v: char) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Exact decimal number in its canonical textual form.
///
/// Binding keeps the text, so no precision is lost on the way to NUMERIC/DECIMAL
/// columns. Parsing drops redundant zeros and the sign of zero, so `12.50` and
/// `12.5` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Decimal(String);

impl Decimal {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Decimal {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let negative = trimmed.starts_with('-');
        let digits = trimmed
            .strip_prefix('-')
            .or_else(|| trimmed.strip_prefix('+'))
            .unwrap_or(trimmed);
        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (digits, None),
        };
        let valid = !(int_part.is_empty() && frac_part.is_none_or(str::is_empty))
            && int_part.chars().all(|c| c.is_ascii_digit())
            && frac_part.is_none_or(|f| f.chars().all(|c| c.is_ascii_digit()));
        if !valid {
            return Err(DbError::conversion(s, "decimal"));
        }

        let int_part = int_part.trim_start_matches('0');
        let frac_part = frac_part.unwrap_or("").trim_end_matches('0');
        if int_part.is_empty() && frac_part.is_empty() {
            return Ok(Decimal::default());
        }
        let mut canonical = String::with_capacity(int_part.len() + frac_part.len() + 3);
        if negative {
            canonical.push('-');
        }
        canonical.push_str(if int_part.is_empty() { "0" } else { int_part });
        if !frac_part.is_empty() {
            canonical.push('.');
            canonical.push_str(frac_part);
        }
        Ok(Decimal(canonical))
    }
}

impl Default for Decimal {
    fn default() -> Self {
        Decimal("0".to_string())
    }
}

impl TryFrom<String> for Decimal {
    type Error = DbError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Decimal> for String {
    fn from(value: Decimal) -> Self {
        value.0
    }
}

impl std::fmt::Display for Decimal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_key_values() {
        assert!(Value::Int(0).is_unset_key());
        assert!(Value::Long(0).is_unset_key());
        assert!(Value::Null.is_unset_key());
        assert!(!Value::Int(7).is_unset_key());
        assert!(!Value::Text(String::new()).is_unset_key());
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".to_string()));
        assert_eq!(Value::from(5i16), Value::Int(5));
    }

    #[test]
    fn test_decimal_parse() {
        assert_eq!("12.50".parse::<Decimal>().unwrap().as_str(), "12.5");
        assert_eq!("+3".parse::<Decimal>().unwrap().as_str(), "3");
        assert_eq!("-0.5".parse::<Decimal>().unwrap().as_str(), "-0.5");
        assert_eq!(".5".parse::<Decimal>().unwrap().as_str(), "0.5");
        assert_eq!("007.000".parse::<Decimal>().unwrap().as_str(), "7");
        assert_eq!("100".parse::<Decimal>().unwrap().as_str(), "100");
        assert_eq!("-0.00".parse::<Decimal>().unwrap(), Decimal::default());
        assert!("1e5".parse::<Decimal>().is_err());
        assert!("".parse::<Decimal>().is_err());
        assert!("-".parse::<Decimal>().is_err());
        assert!("1.2.3".parse::<Decimal>().is_err());
    }

    #[test]
    fn test_decimal_equality_ignores_scale() {
        let stored: Decimal = "12.50".parse().unwrap();
        let read_back: Decimal = "12.5000".parse().unwrap();
        assert_eq!(stored, read_back);
        assert_ne!(stored, "12.05".parse::<Decimal>().unwrap());
        assert_eq!(Decimal::default().as_str(), "0");
    }

    #[test]
    fn test_display_array() {
        let v = Value::Array(vec![Value::Int(1), Value::Text("a".to_string())]);
        assert_eq!(v.to_string(), "[1, a]");
    }

    #[test]
    fn test_binary_serializes_as_base64() {
        let json = serde_json::to_value(Value::Binary(b"hi".to_vec())).unwrap();
        assert_eq!(json["type"], "binary");
        assert_eq!(json["value"], "aGk=");
    }
}
