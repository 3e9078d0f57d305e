//! Column/value pairs.

use crate::models::Value;
use serde::{Deserialize, Serialize};

/// A column's identity and value, independent of any record type.
///
/// Produced from record instances by [`extract_field_pairs`](crate::mapping::extract_field_pairs)
/// or built directly by callers for ad-hoc filters and updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPair {
    pub name: String,
    pub value: Value,
    #[serde(default)]
    pub primary_key: bool,
}

impl FieldPair {
    /// Create a non-key pair.
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            primary_key: false,
        }
    }

    /// Create a pair for a primary-key column.
    pub fn key(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            primary_key: true,
        }
    }
}

impl std::fmt::Display for FieldPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.primary_key {
            write!(f, "{}={} (key)", self.name, self.value)
        } else {
            write!(f, "{}={}", self.name, self.value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let pair = FieldPair::new("rating", 5);
        assert_eq!(pair.value, Value::Int(5));
        assert!(!pair.primary_key);

        let key = FieldPair::key("post_id", 3i64);
        assert!(key.primary_key);
        assert_eq!(key.to_string(), "post_id=3 (key)");
    }
}
