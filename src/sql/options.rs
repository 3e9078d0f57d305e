//! Textual query options: sort direction, filter combinator and join kind.
//!
//! Each option parses case-insensitively from its full name; anything else is
//! rejected with `DbError::InvalidInput` before a statement is built.

use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Sort direction for ordered reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Ascending),
            "desc" | "descending" => Ok(Self::Descending),
            _ => Err(DbError::invalid_input(format!(
                "Order must be 'asc' or 'desc', got '{}'",
                s
            ))),
        }
    }
}

/// How multiple filter pairs combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combinator {
    And,
    Or,
    /// Exactly one filter pair
    Single,
}

impl Combinator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::And | Self::Single => " AND ",
            Self::Or => " OR ",
        }
    }
}

impl FromStr for Combinator {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "and" => Ok(Self::And),
            "or" => Ok(Self::Or),
            "single" | "no" => Ok(Self::Single),
            _ => Err(DbError::invalid_input(format!(
                "Criterion must be 'and', 'or' or 'single', got '{}'",
                s
            ))),
        }
    }
}

/// Join kind for two-table reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    Inner,
    Left,
    Right,
}

impl JoinKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
        }
    }
}

impl FromStr for JoinKind {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inner" => Ok(Self::Inner),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            _ => Err(DbError::invalid_input(format!(
                "Join type must be 'inner', 'left' or 'right', got '{}'",
                s
            ))),
        }
    }
}

/// Accept either a parsed option or its textual name.
pub trait IntoOption<T> {
    fn into_option(self) -> DbResult<T>;
}

macro_rules! impl_into_option {
    ($($option:ty),+ $(,)?) => {
        $(
            impl IntoOption<$option> for $option {
                fn into_option(self) -> DbResult<$option> {
                    Ok(self)
                }
            }

            impl IntoOption<$option> for &str {
                fn into_option(self) -> DbResult<$option> {
                    self.parse()
                }
            }

            impl IntoOption<$option> for &String {
                fn into_option(self) -> DbResult<$option> {
                    self.parse()
                }
            }
        )+
    };
}

impl_into_option!(SortOrder, Combinator, JoinKind);
