//! SQL generation.
//!
//! - `builder`: parameterized statement text per dialect
//! - `identifier`: syntax checks for names that are not declared columns
//! - `options`: sort direction, filter combinator and join kind

pub mod builder;
pub mod identifier;
pub mod options;

pub use builder::{Join, KeyValue, OrderBy, Statement, StatementBuilder};
pub use options::{Combinator, IntoOption, JoinKind, SortOrder};
