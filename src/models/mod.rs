//! Data models for tablemap.
//!
//! This module re-exports the value and configuration types used throughout the crate.

pub mod connection;
pub mod field_pair;
pub mod value;

// Re-export commonly used types
pub use connection::{ConnectionConfig, ConnectionConfigError, DatabaseType};
pub use field_pair::FieldPair;
pub use value::{Decimal, Value};
