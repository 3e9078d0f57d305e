//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Store connections and statement execution
//! - Parameter binding and row decoding
//! - Fixed-size connection pool and single-connection mode
//! - Transaction tracking
//! - Database dispatch macros for reducing code duplication

#[macro_use]
pub mod macros;
pub mod connection;
pub mod executor;
pub mod params;
pub mod pool;
pub mod transaction;
pub mod types;

pub use connection::DbConnection;
pub use executor::ExecuteResult;
pub use pool::{ConnectionPool, ConnectionSource, Lease, PoolStatus, PooledConnection};
pub use transaction::{TransactionInfo, TransactionTracker};
pub use types::TextRow;
