//! tablemap library
//!
//! A minimal object-relational mapping layer over SQL stores (SQLite,
//! PostgreSQL, MySQL). Record types declare their table once with
//! [`impl_record!`]; [`Orm`] then runs create/read/update/delete, ordered,
//! filtered and joined queries without hand-written SQL, tracks simple
//! transactions and draws connections from a fixed-size pool.

pub mod config;
pub mod db;
pub mod error;
pub mod mapping;
pub mod models;
pub mod orm;
pub mod sql;

pub use config::Config;
pub use db::{ConnectionPool, ConnectionSource};
pub use error::{DbError, DbResult};
pub use mapping::Record;
pub use models::{ConnectionConfig, FieldPair, Value};
pub use orm::{Orm, OrmOptions};
