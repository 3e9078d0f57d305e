//! Database dispatch macros for reducing code duplication.
//!
//! This module provides declarative macros that generate database-specific
//! implementations while maintaining linear readability. The macros expand
//! at compile time with zero runtime overhead.

/// Macro for generating database dispatch match arms.
///
/// This macro generates match arms for `DbConnection` variants, reducing the need
/// to manually write repetitive match statements.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(connection, {
///     MySql(c) => executor::mysql::execute_write(c, statement, limit).await,
///     Postgres(c) => executor::postgres::execute_write(c, statement, limit).await,
///     SQLite(c) => executor::sqlite::execute_write(c, statement, limit).await,
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($conn:expr, { $($variant:ident($c:ident) => $body:expr),+ $(,)? }) => {
        match $conn {
            $(
                $crate::db::connection::DbConnection::$variant($c) => $body,
            )+
        }
    };
}

pub use impl_db_dispatch;

#[cfg(test)]
mod tests {
    use crate::db::connection::DbConnection;
    use crate::models::{ConnectionConfig, DatabaseType};

    fn variant_name(conn: &DbConnection) -> &'static str {
        impl_db_dispatch!(conn, {
            MySql(_c) => "mysql",
            Postgres(_c) => "postgres",
            SQLite(_c) => "sqlite",
        })
    }

    #[tokio::test]
    async fn test_dispatch_selects_variant() {
        let config = ConnectionConfig::new("sqlite::memory:").unwrap();
        let conn = DbConnection::connect(&config).await.unwrap();
        assert_eq!(variant_name(&conn), "sqlite");
        assert_eq!(conn.db_type(), DatabaseType::SQLite);
        conn.close().await.unwrap();
    }
}
