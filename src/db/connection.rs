//! Store connections.
//!
//! This module wraps database-specific sqlx connections (MySqlConnection,
//! PgConnection, SqliteConnection) behind one enum so the rest of the crate
//! never touches a backend type directly.

use crate::db::executor::{self, ExecuteResult, with_timeout};
use crate::db::types::TextRow;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, DatabaseType};
use crate::sql::Statement;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::Connection;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Database-specific connection (avoids AnyConnection limitations).
#[derive(Debug)]
pub enum DbConnection {
    MySql(MySqlConnection),
    Postgres(PgConnection),
    SQLite(SqliteConnection),
}

impl DbConnection {
    /// Open a connection, applying separately supplied credentials.
    pub async fn connect(config: &ConnectionConfig) -> DbResult<Self> {
        debug!(
            db_type = %config.db_type,
            url = %config.masked_connection_string(),
            "Opening connection"
        );

        let connection = match config.db_type {
            DatabaseType::MySQL => {
                let mut options = MySqlConnectOptions::from_str(&config.connection_string)
                    .map_err(|e| {
                        DbError::connection(
                            format!("Invalid MySQL connection string: {}", e),
                            "Check the connection URL format: mysql://host:port/database",
                        )
                    })?
                    .charset("utf8mb4");
                if let Some(username) = &config.username {
                    options = options.username(username);
                }
                if let Some(password) = &config.password {
                    options = options.password(password);
                }
                let conn = MySqlConnection::connect_with(&options)
                    .await
                    .map_err(|e| connect_error(config.db_type, &e))?;
                DbConnection::MySql(conn)
            }
            DatabaseType::PostgreSQL => {
                let mut options =
                    PgConnectOptions::from_str(&config.connection_string).map_err(|e| {
                        DbError::connection(
                            format!("Invalid PostgreSQL connection string: {}", e),
                            "Check the connection URL format: postgres://host:5432/database",
                        )
                    })?;
                if let Some(username) = &config.username {
                    options = options.username(username);
                }
                if let Some(password) = &config.password {
                    options = options.password(password);
                }
                let conn = PgConnection::connect_with(&options)
                    .await
                    .map_err(|e| connect_error(config.db_type, &e))?;
                DbConnection::Postgres(conn)
            }
            DatabaseType::SQLite => {
                if config.username.is_some() || config.password.is_some() {
                    warn!("SQLite ignores username and password");
                }
                let options = SqliteConnectOptions::from_str(&config.connection_string)
                    .map_err(|e| {
                        DbError::connection(
                            format!("Invalid SQLite connection string: {}", e),
                            "Check the connection URL format: sqlite:path/to/db.sqlite",
                        )
                    })?
                    .create_if_missing(true);
                let conn = SqliteConnection::connect_with(&options)
                    .await
                    .map_err(|e| connect_error(config.db_type, &e))?;
                DbConnection::SQLite(conn)
            }
        };

        Ok(connection)
    }

    /// Get the database type for this connection.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbConnection::MySql(_) => DatabaseType::MySQL,
            DbConnection::Postgres(_) => DatabaseType::PostgreSQL,
            DbConnection::SQLite(_) => DatabaseType::SQLite,
        }
    }

    /// Run a write statement.
    pub async fn execute(
        &mut self,
        statement: &Statement,
        limit: Duration,
    ) -> DbResult<ExecuteResult> {
        debug!(
            sql = %statement.sql,
            params = statement.params.len(),
            timeout_secs = limit.as_secs(),
            "Executing statement"
        );
        crate::impl_db_dispatch!(self, {
            MySql(c) => executor::mysql::execute_write(c, statement, limit).await,
            Postgres(c) => executor::postgres::execute_write(c, statement, limit).await,
            SQLite(c) => executor::sqlite::execute_write(c, statement, limit).await,
        })
    }

    /// Run a query and decode every row.
    pub async fn fetch(&mut self, statement: &Statement, limit: Duration) -> DbResult<Vec<TextRow>> {
        debug!(
            sql = %statement.sql,
            params = statement.params.len(),
            timeout_secs = limit.as_secs(),
            "Executing query"
        );
        crate::impl_db_dispatch!(self, {
            MySql(c) => executor::mysql::fetch_rows(c, statement, limit).await,
            Postgres(c) => executor::postgres::fetch_rows(c, statement, limit).await,
            SQLite(c) => executor::sqlite::fetch_rows(c, statement, limit).await,
        })
    }

    /// Run parameterless SQL such as DDL or transaction control.
    pub async fn execute_raw(&mut self, sql: &str, limit: Duration) -> DbResult<u64> {
        let statement = Statement {
            sql: sql.to_string(),
            params: Vec::new(),
        };
        Ok(self.execute(&statement, limit).await?.rows_affected)
    }

    pub async fn begin(&mut self, limit: Duration) -> DbResult<()> {
        self.execute_raw("BEGIN", limit).await.map(|_| ())
    }

    pub async fn commit(&mut self, limit: Duration) -> DbResult<()> {
        self.execute_raw("COMMIT", limit).await.map(|_| ())
    }

    pub async fn rollback(&mut self, limit: Duration) -> DbResult<()> {
        self.execute_raw("ROLLBACK", limit).await.map(|_| ())
    }

    /// Check that the store still answers.
    pub async fn ping(&mut self, limit: Duration) -> DbResult<()> {
        with_timeout("ping", limit, async {
            crate::impl_db_dispatch!(self, {
                MySql(c) => c.ping().await,
                Postgres(c) => c.ping().await,
                SQLite(c) => c.ping().await,
            })
            .map_err(DbError::from)
        })
        .await
    }

    /// Get the server version reported by the store.
    pub async fn server_version(&mut self, limit: Duration) -> DbResult<String> {
        let sql = match self.db_type() {
            DatabaseType::SQLite => "SELECT sqlite_version()",
            DatabaseType::MySQL | DatabaseType::PostgreSQL => "SELECT version()",
        };
        let statement = Statement {
            sql: sql.to_string(),
            params: Vec::new(),
        };
        let rows = self.fetch(&statement, limit).await?;
        let version = rows
            .into_iter()
            .next()
            .and_then(|row| row.into_values().into_iter().next().flatten())
            .ok_or_else(|| DbError::internal("Server did not report a version"))?;
        info!(version = %version, "Got server version");
        Ok(version)
    }

    /// Close the connection gracefully.
    pub async fn close(self) -> DbResult<()> {
        crate::impl_db_dispatch!(self, {
            MySql(c) => c.close().await,
            Postgres(c) => c.close().await,
            SQLite(c) => c.close().await,
        })
        .map_err(DbError::from)
    }
}

fn connect_error(db_type: DatabaseType, error: &sqlx::Error) -> DbError {
    DbError::connection(
        format!("Failed to connect: {}", error),
        connection_suggestion(db_type, error),
    )
}

/// Generate a helpful suggestion for connection errors.
fn connection_suggestion(db_type: DatabaseType, error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") {
        return format!(
            "Check that the {} server is running and accessible",
            db_type
        );
    }

    if error_str.contains("authentication") || error_str.contains("password") {
        return "Verify DB_USERNAME and DB_PASSWORD".to_string();
    }

    if error_str.contains("does not exist") || error_str.contains("unknown database") {
        return "Check that the database name exists".to_string();
    }

    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check TLS/SSL configuration or try disabling it".to_string();
    }

    match db_type {
        DatabaseType::PostgreSQL => {
            "Verify the connection string format: postgres://host:5432/db".to_string()
        }
        DatabaseType::MySQL => {
            "Verify the connection string format: mysql://host:3306/db".to_string()
        }
        DatabaseType::SQLite => {
            "Verify the file path exists and is accessible: sqlite:path/to/db.sqlite".to_string()
        }
    }
}
