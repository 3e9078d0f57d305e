//! Statement execution.
//!
//! This module runs built [`Statement`]s on a single connection with:
//! - Parameter binding per backend
//! - Statement timeouts
//! - Streaming row decoding into [`TextRow`]s
//!
//! # Architecture
//!
//! Database-specific implementations are organized in submodules:
//! - `mysql`: MySQL-specific execution
//! - `postgres`: PostgreSQL-specific execution
//! - `sqlite`: SQLite-specific execution
//!
//! Each submodule provides identical functionality adapted to the database's type system.

use crate::db::types::{RowToText, TextRow};
use crate::error::{DbError, DbResult};
use crate::sql::Statement;
use futures_util::{TryStreamExt, future};
use std::time::Duration;
use tokio::time::timeout;

/// Outcome of a write statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteResult {
    pub rows_affected: u64,
    /// Key generated by the last insert, where the backend reports one
    pub last_insert_id: Option<i64>,
}

fn timeout_error(operation: &str, limit: Duration) -> DbError {
    DbError::timeout_after(operation, limit)
}

/// Await a store call, bounded by `limit`.
pub(crate) async fn with_timeout<T, F>(operation: &str, limit: Duration, fut: F) -> DbResult<T>
where
    F: std::future::Future<Output = DbResult<T>>,
{
    match timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(timeout_error(operation, limit)),
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its database type.
// Statements without parameters go through the simple-query path so that
// transaction control and DDL work on every backend.

pub(crate) mod mysql {
    use super::*;
    use crate::db::params::bind_mysql_value;
    use sqlx::{Executor, MySqlConnection};

    pub async fn fetch_rows(
        conn: &mut MySqlConnection,
        statement: &Statement,
        limit: Duration,
    ) -> DbResult<Vec<TextRow>> {
        with_timeout("query execution", limit, async {
            if statement.params.is_empty() {
                (&mut *conn)
                    .fetch(statement.sql.as_str())
                    .map_err(DbError::from)
                    .and_then(|row| future::ready(row.to_text_row()))
                    .try_collect::<Vec<TextRow>>()
                    .await
            } else {
                let mut query = sqlx::query(&statement.sql);
                for param in &statement.params {
                    query = bind_mysql_value(query, param)?;
                }
                query
                    .fetch(&mut *conn)
                    .map_err(DbError::from)
                    .and_then(|row| future::ready(row.to_text_row()))
                    .try_collect::<Vec<TextRow>>()
                    .await
            }
        })
        .await
    }

    pub async fn execute_write(
        conn: &mut MySqlConnection,
        statement: &Statement,
        limit: Duration,
    ) -> DbResult<ExecuteResult> {
        let result = with_timeout("write operation", limit, async {
            if statement.params.is_empty() {
                Ok::<_, DbError>((&mut *conn).execute(statement.sql.as_str()).await?)
            } else {
                let mut query = sqlx::query(&statement.sql);
                for param in &statement.params {
                    query = bind_mysql_value(query, param)?;
                }
                Ok::<_, DbError>(query.execute(&mut *conn).await?)
            }
        })
        .await?;

        Ok(ExecuteResult {
            rows_affected: result.rows_affected(),
            last_insert_id: i64::try_from(result.last_insert_id())
                .ok()
                .filter(|id| *id != 0),
        })
    }
}

pub(crate) mod postgres {
    use super::*;
    use crate::db::params::bind_postgres_value;
    use sqlx::{Executor, PgConnection};

    pub async fn fetch_rows(
        conn: &mut PgConnection,
        statement: &Statement,
        limit: Duration,
    ) -> DbResult<Vec<TextRow>> {
        with_timeout("query execution", limit, async {
            if statement.params.is_empty() {
                (&mut *conn)
                    .fetch(statement.sql.as_str())
                    .map_err(DbError::from)
                    .and_then(|row| future::ready(row.to_text_row()))
                    .try_collect::<Vec<TextRow>>()
                    .await
            } else {
                let mut query = sqlx::query(&statement.sql);
                for param in &statement.params {
                    query = bind_postgres_value(query, param)?;
                }
                query
                    .fetch(&mut *conn)
                    .map_err(DbError::from)
                    .and_then(|row| future::ready(row.to_text_row()))
                    .try_collect::<Vec<TextRow>>()
                    .await
            }
        })
        .await
    }

    pub async fn execute_write(
        conn: &mut PgConnection,
        statement: &Statement,
        limit: Duration,
    ) -> DbResult<ExecuteResult> {
        let result = with_timeout("write operation", limit, async {
            if statement.params.is_empty() {
                Ok::<_, DbError>((&mut *conn).execute(statement.sql.as_str()).await?)
            } else {
                let mut query = sqlx::query(&statement.sql);
                for param in &statement.params {
                    query = bind_postgres_value(query, param)?;
                }
                Ok::<_, DbError>(query.execute(&mut *conn).await?)
            }
        })
        .await?;

        // Generated keys come back through RETURNING
        Ok(ExecuteResult {
            rows_affected: result.rows_affected(),
            last_insert_id: None,
        })
    }
}

pub(crate) mod sqlite {
    use super::*;
    use crate::db::params::bind_sqlite_value;
    use sqlx::{Executor, SqliteConnection};

    pub async fn fetch_rows(
        conn: &mut SqliteConnection,
        statement: &Statement,
        limit: Duration,
    ) -> DbResult<Vec<TextRow>> {
        with_timeout("query execution", limit, async {
            if statement.params.is_empty() {
                (&mut *conn)
                    .fetch(statement.sql.as_str())
                    .map_err(DbError::from)
                    .and_then(|row| future::ready(row.to_text_row()))
                    .try_collect::<Vec<TextRow>>()
                    .await
            } else {
                let mut query = sqlx::query(&statement.sql);
                for param in &statement.params {
                    query = bind_sqlite_value(query, param)?;
                }
                query
                    .fetch(&mut *conn)
                    .map_err(DbError::from)
                    .and_then(|row| future::ready(row.to_text_row()))
                    .try_collect::<Vec<TextRow>>()
                    .await
            }
        })
        .await
    }

    pub async fn execute_write(
        conn: &mut SqliteConnection,
        statement: &Statement,
        limit: Duration,
    ) -> DbResult<ExecuteResult> {
        let result = with_timeout("write operation", limit, async {
            if statement.params.is_empty() {
                Ok::<_, DbError>((&mut *conn).execute(statement.sql.as_str()).await?)
            } else {
                let mut query = sqlx::query(&statement.sql);
                for param in &statement.params {
                    query = bind_sqlite_value(query, param)?;
                }
                Ok::<_, DbError>(query.execute(&mut *conn).await?)
            }
        })
        .await?;

        Ok(ExecuteResult {
            rows_affected: result.rows_affected(),
            last_insert_id: Some(result.last_insert_rowid()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let result = with_timeout("noop", Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result: DbResult<()> = with_timeout("sleep", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(DbError::Timeout { .. })));
    }
}
