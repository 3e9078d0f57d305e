//! Transaction tracking for a single mapping instance.
//!
//! A transaction holds one dedicated connection from `begin` until it is
//! committed, rolled back or closed. Every write issued while it is active
//! records whether it succeeded; commit is refused while any step failed.

use crate::db::connection::DbConnection;
use crate::db::pool::{ConnectionSource, Lease};
use crate::error::{DbError, DbResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

struct ActiveTransaction {
    id: String,
    started_at: DateTime<Utc>,
    outcomes: Vec<bool>,
    lease: Lease,
}

/// Snapshot of the active transaction.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionInfo {
    pub transaction_id: String,
    pub started_at: DateTime<Utc>,
    pub steps: usize,
    pub failed_steps: usize,
}

/// Autocommit by default; holds a connection while a transaction is active.
#[derive(Default)]
pub struct TransactionTracker {
    active: Option<ActiveTransaction>,
}

impl TransactionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.active.as_ref().map(|tx| tx.id.as_str())
    }

    pub fn info(&self) -> Option<TransactionInfo> {
        self.active.as_ref().map(|tx| TransactionInfo {
            transaction_id: tx.id.clone(),
            started_at: tx.started_at,
            steps: tx.outcomes.len(),
            failed_steps: tx.outcomes.iter().filter(|ok| !**ok).count(),
        })
    }

    /// The held connection, when a transaction is active.
    pub fn connection(&mut self) -> Option<&mut DbConnection> {
        self.active.as_mut().map(|tx| &mut *tx.lease)
    }

    /// Acquire a connection and issue `BEGIN`.
    pub async fn begin(&mut self, source: &ConnectionSource, limit: Duration) -> DbResult<String> {
        if let Some(tx) = &self.active {
            return Err(DbError::transaction(
                "A transaction is already active",
                tx.id.clone(),
            ));
        }

        let mut lease = source.lease().await?;
        if let Err(e) = lease.begin(limit).await {
            lease.finish().await;
            return Err(e);
        }

        let id = generate_transaction_id();
        info!(
            transaction_id = %id,
            db_type = %lease.db_type(),
            "Transaction started"
        );
        self.active = Some(ActiveTransaction {
            id: id.clone(),
            started_at: Utc::now(),
            outcomes: Vec::new(),
            lease,
        });
        Ok(id)
    }

    /// Record the outcome of a write. Ignored in autocommit mode.
    pub fn record(&mut self, succeeded: bool) {
        if let Some(tx) = self.active.as_mut() {
            tx.outcomes.push(succeeded);
            debug!(
                transaction_id = %tx.id,
                step = tx.outcomes.len(),
                succeeded = succeeded,
                "Recorded transaction step"
            );
        }
    }

    /// Commit when every recorded step succeeded.
    ///
    /// A failed step leaves the transaction active so the caller can roll it
    /// back. A failed `COMMIT` rolls back and releases the connection.
    pub async fn commit(&mut self, limit: Duration) -> DbResult<()> {
        let Some(tx) = self.active.as_ref() else {
            return Err(DbError::transaction("No active transaction", ""));
        };
        if let Some(step) = tx.outcomes.iter().position(|ok| !ok) {
            return Err(DbError::invalid_input(format!(
                "Transaction {} cannot commit: step {} of {} failed",
                tx.id,
                step + 1,
                tx.outcomes.len()
            )));
        }

        let Some(mut tx) = self.active.take() else {
            return Err(DbError::transaction("No active transaction", ""));
        };
        match tx.lease.commit(limit).await {
            Ok(()) => {
                tx.lease.finish().await;
                info!(
                    transaction_id = %tx.id,
                    steps = tx.outcomes.len(),
                    "Transaction committed"
                );
                Ok(())
            }
            Err(e) => {
                warn!(transaction_id = %tx.id, error = %e, "Commit failed, rolling back");
                let _ = tx.lease.rollback(limit).await;
                tx.lease.finish().await;
                Err(e)
            }
        }
    }

    /// Roll back the active transaction. No-op in autocommit mode.
    pub async fn rollback(&mut self, limit: Duration) -> DbResult<()> {
        let Some(mut tx) = self.active.take() else {
            return Ok(());
        };
        let result = tx.lease.rollback(limit).await;
        tx.lease.finish().await;
        info!(transaction_id = %tx.id, "Transaction rolled back");
        result
    }

    /// Return to autocommit, rolling back whatever is in flight.
    pub async fn close(&mut self, limit: Duration) {
        if let Some(mut tx) = self.active.take() {
            if let Err(e) = tx.lease.rollback(limit).await {
                warn!(transaction_id = %tx.id, error = %e, "Rollback on close failed");
            }
            tx.lease.finish().await;
            debug!(transaction_id = %tx.id, "Transaction closed");
        }
    }
}

impl Drop for TransactionTracker {
    fn drop(&mut self) {
        let Some(mut tx) = self.active.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(
                    transaction_id = %tx.id,
                    "Transaction dropped while active - rolling back"
                );
                handle.spawn(async move {
                    // No statement timeout is configured here; use the default
                    let limit = Duration::from_secs(crate::orm::DEFAULT_STATEMENT_TIMEOUT_SECS);
                    if let Err(e) = tx.lease.rollback(limit).await {
                        warn!(transaction_id = %tx.id, error = %e, "Rollback on drop failed");
                        tx.lease.discard();
                        return;
                    }
                    tx.lease.finish().await;
                });
            }
            Err(_) => {
                warn!(
                    transaction_id = %tx.id,
                    "Transaction dropped outside a runtime - discarding its connection"
                );
                tx.lease.discard();
            }
        }
    }
}

/// Generate a unique transaction ID.
fn generate_transaction_id() -> String {
    format!("tx_{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::pool::ConnectionPool;
    use crate::models::ConnectionConfig;
    use crate::sql::Statement;

    const LIMIT: Duration = Duration::from_secs(5);

    fn direct() -> ConnectionSource {
        ConnectionSource::Direct(ConnectionConfig::new("sqlite::memory:").unwrap())
    }

    async fn count_rows(conn: &mut DbConnection) -> usize {
        let statement = Statement {
            sql: "SELECT v FROM t".to_string(),
            params: Vec::new(),
        };
        conn.fetch(&statement, LIMIT).await.unwrap().len()
    }

    #[test]
    fn test_transaction_id_format() {
        let id = generate_transaction_id();
        assert!(id.starts_with("tx_"));
        assert_eq!(id.len(), 3 + 32); // "tx_" + 32 hex chars
    }

    #[tokio::test]
    async fn test_autocommit_by_default() {
        let mut tracker = TransactionTracker::new();
        assert!(!tracker.is_active());
        assert!(tracker.connection().is_none());
        tracker.record(false);
        assert!(tracker.info().is_none());
        tracker.rollback(LIMIT).await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_without_transaction_fails() {
        let mut tracker = TransactionTracker::new();
        let err = tracker.commit(LIMIT).await.unwrap_err();
        assert!(matches!(err, DbError::Transaction { .. }));
    }

    #[tokio::test]
    async fn test_begin_twice_fails() {
        let source = direct();
        let mut tracker = TransactionTracker::new();
        let id = tracker.begin(&source, LIMIT).await.unwrap();
        assert_eq!(tracker.transaction_id(), Some(id.as_str()));

        let err = tracker.begin(&source, LIMIT).await.unwrap_err();
        assert!(matches!(err, DbError::Transaction { .. }));
        tracker.close(LIMIT).await;
        assert!(!tracker.is_active());
    }

    #[tokio::test]
    async fn test_failed_step_blocks_commit() {
        let source = direct();
        let mut tracker = TransactionTracker::new();
        tracker.begin(&source, LIMIT).await.unwrap();
        tracker.record(true);
        tracker.record(false);

        let info = tracker.info().unwrap();
        assert_eq!(info.steps, 2);
        assert_eq!(info.failed_steps, 1);

        let err = tracker.commit(LIMIT).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
        assert!(tracker.is_active());

        tracker.rollback(LIMIT).await.unwrap();
        assert!(!tracker.is_active());
    }

    #[tokio::test]
    async fn test_commit_and_rollback_on_held_connection() {
        let pool = ConnectionPool::initialize(
            &ConnectionConfig::new("sqlite::memory:").unwrap(),
            1,
            LIMIT,
        )
        .await
        .unwrap();
        let source = ConnectionSource::Pooled(pool.clone());

        {
            let mut lease = source.lease().await.unwrap();
            lease
                .execute_raw("CREATE TABLE t (v INTEGER)", LIMIT)
                .await
                .unwrap();
            lease.finish().await;
        }

        let mut tracker = TransactionTracker::new();
        tracker.begin(&source, LIMIT).await.unwrap();
        assert_eq!(pool.status().leased, 1);
        let conn = tracker.connection().unwrap();
        conn.execute_raw("INSERT INTO t VALUES (1)", LIMIT)
            .await
            .unwrap();
        tracker.record(true);
        tracker.commit(LIMIT).await.unwrap();
        assert_eq!(pool.status().available, 1);

        tracker.begin(&source, LIMIT).await.unwrap();
        let conn = tracker.connection().unwrap();
        conn.execute_raw("INSERT INTO t VALUES (2)", LIMIT)
            .await
            .unwrap();
        tracker.rollback(LIMIT).await.unwrap();

        let mut lease = source.lease().await.unwrap();
        assert_eq!(count_rows(&mut lease).await, 1);
        lease.finish().await;
    }

    #[tokio::test]
    async fn test_drop_rolls_back_and_returns_connection() {
        let pool = ConnectionPool::initialize(
            &ConnectionConfig::new("sqlite::memory:").unwrap(),
            1,
            LIMIT,
        )
        .await
        .unwrap();
        let source = ConnectionSource::Pooled(pool.clone());

        let mut tracker = TransactionTracker::new();
        tracker.begin(&source, LIMIT).await.unwrap();
        drop(tracker);

        let lease = pool.acquire_timeout(LIMIT).await.unwrap();
        assert_eq!(pool.status().discarded, 0);
        lease.release();
    }
}
