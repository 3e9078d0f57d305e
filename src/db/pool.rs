//! Connection pool management.
//!
//! This module provides a fixed-size pool of [`DbConnection`]s opened eagerly at
//! initialization, plus the single-connection mode used when no pool is
//! configured. Handoff is LIFO; callers wait on a semaphore when the pool is
//! exhausted, bounded by the acquire timeout.

use crate::db::connection::DbConnection;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, DatabaseType};
use serde::Serialize;
use std::collections::HashSet;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Default time a caller waits for a free connection.
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

const LEASE_TAKEN: &str = "pooled connection accessed after it was returned";

/// Point-in-time counters for a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub capacity: usize,
    pub available: usize,
    pub leased: usize,
    /// Connections removed from circulation instead of being returned
    pub discarded: usize,
    pub closed: bool,
}

struct PoolState {
    /// LIFO stack of idle connections keyed by their lease id
    available: Vec<(u64, DbConnection)>,
    leased: HashSet<u64>,
    discarded: usize,
    closed: bool,
}

struct PoolInner {
    id: u64,
    db_type: DatabaseType,
    capacity: usize,
    acquire_timeout: Duration,
    state: Mutex<PoolState>,
    /// One permit per available connection
    permits: Semaphore,
}

impl PoolInner {
    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Put a leased connection back on the stack, or close it if the pool no
    /// longer knows the lease.
    fn give_back(&self, lease_id: u64, conn: DbConnection) {
        let mut state = self.state();
        if state.closed || !state.leased.remove(&lease_id) {
            drop(state);
            debug!(pool_id = self.id, lease_id, "Closing connection returned to a shut down pool");
            dispose(conn);
            return;
        }
        state.available.push((lease_id, conn));
        drop(state);
        self.permits.add_permits(1);
        debug!(pool_id = self.id, lease_id, "Connection returned to pool");
    }

    fn discard(&self, lease_id: u64, conn: DbConnection) {
        let mut state = self.state();
        if state.leased.remove(&lease_id) {
            state.discarded += 1;
        }
        drop(state);
        warn!(pool_id = self.id, lease_id, "Connection discarded from pool");
        dispose(conn);
    }
}

/// Close a connection in the background when a runtime is available.
fn dispose(conn: DbConnection) {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(async move {
            if let Err(e) = conn.close().await {
                debug!(error = %e, "Failed to close connection");
            }
        });
    }
}

/// Fixed-size connection pool.
///
/// Cloning is cheap and every clone refers to the same set of connections.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Open `size` connections up front.
    ///
    /// If any connection fails to open, the ones already opened are closed and
    /// the error is returned.
    pub async fn initialize(
        config: &ConnectionConfig,
        size: usize,
        acquire_timeout: Duration,
    ) -> DbResult<Self> {
        if config.connection_string.trim().is_empty() {
            return Err(DbError::invalid_input("Connection string cannot be empty"));
        }
        if size < 1 {
            return Err(DbError::invalid_input(format!(
                "Pool size must be at least 1, got {}",
                size
            )));
        }

        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        let mut available = Vec::with_capacity(size);
        for lease_id in 1..=size as u64 {
            match DbConnection::connect(config).await {
                Ok(conn) => available.push((lease_id, conn)),
                Err(e) => {
                    warn!(
                        pool_id = id,
                        opened = available.len(),
                        requested = size,
                        error = %e,
                        "Pool initialization failed"
                    );
                    for (_, conn) in available {
                        let _ = conn.close().await;
                    }
                    return Err(e);
                }
            }
        }

        info!(
            pool_id = id,
            db_type = %config.db_type,
            url = %config.masked_connection_string(),
            size = size,
            "Connection pool initialized"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                id,
                db_type: config.db_type,
                capacity: size,
                acquire_timeout,
                state: Mutex::new(PoolState {
                    available,
                    leased: HashSet::new(),
                    discarded: 0,
                    closed: false,
                }),
                permits: Semaphore::new(size),
            }),
        })
    }

    pub fn db_type(&self) -> DatabaseType {
        self.inner.db_type
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Lease a connection, waiting up to the pool's acquire timeout.
    pub async fn acquire(&self) -> DbResult<PooledConnection> {
        self.acquire_timeout(self.inner.acquire_timeout).await
    }

    /// Lease a connection, waiting up to `limit` for one to become free.
    pub async fn acquire_timeout(&self, limit: Duration) -> DbResult<PooledConnection> {
        let permit = match timeout(limit, self.inner.permits.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(closed_error()),
            Err(_) => {
                warn!(pool_id = self.inner.id, "Timed out waiting for a pooled connection");
                return Err(DbError::timeout_after("connection pool acquire", limit));
            }
        };
        // Permits are re-added by hand when a connection comes back
        permit.forget();

        let mut state = self.inner.state();
        if state.closed {
            return Err(closed_error());
        }
        let (lease_id, conn) = state.available.pop().ok_or_else(|| {
            DbError::internal("Pool granted a permit without an available connection")
        })?;
        state.leased.insert(lease_id);
        drop(state);

        debug!(pool_id = self.inner.id, lease_id, "Connection leased");
        Ok(PooledConnection {
            pool: Arc::clone(&self.inner),
            lease_id,
            conn: Some(conn),
        })
    }

    /// Return a lease to this pool.
    pub fn release(&self, lease: PooledConnection) -> DbResult<()> {
        if !Arc::ptr_eq(&lease.pool, &self.inner) {
            return Err(DbError::invalid_input(format!(
                "Connection belongs to pool {}, not pool {}",
                lease.pool.id, self.inner.id
            )));
        }
        lease.release();
        Ok(())
    }

    /// Close every pooled connection. Leases returned afterwards are closed
    /// instead of pooled, and `acquire` fails.
    pub async fn shutdown(&self) {
        let connections = {
            let mut state = self.inner.state();
            if state.closed {
                return;
            }
            state.closed = true;
            state.leased.clear();
            std::mem::take(&mut state.available)
        };
        self.inner.permits.close();

        let count = connections.len();
        for (lease_id, conn) in connections {
            if let Err(e) = conn.close().await {
                warn!(pool_id = self.inner.id, lease_id, error = %e, "Failed to close pooled connection");
            }
        }
        info!(pool_id = self.inner.id, closed = count, "Connection pool shut down");
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state();
        PoolStatus {
            capacity: self.inner.capacity,
            available: state.available.len(),
            leased: state.leased.len(),
            discarded: state.discarded,
            closed: state.closed,
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("id", &self.inner.id)
            .field("db_type", &self.inner.db_type)
            .field("status", &self.status())
            .finish()
    }
}

fn closed_error() -> DbError {
    DbError::connection(
        "Connection pool is closed",
        "Initialize a new pool before issuing further operations",
    )
}

/// A connection leased from a [`ConnectionPool`].
///
/// Dropping the lease returns the connection to its pool.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    lease_id: u64,
    conn: Option<DbConnection>,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("lease_id", &self.lease_id)
            .field("conn", &self.conn)
            .finish_non_exhaustive()
    }
}

impl PooledConnection {
    pub fn lease_id(&self) -> u64 {
        self.lease_id
    }

    /// Return the connection to its pool.
    pub fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.give_back(self.lease_id, conn);
        }
    }

    /// Take the connection out of circulation. The pool shrinks by one.
    pub fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.discard(self.lease_id, conn);
        }
    }
}

impl Deref for PooledConnection {
    type Target = DbConnection;

    fn deref(&self) -> &DbConnection {
        self.conn.as_ref().expect(LEASE_TAKEN)
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut DbConnection {
        self.conn.as_mut().expect(LEASE_TAKEN)
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.give_back(self.lease_id, conn);
        }
    }
}

/// Where operations get their connections from.
#[derive(Debug, Clone)]
pub enum ConnectionSource {
    /// Open a fresh connection per operation and close it afterwards
    Direct(ConnectionConfig),
    /// Lease from a shared pool
    Pooled(ConnectionPool),
}

impl ConnectionSource {
    pub fn db_type(&self) -> DatabaseType {
        match self {
            ConnectionSource::Direct(config) => config.db_type,
            ConnectionSource::Pooled(pool) => pool.db_type(),
        }
    }

    pub async fn lease(&self) -> DbResult<Lease> {
        match self {
            ConnectionSource::Direct(config) => {
                Ok(Lease::Direct(DbConnection::connect(config).await?))
            }
            ConnectionSource::Pooled(pool) => Ok(Lease::Pooled(pool.acquire().await?)),
        }
    }

    pub fn pool_status(&self) -> Option<PoolStatus> {
        match self {
            ConnectionSource::Direct(_) => None,
            ConnectionSource::Pooled(pool) => Some(pool.status()),
        }
    }

    pub async fn shutdown(&self) {
        if let ConnectionSource::Pooled(pool) = self {
            pool.shutdown().await;
        }
    }
}

/// A connection obtained from a [`ConnectionSource`].
pub enum Lease {
    Direct(DbConnection),
    Pooled(PooledConnection),
}

impl Lease {
    /// Close a direct connection or return a pooled one.
    pub async fn finish(self) {
        match self {
            Lease::Direct(conn) => {
                if let Err(e) = conn.close().await {
                    debug!(error = %e, "Failed to close connection");
                }
            }
            Lease::Pooled(conn) => conn.release(),
        }
    }

    /// Drop the connection without returning it for reuse.
    pub fn discard(self) {
        match self {
            Lease::Direct(conn) => drop(conn),
            Lease::Pooled(conn) => conn.discard(),
        }
    }
}

impl Deref for Lease {
    type Target = DbConnection;

    fn deref(&self) -> &DbConnection {
        match self {
            Lease::Direct(conn) => conn,
            Lease::Pooled(conn) => conn,
        }
    }
}

impl DerefMut for Lease {
    fn deref_mut(&mut self) -> &mut DbConnection {
        match self {
            Lease::Direct(conn) => conn,
            Lease::Pooled(conn) => conn,
        }
    }
}
