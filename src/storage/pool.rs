//! Bounded connection pool over the embedded engine.
//!
//! Connections are single-threaded: the pool checks out one connection at a
//! time and callers scope their use with [`ConnectionPool::with_connection`],
//! which guarantees release on all exit paths. The pool never creates more
//! than `max_connections`; when every connection is checked out,
//! acquisition waits up to `connection_timeout_ms` and then fails with
//! `PoolExhausted`.

use crate::config::StorageConfig;
use crate::{Error, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Applies the engine pragmas every pooled connection needs: WAL (when
/// configured), relaxed synchronous mode, and a busy timeout so lock
/// contention waits instead of failing immediately.
fn configure_connection(conn: &Connection, config: &StorageConfig) -> Result<()> {
    if config.use_write_ahead_log {
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
    }
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
    let _ = conn.pragma_update(None, "foreign_keys", "ON");
    Ok(())
}

#[derive(Debug)]
struct PoolInner {
    idle: Vec<Connection>,
    /// Connections in existence, idle or checked out.
    total: usize,
    closed: bool,
}

/// Bounded pool of connections to one database path.
pub struct ConnectionPool {
    path: PathBuf,
    config: StorageConfig,
    inner: Mutex<PoolInner>,
    available: Condvar,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("path", &self.path)
            .field("max_connections", &self.config.max_connections)
            .finish_non_exhaustive()
    }
}

impl ConnectionPool {
    /// Opens a pool, eagerly creating `connection_pool_size` connections.
    pub fn open(path: &Path, config: StorageConfig) -> Result<Self> {
        let mut idle = Vec::new();
        let eager = config.connection_pool_size.min(config.max_connections);
        for _ in 0..eager {
            idle.push(Self::new_connection(path, &config)?);
        }
        let total = idle.len();
        Ok(Self {
            path: path.to_path_buf(),
            config,
            inner: Mutex::new(PoolInner {
                idle,
                total,
                closed: false,
            }),
            available: Condvar::new(),
        })
    }

    fn new_connection(path: &Path, config: &StorageConfig) -> Result<Connection> {
        let conn = Connection::open(path).map_err(|e| Error::DatabaseUnavailable {
            path: path.display().to_string(),
            cause: e.to_string(),
        })?;
        configure_connection(&conn, config)?;
        Ok(conn)
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, PoolInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("connection pool mutex was poisoned, recovering");
                metrics::counter!("storage_pool_poison_recovery_total").increment(1);
                poisoned.into_inner()
            },
        }
    }

    /// Checks out a connection, waiting up to the configured timeout.
    fn acquire(&self) -> Result<Connection> {
        let deadline = Instant::now() + Duration::from_millis(self.config.connection_timeout_ms);
        let start = Instant::now();
        let mut inner = self.lock_inner();

        loop {
            if inner.closed {
                return Err(Error::Storage {
                    operation: "acquire_connection".to_string(),
                    cause: "pool is closed".to_string(),
                });
            }
            if let Some(conn) = inner.idle.pop() {
                return Ok(conn);
            }
            if inner.total < self.config.max_connections {
                inner.total += 1;
                // Open outside the lock so a slow open does not stall peers.
                drop(inner);
                match Self::new_connection(&self.path, &self.config) {
                    Ok(conn) => return Ok(conn),
                    Err(e) => {
                        let mut inner = self.lock_inner();
                        inner.total -= 1;
                        self.available.notify_one();
                        drop(inner);
                        return Err(e);
                    },
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                let waited_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                metrics::counter!("storage_pool_exhausted_total").increment(1);
                return Err(Error::PoolExhausted { waited_ms });
            }
            let (guard, timeout) = match self.available.wait_timeout(inner, remaining) {
                Ok(pair) => pair,
                Err(poisoned) => {
                    tracing::warn!("connection pool condvar wait recovered from poison");
                    let pair = poisoned.into_inner();
                    (pair.0, pair.1)
                },
            };
            inner = guard;
            if timeout.timed_out() && inner.idle.is_empty() {
                let waited_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                metrics::counter!("storage_pool_exhausted_total").increment(1);
                return Err(Error::PoolExhausted { waited_ms });
            }
        }
    }

    fn release_connection(&self, conn: Connection) {
        let mut inner = self.lock_inner();
        if inner.closed {
            inner.total -= 1;
        } else {
            inner.idle.push(conn);
        }
        drop(inner);
        self.available.notify_one();
    }

    /// Runs `f` with a checked-out connection, releasing it on every exit
    /// path, including when `f` fails.
    pub fn with_connection<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let wait_start = Instant::now();
        let mut conn = self.acquire()?;
        metrics::histogram!("storage_pool_wait_ms")
            .record(u64::try_from(wait_start.elapsed().as_millis()).unwrap_or(u64::MAX) as f64);
        let result = f(&mut conn);
        self.release_connection(conn);
        result
    }

    /// Closes the pool: drops idle connections and refuses new checkouts.
    pub fn close(&self) {
        let mut inner = self.lock_inner();
        inner.closed = true;
        let dropped = inner.idle.len();
        inner.total -= dropped;
        inner.idle.clear();
        drop(inner);
        self.available.notify_all();
        tracing::debug!(path = %self.path.display(), dropped, "connection pool closed");
    }

    /// Number of connections currently in existence.
    #[must_use]
    pub fn total_connections(&self) -> usize {
        self.lock_inner().total
    }
}
