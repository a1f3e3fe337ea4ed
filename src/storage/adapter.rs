//! Graph adapter: safe, shared access to the embedded database.
//!
//! Owns a refcounted registration in the shared-database registry, a
//! bounded connection pool, and the retry policy for transient write-lock
//! contention. The embedded engine permits one write transaction at a
//! time; sibling processes pointed at the same path rely on the engine's
//! own file locking plus this adapter's retry-with-jitter to make
//! progress under contention.

use super::{pool::ConnectionPool, registry, schema};
use crate::config::KuzuMemoryConfig;
use crate::{Error, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Thread-local xorshift for retry jitter. Keeps sibling processes from
/// retrying in lockstep without pulling in an RNG dependency.
#[allow(clippy::cast_possible_truncation)]
fn jitter_ms(max: u64) -> u64 {
    use std::cell::Cell;
    use std::time::{SystemTime, UNIX_EPOCH};

    thread_local! {
        static STATE: Cell<u64> = Cell::new(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0x9e37_79b9)
                | 1,
        );
    }

    if max == 0 {
        return 0;
    }
    STATE.with(|state| {
        let mut x = state.get();
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        state.set(x);
        x % max
    })
}

/// Returns true for engine errors caused by transient write contention.
fn is_transient(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(ffi, _) => matches!(
            ffi.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        ),
        _ => false,
    }
}

/// Adapter over one on-disk database path.
///
/// Cheap to share behind an `Arc`; `close` (or drop) releases this
/// adapter's reference on the shared handle.
#[derive(Debug)]
pub struct GraphAdapter {
    canonical_path: PathBuf,
    pool: ConnectionPool,
    max_retries: u32,
    retry_backoff_ms: u64,
    query_timeout_ms: u64,
    closed: AtomicBool,
}

impl GraphAdapter {
    /// Opens the database at `path`, creating the schema when absent.
    ///
    /// Idempotent per path: every open of an already-registered path reuses
    /// the shared handle and increments its refcount.
    pub fn open(path: &Path, config: &KuzuMemoryConfig) -> Result<Self> {
        config.validate()?;
        let canonical_path = registry::canonical_db_path(path)?;
        registry::acquire(&canonical_path);

        let pool = match ConnectionPool::open(&canonical_path, config.storage.clone()) {
            Ok(pool) => pool,
            Err(e) => {
                registry::release(&canonical_path);
                return Err(e);
            },
        };

        if !registry::schema_ready(&canonical_path) {
            if let Err(e) = pool.with_connection(|conn| schema::ensure_schema(conn)) {
                pool.close();
                registry::release(&canonical_path);
                return Err(e);
            }
            registry::mark_schema_ready(&canonical_path);
        }

        tracing::debug!(
            path = %canonical_path.display(),
            refcount = registry::refcount(&canonical_path),
            "graph adapter opened"
        );

        Ok(Self {
            canonical_path,
            pool,
            max_retries: config.storage.max_retries,
            retry_backoff_ms: config.storage.retry_backoff_ms,
            query_timeout_ms: config.storage.query_timeout_ms,
            closed: AtomicBool::new(false),
        })
    }

    /// The canonical database path this adapter is bound to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.canonical_path
    }

    /// Refcount on the shared handle for this adapter's path.
    #[must_use]
    pub fn shared_refcount(&self) -> usize {
        registry::refcount(&self.canonical_path)
    }

    /// Scoped access to a pooled connection; released on all exit paths.
    pub fn with_connection<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        self.pool.with_connection(f)
    }

    /// Runs `f` with retry on transient write contention and a per-call
    /// time budget.
    ///
    /// Only errors classified as transient (busy/locked) are retried, with
    /// `retry_backoff_ms * 2^attempt + jitter` between attempts. A spent
    /// retry budget surfaces as `WriteConflict`; a spent time budget as
    /// `QueryTimeout`. Everything else surfaces immediately.
    pub fn execute<T>(
        &self,
        operation: &str,
        mut f: impl FnMut(&mut Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let start = Instant::now();
        let budget = Duration::from_millis(self.query_timeout_ms);
        let mut attempt: u32 = 0;

        loop {
            if start.elapsed() >= budget {
                metrics::counter!("storage_query_timeout_total").increment(1);
                return Err(Error::QueryTimeout {
                    operation: operation.to_string(),
                    timeout_ms: self.query_timeout_ms,
                });
            }

            let result = self.pool.with_connection(|conn| {
                f(conn).map_err(|e| {
                    if is_transient(&e) {
                        Error::WriteConflict {
                            operation: operation.to_string(),
                            attempts: attempt + 1,
                            cause: e.to_string(),
                        }
                    } else {
                        Error::Storage {
                            operation: operation.to_string(),
                            cause: e.to_string(),
                        }
                    }
                })
            });

            match result {
                Ok(value) => return Ok(value),
                Err(Error::WriteConflict {
                    operation: op,
                    attempts,
                    cause,
                }) => {
                    if attempt >= self.max_retries {
                        metrics::counter!("storage_write_conflicts_total").increment(1);
                        tracing::warn!(
                            operation = %op,
                            attempts,
                            "write contention survived the retry budget"
                        );
                        return Err(Error::WriteConflict {
                            operation: op,
                            attempts,
                            cause,
                        });
                    }
                    let backoff = self
                        .retry_backoff_ms
                        .saturating_mul(1_u64 << attempt.min(16));
                    let sleep_ms = backoff + jitter_ms(backoff.max(1));
                    tracing::debug!(
                        operation = %op,
                        attempt = attempt + 1,
                        sleep_ms,
                        "retrying after write contention"
                    );
                    metrics::counter!("storage_retries_total").increment(1);
                    std::thread::sleep(Duration::from_millis(sleep_ms));
                    attempt += 1;
                },
                Err(e) => return Err(e),
            }
        }
    }

    /// Decrements the shared-handle refcount; the handle is torn down when
    /// the count reaches zero. Safe to call more than once.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.pool.close();
        let remaining = registry::release(&self.canonical_path);
        tracing::debug!(
            path = %self.canonical_path.display(),
            remaining,
            "graph adapter closed"
        );
    }
}

impl Drop for GraphAdapter {
    fn drop(&mut self) {
        self.close();
    }
}
