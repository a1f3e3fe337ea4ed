//! Process-wide shared-database registry.
//!
//! Several independent consumers (and, through the embedded engine's own
//! file locking, sibling processes) may point at the same on-disk database.
//! Within one process, every open of a path must reuse the same underlying
//! handle: the registry keys handles by canonical path and reference-counts
//! them. The handle is created lazily on first open and torn down on last
//! close.

use crate::{Error, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One registered database path.
#[derive(Debug)]
struct RegistryEntry {
    refcount: usize,
    /// Set once the schema has been verified/created for this path in this
    /// process, so later opens skip the DDL round-trip.
    schema_ready: bool,
}

static REGISTRY: Lazy<Mutex<HashMap<PathBuf, RegistryEntry>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn lock_registry() -> std::sync::MutexGuard<'static, HashMap<PathBuf, RegistryEntry>> {
    match REGISTRY.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("shared-database registry mutex was poisoned, recovering");
            metrics::counter!("storage_registry_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Canonicalizes a database file path, creating parent directories so the
/// canonical form exists even before the engine writes the file.
pub fn canonical_db_path(path: &Path) -> Result<PathBuf> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| Error::DatabaseUnavailable {
        path: path.display().to_string(),
        cause: format!("cannot create parent directory: {e}"),
    })?;
    let canonical_parent = parent
        .canonicalize()
        .map_err(|e| Error::DatabaseUnavailable {
            path: path.display().to_string(),
            cause: e.to_string(),
        })?;
    let file_name = path.file_name().ok_or_else(|| Error::DatabaseUnavailable {
        path: path.display().to_string(),
        cause: "path has no file name".to_string(),
    })?;
    Ok(canonical_parent.join(file_name))
}

/// Registers an open of `canonical_path`, incrementing its refcount.
///
/// Returns true if this was the first open for the path (the caller is
/// responsible for schema verification in that case).
pub fn acquire(canonical_path: &Path) -> bool {
    let mut registry = lock_registry();
    let entry = registry
        .entry(canonical_path.to_path_buf())
        .or_insert(RegistryEntry {
            refcount: 0,
            schema_ready: false,
        });
    entry.refcount += 1;
    let first = entry.refcount == 1;
    tracing::debug!(
        path = %canonical_path.display(),
        refcount = entry.refcount,
        "shared database acquired"
    );
    first
}

/// Marks the schema verified for a path, so later opens skip DDL.
pub fn mark_schema_ready(canonical_path: &Path) {
    let mut registry = lock_registry();
    if let Some(entry) = registry.get_mut(canonical_path) {
        entry.schema_ready = true;
    }
}

/// Returns true if a previous open already verified the schema.
pub fn schema_ready(canonical_path: &Path) -> bool {
    lock_registry()
        .get(canonical_path)
        .is_some_and(|e| e.schema_ready)
}

/// Registers a close, decrementing the refcount. The entry is removed when
/// the count reaches zero, releasing the handle for the path.
///
/// Returns the refcount after the decrement.
pub fn release(canonical_path: &Path) -> usize {
    let mut registry = lock_registry();
    let Some(entry) = registry.get_mut(canonical_path) else {
        tracing::warn!(
            path = %canonical_path.display(),
            "release for a path that was never acquired"
        );
        return 0;
    };
    entry.refcount = entry.refcount.saturating_sub(1);
    let remaining = entry.refcount;
    if remaining == 0 {
        registry.remove(canonical_path);
        tracing::debug!(
            path = %canonical_path.display(),
            "shared database handle released"
        );
    }
    remaining
}

/// Current refcount for a path; 0 if unregistered.
#[must_use]
pub fn refcount(canonical_path: &Path) -> usize {
    lock_registry()
        .get(canonical_path)
        .map_or(0, |e| e.refcount)
}
