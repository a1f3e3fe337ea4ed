//! Project-scoped path resolution.
//!
//! A project's memories live in `<project-root>/.kuzu-memory/memories.db`.
//! Resolution order for the database path:
//!
//! 1. `KUZU_MEMORY_DB` — explicit database path override.
//! 2. `KUZU_MEMORY_PROJECT` / `KUZU_MEMORY_PROJECT_ROOT` — project root
//!    override; the standard layout is appended.
//! 3. Walk up from the working directory to the nearest directory holding
//!    a project marker (`.git`, `Cargo.toml`, `package.json`,
//!    `pyproject.toml`, or an existing `.kuzu-memory`).
//! 4. The working directory itself.
//!
//! `KUZU_MEMORY_MODE` is an advisory tag consumed by adapters; the core
//! ignores it.

use std::path::{Path, PathBuf};

/// Environment variable overriding the database path.
pub const DB_PATH_ENV: &str = "KUZU_MEMORY_DB";

/// Environment variable overriding the project root.
pub const PROJECT_ENV: &str = "KUZU_MEMORY_PROJECT";

/// Alternate spelling of the project root override.
pub const PROJECT_ROOT_ENV: &str = "KUZU_MEMORY_PROJECT_ROOT";

/// Directory name of the per-project memory state.
pub const STATE_DIR_NAME: &str = ".kuzu-memory";

/// Database directory name inside the state directory.
pub const DB_DIR_NAME: &str = "memories.db";

/// Per-project config file name inside the state directory.
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Files and directories that mark a project root.
const PROJECT_MARKERS: &[&str] = &[
    STATE_DIR_NAME,
    ".git",
    "Cargo.toml",
    "package.json",
    "pyproject.toml",
];

/// Returns the standard database path under a project root.
#[must_use]
pub fn db_path_for_root(project_root: &Path) -> PathBuf {
    project_root.join(STATE_DIR_NAME).join(DB_DIR_NAME)
}

/// Returns the per-project config path under a project root.
#[must_use]
pub fn config_path_for_root(project_root: &Path) -> PathBuf {
    project_root.join(STATE_DIR_NAME).join(CONFIG_FILE_NAME)
}

/// Finds the project root by walking up from `start` to the nearest
/// directory containing a project marker. Falls back to `start`.
#[must_use]
pub fn find_project_root(start: &Path) -> PathBuf {
    let mut current = Some(start);
    while let Some(dir) = current {
        if PROJECT_MARKERS.iter().any(|m| dir.join(m).exists()) {
            return dir.to_path_buf();
        }
        current = dir.parent();
    }
    start.to_path_buf()
}

/// Resolves the database path from the environment and the working
/// directory, per the order documented at module level.
#[must_use]
pub fn resolve_db_path(cwd: &Path) -> PathBuf {
    if let Ok(db) = std::env::var(DB_PATH_ENV) {
        if !db.trim().is_empty() {
            return PathBuf::from(db);
        }
    }
    for env in [PROJECT_ENV, PROJECT_ROOT_ENV] {
        if let Ok(root) = std::env::var(env) {
            if !root.trim().is_empty() {
                return db_path_for_root(Path::new(&root));
            }
        }
    }
    db_path_for_root(&find_project_root(cwd))
}
