//! Graph schema: node and relationship tables, created idempotently.
//!
//! Nodes: `memory`, `entity`, `session`, `archived_memory`.
//! Relationships: `mentions`, `relates_to`, `belongs_to_session`,
//! `consolidated_into`. Edges are stored by id only; traversal is bounded
//! by a hop limit at query time, so cycles through correction loops are
//! harmless.
//!
//! The schema version lives in `user_version`. Opening a database stamped
//! with a newer version than this build supports fails with
//! `SchemaMismatch` and a migration hint.

use crate::{Error, Result};
use rusqlite::Connection;

/// Newest schema version this build understands.
pub const SCHEMA_VERSION: i32 = 1;

/// Hop limit for relationship traversals.
pub const TRAVERSAL_HOP_LIMIT: u32 = 2;

const SCHEMA_DDL: &str = "
CREATE TABLE IF NOT EXISTS memory (
    id            TEXT PRIMARY KEY,
    content       TEXT NOT NULL,
    content_hash  TEXT NOT NULL,
    memory_type   TEXT NOT NULL,
    source_type   TEXT NOT NULL,
    importance    REAL NOT NULL DEFAULT 0.5,
    confidence    REAL NOT NULL DEFAULT 1.0,
    created_at    INTEGER NOT NULL,
    valid_from    INTEGER NOT NULL,
    valid_to      INTEGER,
    accessed_at   INTEGER,
    access_count  INTEGER NOT NULL DEFAULT 0,
    agent_id      TEXT,
    user_id       TEXT,
    session_id    TEXT,
    metadata      TEXT
);
CREATE INDEX IF NOT EXISTS idx_memory_content_hash ON memory(content_hash);
CREATE INDEX IF NOT EXISTS idx_memory_created_at   ON memory(created_at);
CREATE INDEX IF NOT EXISTS idx_memory_type         ON memory(memory_type);
CREATE INDEX IF NOT EXISTS idx_memory_valid_to     ON memory(valid_to);

CREATE TABLE IF NOT EXISTS entity (
    id              TEXT PRIMARY KEY,
    entity_type     TEXT NOT NULL,
    normalized_text TEXT NOT NULL,
    display_text    TEXT NOT NULL,
    UNIQUE (entity_type, normalized_text)
);

CREATE TABLE IF NOT EXISTS session (
    id         TEXT PRIMARY KEY,
    started_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS archived_memory (
    archive_id  TEXT PRIMARY KEY,
    original_id TEXT NOT NULL,
    content     TEXT NOT NULL,
    memory_type TEXT NOT NULL,
    source_type TEXT NOT NULL,
    importance  REAL NOT NULL,
    created_at  INTEGER NOT NULL,
    archived_at INTEGER NOT NULL,
    expires_at  INTEGER NOT NULL,
    prune_score REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_archive_expires_at ON archived_memory(expires_at);

CREATE TABLE IF NOT EXISTS mentions (
    memory_id TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    PRIMARY KEY (memory_id, entity_id)
);
CREATE INDEX IF NOT EXISTS idx_mentions_entity ON mentions(entity_id);

CREATE TABLE IF NOT EXISTS relates_to (
    from_id    TEXT NOT NULL,
    to_id      TEXT NOT NULL,
    relation   TEXT NOT NULL DEFAULT 'update',
    created_at INTEGER NOT NULL,
    PRIMARY KEY (from_id, to_id)
);

CREATE TABLE IF NOT EXISTS belongs_to_session (
    memory_id  TEXT NOT NULL,
    session_id TEXT NOT NULL,
    PRIMARY KEY (memory_id, session_id)
);

CREATE TABLE IF NOT EXISTS consolidated_into (
    member_id  TEXT NOT NULL,
    summary_id TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (member_id, summary_id)
);
";

/// Reads the schema version stamped on the database.
pub fn read_version(conn: &Connection) -> Result<i32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| Error::Storage {
            operation: "read_schema_version".to_string(),
            cause: e.to_string(),
        })
}

/// Creates the schema if absent and stamps the version.
///
/// Idempotent: re-running against an initialized database is a no-op.
/// Fails with `SchemaMismatch` when the database was written by a newer
/// build.
pub fn ensure_schema(conn: &Connection) -> Result<()> {
    let found = read_version(conn)?;
    if found > SCHEMA_VERSION {
        return Err(Error::SchemaMismatch {
            found,
            supported: SCHEMA_VERSION,
        });
    }

    conn.execute_batch(SCHEMA_DDL).map_err(|e| Error::Storage {
        operation: "create_schema".to_string(),
        cause: e.to_string(),
    })?;

    if found < SCHEMA_VERSION {
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .map_err(|e| Error::Storage {
                operation: "stamp_schema_version".to_string(),
                cause: e.to_string(),
            })?;
        tracing::info!(version = SCHEMA_VERSION, "schema created");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        ensure_schema(&conn).unwrap();
        assert_eq!(read_version(&conn).unwrap(), SCHEMA_VERSION);

        // All node and relationship tables exist
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                 ('memory', 'entity', 'session', 'archived_memory',
                  'mentions', 'relates_to', 'belongs_to_session', 'consolidated_into')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 8);
    }

    #[test]
    fn test_newer_version_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 5)
            .unwrap();
        let err = ensure_schema(&conn).unwrap_err();
        assert!(matches!(
            err,
            Error::SchemaMismatch { found, supported }
                if found == SCHEMA_VERSION + 5 && supported == SCHEMA_VERSION
        ));
    }
}
