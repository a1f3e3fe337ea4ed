//! Memory store: CRUD and batch operations over memory records, entities,
//! sessions, edges, and archives.
//!
//! Enforces content-hash uniqueness across live memories, retention
//! expiry, and access-count bookkeeping. All timestamps are persisted as
//! Unix-epoch milliseconds so range scans stay plain integer comparisons.

use super::{Generation, GraphAdapter, schema::TRAVERSAL_HOP_LIMIT};
use crate::models::{ArchivedMemory, Memory, MemoryId, MemoryType};
use crate::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::instrument;

/// Separator for entity lists flattened into a single SQL column.
const ENTITY_SEP: char = '\u{1f}';

fn ts(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

fn from_ts(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

const MEMORY_COLUMNS: &str = "m.id, m.content, m.content_hash, m.memory_type, m.source_type, \
     m.importance, m.confidence, m.created_at, m.valid_from, m.valid_to, \
     m.accessed_at, m.access_count, m.agent_id, m.user_id, m.session_id, m.metadata, \
     (SELECT group_concat(e.display_text, char(31)) \
        FROM mentions mn JOIN entity e ON e.id = mn.entity_id \
       WHERE mn.memory_id = m.id)";

fn row_to_memory(row: &Row<'_>) -> rusqlite::Result<Memory> {
    let memory_type: String = row.get(3)?;
    let entities: Option<String> = row.get(16)?;
    Ok(Memory {
        id: MemoryId::new(row.get::<_, String>(0)?),
        content: row.get(1)?,
        content_hash: row.get(2)?,
        memory_type: MemoryType::parse(&memory_type).unwrap_or_default(),
        source_type: row.get(4)?,
        importance: row.get(5)?,
        confidence: row.get(6)?,
        created_at: from_ts(row.get(7)?),
        valid_from: from_ts(row.get(8)?),
        valid_to: row.get::<_, Option<i64>>(9)?.map(from_ts),
        accessed_at: row.get::<_, Option<i64>>(10)?.map(from_ts),
        access_count: row.get(11)?,
        agent_id: row.get(12)?,
        user_id: row.get(13)?,
        session_id: row.get(14)?,
        metadata: row.get(15)?,
        entities: entities
            .map(|joined| joined.split(ENTITY_SEP).map(String::from).collect())
            .unwrap_or_default(),
    })
}

fn row_to_archive(row: &Row<'_>) -> rusqlite::Result<ArchivedMemory> {
    let memory_type: String = row.get(3)?;
    Ok(ArchivedMemory {
        archive_id: row.get(0)?,
        original_id: MemoryId::new(row.get::<_, String>(1)?),
        content: row.get(2)?,
        memory_type: MemoryType::parse(&memory_type).unwrap_or_default(),
        source_type: row.get(4)?,
        importance: row.get(5)?,
        created_at: from_ts(row.get(6)?),
        archived_at: from_ts(row.get(7)?),
        expires_at: from_ts(row.get(8)?),
        prune_score: row.get(9)?,
    })
}

const ARCHIVE_COLUMNS: &str = "archive_id, original_id, content, memory_type, source_type, \
     importance, created_at, archived_at, expires_at, prune_score";

/// Persistent store for memories and their graph neighborhood.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    adapter: Arc<GraphAdapter>,
    generation: Arc<Generation>,
}

impl MemoryStore {
    /// Creates a store over an open adapter.
    #[must_use]
    pub fn new(adapter: Arc<GraphAdapter>, generation: Arc<Generation>) -> Self {
        Self {
            adapter,
            generation,
        }
    }

    /// The adapter backing this store.
    #[must_use]
    pub fn adapter(&self) -> &Arc<GraphAdapter> {
        &self.adapter
    }

    /// The write generation shared with the recall cache.
    #[must_use]
    pub fn generation(&self) -> &Arc<Generation> {
        &self.generation
    }

    // ------------------------------------------------------------------
    // Memory CRUD
    // ------------------------------------------------------------------

    /// Inserts a fully-formed memory; the caller has already resolved
    /// deduplication. Raises `DuplicateContent` when a live memory already
    /// carries this content hash.
    #[instrument(skip(self, memory), fields(memory_id = %memory.id))]
    pub fn store_memory(&self, memory: &Memory) -> Result<MemoryId> {
        if let Some(existing) = self.find_live_by_hash(&memory.content_hash)? {
            return Err(Error::DuplicateContent {
                content_hash: memory.content_hash.clone(),
                existing_id: existing.id.to_string(),
            });
        }
        self.insert_memory_row(memory)?;
        self.generation.bump();
        metrics::counter!("memory_store_inserts_total").increment(1);
        Ok(memory.id.clone())
    }

    fn insert_memory_row(&self, memory: &Memory) -> Result<()> {
        let m = memory.clone();
        self.adapter.execute("store_memory", move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO memory (id, content, content_hash, memory_type, source_type,
                     importance, confidence, created_at, valid_from, valid_to,
                     accessed_at, access_count, agent_id, user_id, session_id, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                params![
                    m.id.as_str(),
                    m.content,
                    m.content_hash,
                    m.memory_type.as_str(),
                    m.source_type,
                    m.importance,
                    m.confidence,
                    ts(m.created_at),
                    ts(m.valid_from),
                    m.valid_to.map(ts),
                    m.accessed_at.map(ts),
                    m.access_count,
                    m.agent_id,
                    m.user_id,
                    m.session_id,
                    m.metadata,
                ],
            )?;

            for entity in &m.entities {
                let normalized = entity.trim().to_lowercase();
                if normalized.is_empty() {
                    continue;
                }
                let entity_id = uuid::Uuid::new_v4().to_string();
                tx.execute(
                    "INSERT INTO entity (id, entity_type, normalized_text, display_text)
                     VALUES (?1, 'mention', ?2, ?3)
                     ON CONFLICT (entity_type, normalized_text) DO NOTHING",
                    params![entity_id, normalized, entity],
                )?;
                tx.execute(
                    "INSERT OR IGNORE INTO mentions (memory_id, entity_id)
                     SELECT ?1, id FROM entity
                      WHERE entity_type = 'mention' AND normalized_text = ?2",
                    params![m.id.as_str(), normalized],
                )?;
            }

            if let Some(session_id) = &m.session_id {
                tx.execute(
                    "INSERT OR IGNORE INTO session (id, started_at) VALUES (?1, ?2)",
                    params![session_id, ts(m.created_at)],
                )?;
                tx.execute(
                    "INSERT OR IGNORE INTO belongs_to_session (memory_id, session_id)
                     VALUES (?1, ?2)",
                    params![m.id.as_str(), session_id],
                )?;
            }

            tx.commit()
        })
    }

    /// Ingestion path: inserts in input order, silently skipping content
    /// already present (in the store or earlier in the batch). Returns the
    /// ids actually inserted, preserving input order; an empty list means
    /// everything was a duplicate.
    #[instrument(skip(self, memories), fields(batch_len = memories.len()))]
    pub fn batch_store_memories(&self, memories: &[Memory]) -> Result<Vec<MemoryId>> {
        let mut inserted = Vec::new();
        let mut seen_hashes: HashSet<String> = HashSet::new();
        for memory in memories {
            if !seen_hashes.insert(memory.content_hash.clone()) {
                continue;
            }
            if self.find_live_by_hash(&memory.content_hash)?.is_some() {
                continue;
            }
            self.insert_memory_row(memory)?;
            inserted.push(memory.id.clone());
        }
        if !inserted.is_empty() {
            self.generation.bump();
            metrics::counter!("memory_store_inserts_total").increment(inserted.len() as u64);
        }
        Ok(inserted)
    }

    /// Fetches a memory by id, live or expired.
    pub fn get_memory_by_id(&self, id: &MemoryId) -> Result<Option<Memory>> {
        let id = id.to_string();
        self.adapter.execute("get_memory_by_id", move |conn| {
            conn.query_row(
                &format!("SELECT {MEMORY_COLUMNS} FROM memory m WHERE m.id = ?1"),
                params![id],
                row_to_memory,
            )
            .optional()
        })
    }

    /// The live memory carrying `content_hash`, if any.
    pub fn find_live_by_hash(&self, content_hash: &str) -> Result<Option<Memory>> {
        let hash = content_hash.to_string();
        let now = ts(Utc::now());
        self.adapter.execute("find_live_by_hash", move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {MEMORY_COLUMNS} FROM memory m
                      WHERE m.content_hash = ?1
                        AND (m.valid_to IS NULL OR m.valid_to > ?2)"
                ),
                params![hash, now],
                row_to_memory,
            )
            .optional()
        })
    }

    /// Most recent live memories, ordered `created_at DESC` (id as the
    /// deterministic tie-break), optionally filtered by type.
    pub fn get_recent_memories(
        &self,
        limit: usize,
        memory_type: Option<MemoryType>,
    ) -> Result<Vec<Memory>> {
        let now = ts(Utc::now());
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let type_filter = memory_type.map(|t| t.as_str().to_string());
        self.adapter.execute("get_recent_memories", move |conn| {
            let sql = format!(
                "SELECT {MEMORY_COLUMNS} FROM memory m
                  WHERE (m.valid_to IS NULL OR m.valid_to > ?1)
                    AND (?2 IS NULL OR m.memory_type = ?2)
                  ORDER BY m.created_at DESC, m.id ASC
                  LIMIT ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![now, type_filter, limit], row_to_memory)?;
            rows.collect()
        })
    }

    /// Every live memory. Maintenance and in-process recall scans use
    /// this; the store is project-scoped, so the live set stays modest.
    pub fn all_live(&self) -> Result<Vec<Memory>> {
        let now = ts(Utc::now());
        self.adapter.execute("all_live", move |conn| {
            let sql = format!(
                "SELECT {MEMORY_COLUMNS} FROM memory m
                  WHERE (m.valid_to IS NULL OR m.valid_to > ?1)
                  ORDER BY m.created_at DESC, m.id ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![now], row_to_memory)?;
            rows.collect()
        })
    }

    /// Number of live memories.
    pub fn count_live(&self) -> Result<u64> {
        let now = ts(Utc::now());
        self.adapter.execute("count_live", move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM memory
                  WHERE valid_to IS NULL OR valid_to > ?1",
                params![now],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| u64::try_from(n).unwrap_or(0))
        })
    }

    /// Live memory counts per type.
    pub fn count_by_type(&self) -> Result<Vec<(String, u64)>> {
        let now = ts(Utc::now());
        self.adapter.execute("count_by_type", move |conn| {
            let mut stmt = conn.prepare(
                "SELECT memory_type, COUNT(*) FROM memory
                  WHERE valid_to IS NULL OR valid_to > ?1
                  GROUP BY memory_type ORDER BY memory_type",
            )?;
            let rows = stmt.query_map(params![now], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    u64::try_from(row.get::<_, i64>(1)?).unwrap_or(0),
                ))
            })?;
            rows.collect()
        })
    }

    /// Live memory counts per source tag.
    pub fn count_by_source(&self) -> Result<Vec<(String, u64)>> {
        let now = ts(Utc::now());
        self.adapter.execute("count_by_source", move |conn| {
            let mut stmt = conn.prepare(
                "SELECT source_type, COUNT(*) FROM memory
                  WHERE valid_to IS NULL OR valid_to > ?1
                  GROUP BY source_type ORDER BY source_type",
            )?;
            let rows = stmt.query_map(params![now], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    u64::try_from(row.get::<_, i64>(1)?).unwrap_or(0),
                ))
            })?;
            rows.collect()
        })
    }

    /// Removes a live memory and its edges. Returns true when a live row
    /// was deleted.
    #[instrument(skip(self))]
    pub fn delete_memory(&self, id: &MemoryId) -> Result<bool> {
        let id_str = id.to_string();
        let now = ts(Utc::now());
        let removed = self.adapter.execute("delete_memory", move |conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "DELETE FROM memory
                  WHERE id = ?1 AND (valid_to IS NULL OR valid_to > ?2)",
                params![id_str, now],
            )?;
            if changed > 0 {
                tx.execute("DELETE FROM mentions WHERE memory_id = ?1", params![id_str])?;
                tx.execute(
                    "DELETE FROM relates_to WHERE from_id = ?1 OR to_id = ?1",
                    params![id_str],
                )?;
                tx.execute(
                    "DELETE FROM belongs_to_session WHERE memory_id = ?1",
                    params![id_str],
                )?;
                // CONSOLIDATED_INTO edges are provenance: they outlive the
                // archived member on purpose
            }
            tx.commit()?;
            Ok(changed > 0)
        })?;
        if removed {
            self.generation.bump();
            metrics::counter!("memory_store_deletes_total").increment(1);
        }
        Ok(removed)
    }

    /// Atomic `access_count += 1; accessed_at = now()` for one memory.
    pub fn update_access(&self, id: &MemoryId) -> Result<()> {
        self.batch_update_access(std::slice::from_ref(id))
    }

    /// Batched access bookkeeping: one write at the end of a recall, one
    /// bump per returned memory. Does not touch the write generation.
    pub fn batch_update_access(&self, ids: &[MemoryId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
        let now = ts(Utc::now());
        self.adapter.execute("update_access", move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "UPDATE memory
                        SET access_count = access_count + 1, accessed_at = ?2
                      WHERE id = ?1",
                )?;
                for id in &ids {
                    stmt.execute(params![id, now])?;
                }
            }
            tx.commit()
        })
    }

    /// Removes memories whose validity window has closed. Returns the
    /// number removed.
    #[instrument(skip(self))]
    pub fn cleanup_expired(&self) -> Result<u64> {
        let now = ts(Utc::now());
        let removed = self.adapter.execute("cleanup_expired", move |conn| {
            conn.execute(
                "DELETE FROM memory WHERE valid_to IS NOT NULL AND valid_to <= ?1",
                params![now],
            )
            .map(|n| n as u64)
        })?;
        if removed > 0 {
            self.generation.bump();
            tracing::info!(removed, "expired memories swept");
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Graph edges
    // ------------------------------------------------------------------

    /// Live memories mentioning any of the given normalized entity forms.
    pub fn memories_mentioning(&self, normalized: &[String]) -> Result<Vec<Memory>> {
        if normalized.is_empty() {
            return Ok(Vec::new());
        }
        let now = ts(Utc::now());
        let placeholders = (0..normalized.len())
            .map(|i| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let forms: Vec<String> = normalized.to_vec();
        self.adapter.execute("memories_mentioning", move |conn| {
            let sql = format!(
                "SELECT DISTINCT {MEMORY_COLUMNS} FROM memory m
                   JOIN mentions mn ON mn.memory_id = m.id
                   JOIN entity e ON e.id = mn.entity_id
                  WHERE (m.valid_to IS NULL OR m.valid_to > ?1)
                    AND e.normalized_text IN ({placeholders})
                  ORDER BY m.created_at DESC, m.id ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut values: Vec<&dyn rusqlite::ToSql> = vec![&now];
            for form in &forms {
                values.push(form);
            }
            let rows = stmt.query_map(values.as_slice(), row_to_memory)?;
            rows.collect()
        })
    }

    /// Live memories grouped under a session, newest first.
    pub fn memories_in_session(&self, session_id: &str) -> Result<Vec<Memory>> {
        let session_id = session_id.to_string();
        let now = ts(Utc::now());
        self.adapter.execute("memories_in_session", move |conn| {
            let sql = format!(
                "SELECT {MEMORY_COLUMNS} FROM memory m
                   JOIN belongs_to_session bs ON bs.memory_id = m.id
                  WHERE (m.valid_to IS NULL OR m.valid_to > ?1)
                    AND bs.session_id = ?2
                  ORDER BY m.created_at DESC, m.id ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![now, session_id], row_to_memory)?;
            rows.collect()
        })
    }

    /// Records a `RELATES_TO` edge, e.g. an update/correction link from a
    /// new memory to the one it supersedes.
    pub fn add_relates_to(&self, from: &MemoryId, to: &MemoryId, relation: &str) -> Result<()> {
        let from = from.to_string();
        let to = to.to_string();
        let relation = relation.to_string();
        let now = ts(Utc::now());
        self.adapter.execute("add_relates_to", move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO relates_to (from_id, to_id, relation, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![from, to, relation, now],
            )
            .map(|_| ())
        })
    }

    /// Ids reachable over `RELATES_TO`, bounded by the traversal hop limit
    /// so correction cycles cannot run away.
    pub fn related_ids(&self, id: &MemoryId) -> Result<Vec<MemoryId>> {
        let id = id.to_string();
        self.adapter.execute("related_ids", move |conn| {
            let mut stmt = conn.prepare(
                "WITH RECURSIVE walk(id, depth) AS (
                     SELECT to_id, 1 FROM relates_to WHERE from_id = ?1
                     UNION
                     SELECT r.to_id, w.depth + 1
                       FROM relates_to r JOIN walk w ON r.from_id = w.id
                      WHERE w.depth < ?2
                 )
                 SELECT DISTINCT id FROM walk ORDER BY id",
            )?;
            let rows = stmt.query_map(params![id, TRAVERSAL_HOP_LIMIT], |row| {
                Ok(MemoryId::new(row.get::<_, String>(0)?))
            })?;
            rows.collect()
        })
    }

    /// Records a `CONSOLIDATED_INTO` edge from a cluster member to its
    /// summary.
    pub fn add_consolidated_into(&self, member: &MemoryId, summary: &MemoryId) -> Result<()> {
        let member = member.to_string();
        let summary = summary.to_string();
        let now = ts(Utc::now());
        self.adapter.execute("add_consolidated_into", move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO consolidated_into (member_id, summary_id, created_at)
                 VALUES (?1, ?2, ?3)",
                params![member, summary, now],
            )
            .map(|_| ())
        })
    }

    /// Member ids consolidated into a summary.
    pub fn consolidated_members(&self, summary: &MemoryId) -> Result<Vec<MemoryId>> {
        let summary = summary.to_string();
        self.adapter.execute("consolidated_members", move |conn| {
            let mut stmt = conn.prepare(
                "SELECT member_id FROM consolidated_into
                  WHERE summary_id = ?1 ORDER BY member_id",
            )?;
            let rows = stmt.query_map(params![summary], |row| {
                Ok(MemoryId::new(row.get::<_, String>(0)?))
            })?;
            rows.collect()
        })
    }

    /// Number of distinct entities in the graph.
    pub fn entity_count(&self) -> Result<u64> {
        self.adapter.execute("entity_count", |conn| {
            conn.query_row("SELECT COUNT(*) FROM entity", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| u64::try_from(n).unwrap_or(0))
        })
    }

    /// Deletes edges whose endpoint node no longer exists. Entities
    /// themselves are kept; only dangling edges go. Returns edges removed.
    pub fn delete_orphan_edges(&self) -> Result<u64> {
        self.adapter.execute("delete_orphan_edges", |conn| {
            let tx = conn.transaction()?;
            let mut removed = 0_usize;
            removed += tx.execute(
                "DELETE FROM mentions
                  WHERE memory_id NOT IN (SELECT id FROM memory)
                     OR entity_id NOT IN (SELECT id FROM entity)",
                [],
            )?;
            removed += tx.execute(
                "DELETE FROM relates_to
                  WHERE from_id NOT IN (SELECT id FROM memory)
                     OR to_id NOT IN (SELECT id FROM memory)",
                [],
            )?;
            removed += tx.execute(
                "DELETE FROM belongs_to_session
                  WHERE memory_id NOT IN (SELECT id FROM memory)
                     OR session_id NOT IN (SELECT id FROM session)",
                [],
            )?;
            tx.commit()?;
            Ok(removed as u64)
        })
    }

    /// Deletes entities with zero `MENTIONS` edges.
    ///
    /// Regular orphan cleanup leaves entities alone; this is the
    /// separately-requested pass that removes the unreferenced ones.
    /// Returns entities removed.
    pub fn delete_orphan_entities(&self) -> Result<u64> {
        self.adapter.execute("delete_orphan_entities", |conn| {
            conn.execute(
                "DELETE FROM entity
                  WHERE id NOT IN (SELECT entity_id FROM mentions)",
                [],
            )
            .map(|n| n as u64)
        })
    }

    // ------------------------------------------------------------------
    // Archives
    // ------------------------------------------------------------------

    /// Writes an archive tombstone.
    pub fn insert_archive(&self, archive: &ArchivedMemory) -> Result<()> {
        let a = archive.clone();
        self.adapter.execute("insert_archive", move |conn| {
            conn.execute(
                "INSERT INTO archived_memory (archive_id, original_id, content, memory_type,
                     source_type, importance, created_at, archived_at, expires_at, prune_score)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    a.archive_id,
                    a.original_id.as_str(),
                    a.content,
                    a.memory_type.as_str(),
                    a.source_type,
                    a.importance,
                    ts(a.created_at),
                    ts(a.archived_at),
                    ts(a.expires_at),
                    a.prune_score,
                ],
            )
            .map(|_| ())
        })
    }

    /// Fetches an archive tombstone by id.
    pub fn get_archive(&self, archive_id: &str) -> Result<Option<ArchivedMemory>> {
        let archive_id = archive_id.to_string();
        self.adapter.execute("get_archive", move |conn| {
            conn.query_row(
                &format!("SELECT {ARCHIVE_COLUMNS} FROM archived_memory WHERE archive_id = ?1"),
                params![archive_id],
                row_to_archive,
            )
            .optional()
        })
    }

    /// Most recent archives first.
    pub fn list_archives(&self, limit: usize) -> Result<Vec<ArchivedMemory>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.adapter.execute("list_archives", move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ARCHIVE_COLUMNS} FROM archived_memory
                  ORDER BY archived_at DESC, archive_id ASC LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit], row_to_archive)?;
            rows.collect()
        })
    }

    /// Removes an archive tombstone. Returns true when a row was deleted.
    pub fn delete_archive(&self, archive_id: &str) -> Result<bool> {
        let archive_id = archive_id.to_string();
        self.adapter.execute("delete_archive", move |conn| {
            conn.execute(
                "DELETE FROM archived_memory WHERE archive_id = ?1",
                params![archive_id],
            )
            .map(|n| n > 0)
        })
    }

    /// Deletes archives past their purge deadline. Returns the number
    /// purged.
    pub fn purge_expired_archives(&self) -> Result<u64> {
        let now = ts(Utc::now());
        self.adapter.execute("purge_expired_archives", move |conn| {
            conn.execute(
                "DELETE FROM archived_memory WHERE expires_at <= ?1",
                params![now],
            )
            .map(|n| n as u64)
        })
    }

    /// Number of archive tombstones.
    pub fn archive_count(&self) -> Result<u64> {
        self.adapter.execute("archive_count", |conn| {
            conn.query_row("SELECT COUNT(*) FROM archived_memory", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| u64::try_from(n).unwrap_or(0))
        })
    }

    /// Raw access for maintenance passes that need bespoke statements.
    pub(crate) fn execute_raw<T>(
        &self,
        operation: &str,
        f: impl FnMut(&mut Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        self.adapter.execute(operation, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KuzuMemoryConfig;
    use chrono::Duration;

    fn open_store() -> (tempfile::TempDir, MemoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(
            GraphAdapter::open(&dir.path().join("store.db"), &KuzuMemoryConfig::default()).unwrap(),
        );
        let store = MemoryStore::new(adapter, Arc::new(Generation::new()));
        (dir, store)
    }

    fn sample(content: &str) -> Memory {
        Memory::new(content, MemoryType::Semantic, "manual")
    }

    #[test]
    fn test_store_and_fetch_roundtrip() {
        let (_dir, store) = open_store();
        let memory = sample("Alice leads the backend team.")
            .with_entities(vec!["Alice".to_string(), "backend team".to_string()])
            .with_session_id("sess-1");
        let id = store.store_memory(&memory).unwrap();

        let fetched = store.get_memory_by_id(&id).unwrap().unwrap();
        assert_eq!(fetched.content, memory.content);
        assert_eq!(fetched.content_hash, memory.content_hash);
        assert_eq!(fetched.memory_type, MemoryType::Semantic);
        assert_eq!(fetched.session_id.as_deref(), Some("sess-1"));
        let mut entities = fetched.entities.clone();
        entities.sort();
        assert_eq!(entities, vec!["Alice", "backend team"]);
    }

    #[test]
    fn test_duplicate_hash_rejected() {
        let (_dir, store) = open_store();
        let first = sample("My name is Alice.");
        store.store_memory(&first).unwrap();

        // Same content after normalization, different record
        let second = sample("my   name   is alice.");
        let err = store.store_memory(&second).unwrap_err();
        assert!(matches!(
            err,
            Error::DuplicateContent { existing_id, .. } if existing_id == first.id.to_string()
        ));
        assert_eq!(store.count_live().unwrap(), 1);
    }

    #[test]
    fn test_batch_store_skips_duplicates_in_order() {
        let (_dir, store) = open_store();
        let a = sample("alpha fact");
        let b = sample("alpha fact");
        let c = sample("beta fact");
        let inserted = store
            .batch_store_memories(&[a.clone(), b, c.clone()])
            .unwrap();
        assert_eq!(inserted, vec![a.id.clone(), c.id.clone()]);

        // A second identical batch is a full no-op
        let again = store.batch_store_memories(&[a, c]).unwrap();
        assert!(again.is_empty());
        assert_eq!(store.count_live().unwrap(), 2);
    }

    #[test]
    fn test_expired_memory_filtered_and_swept() {
        let (_dir, store) = open_store();
        let mut expired = sample("short lived note");
        expired.valid_to = Some(Utc::now() - Duration::seconds(5));
        store.store_memory(&expired).unwrap();
        let live = sample("durable fact");
        store.store_memory(&live).unwrap();

        assert_eq!(store.count_live().unwrap(), 1);
        assert_eq!(store.get_recent_memories(10, None).unwrap().len(), 1);

        // Expired content no longer blocks its hash
        assert!(store.find_live_by_hash(&expired.content_hash).unwrap().is_none());

        assert_eq!(store.cleanup_expired().unwrap(), 1);
        assert!(store.get_memory_by_id(&expired.id).unwrap().is_none());
    }

    #[test]
    fn test_access_bookkeeping() {
        let (_dir, store) = open_store();
        let memory = sample("frequently used fact");
        store.store_memory(&memory).unwrap();

        store.update_access(&memory.id).unwrap();
        store.update_access(&memory.id).unwrap();

        let fetched = store.get_memory_by_id(&memory.id).unwrap().unwrap();
        assert_eq!(fetched.access_count, 2);
        assert!(fetched.accessed_at.is_some());
    }

    #[test]
    fn test_access_update_does_not_bump_generation() {
        let (_dir, store) = open_store();
        let memory = sample("cached fact");
        store.store_memory(&memory).unwrap();
        let generation = store.generation().current();
        store.update_access(&memory.id).unwrap();
        assert_eq!(store.generation().current(), generation);
    }

    #[test]
    fn test_delete_memory_removes_edges() {
        let (_dir, store) = open_store();
        let memory = sample("to be deleted")
            .with_entities(vec!["Widget".to_string()])
            .with_session_id("sess-9");
        store.store_memory(&memory).unwrap();

        assert!(store.delete_memory(&memory.id).unwrap());
        assert!(!store.delete_memory(&memory.id).unwrap());
        assert_eq!(store.count_live().unwrap(), 0);

        // Edges are gone with the node
        let dangling = store.delete_orphan_edges().unwrap();
        assert_eq!(dangling, 0);
    }

    #[test]
    fn test_relates_to_traversal_bounded() {
        let (_dir, store) = open_store();
        let a = sample("fact a");
        let b = sample("fact b");
        let c = sample("fact c");
        let d = sample("fact d");
        for m in [&a, &b, &c, &d] {
            store.store_memory(m).unwrap();
        }
        store.add_relates_to(&a.id, &b.id, "update").unwrap();
        store.add_relates_to(&b.id, &c.id, "update").unwrap();
        store.add_relates_to(&c.id, &d.id, "update").unwrap();
        // Cycle back; traversal must still terminate
        store.add_relates_to(&d.id, &a.id, "update").unwrap();

        let reachable = store.related_ids(&a.id).unwrap();
        // Hop limit 2: b (1 hop) and c (2 hops), not d
        assert!(reachable.contains(&b.id));
        assert!(reachable.contains(&c.id));
        assert!(!reachable.contains(&d.id));
    }

    #[test]
    fn test_memories_mentioning() {
        let (_dir, store) = open_store();
        let python = sample("The scraper is written in Python.")
            .with_entities(vec!["Python".to_string()]);
        let rust = sample("The server is written in Rust.")
            .with_entities(vec!["Rust".to_string()]);
        store.store_memory(&python).unwrap();
        store.store_memory(&rust).unwrap();

        let hits = store
            .memories_mentioning(&["python".to_string()])
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, python.id);
    }

    #[test]
    fn test_memories_in_session() {
        let (_dir, store) = open_store();
        let in_session = sample("fact inside the session").with_session_id("sess-42");
        let outside = sample("fact outside any session");
        store.store_memory(&in_session).unwrap();
        store.store_memory(&outside).unwrap();

        let grouped = store.memories_in_session("sess-42").unwrap();
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].id, in_session.id);
        assert!(store.memories_in_session("sess-unknown").unwrap().is_empty());
    }

    #[test]
    fn test_orphan_entities_removed_only_on_request() {
        let (_dir, store) = open_store();
        let memory = sample("references a Widget entity")
            .with_entities(vec!["Widget".to_string()]);
        store.store_memory(&memory).unwrap();
        store.delete_memory(&memory.id).unwrap();

        // Edges went with the memory; the entity itself survives
        assert_eq!(store.delete_orphan_edges().unwrap(), 0);
        assert_eq!(store.entity_count().unwrap(), 1);

        // Until a caller asks for entity cleanup explicitly
        assert_eq!(store.delete_orphan_entities().unwrap(), 1);
        assert_eq!(store.entity_count().unwrap(), 0);
    }

    #[test]
    fn test_archive_lifecycle() {
        let (_dir, store) = open_store();
        let memory = sample("archived fact");
        store.store_memory(&memory).unwrap();

        let archive = ArchivedMemory::from_memory(&memory, 0.2, Utc::now());
        store.insert_archive(&archive).unwrap();
        assert_eq!(store.archive_count().unwrap(), 1);

        let listed = store.list_archives(10).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].original_id, memory.id);

        let fetched = store.get_archive(&archive.archive_id).unwrap().unwrap();
        assert_eq!(fetched.content, memory.content);

        assert!(store.delete_archive(&archive.archive_id).unwrap());
        assert_eq!(store.archive_count().unwrap(), 0);
    }

    #[test]
    fn test_purge_expired_archives() {
        let (_dir, store) = open_store();
        let memory = sample("old archive");
        let stale = ArchivedMemory::from_memory(&memory, 0.1, Utc::now() - Duration::days(40));
        let fresh =
            ArchivedMemory::from_memory(&sample("new archive"), 0.1, Utc::now());
        store.insert_archive(&stale).unwrap();
        store.insert_archive(&fresh).unwrap();

        assert_eq!(store.purge_expired_archives().unwrap(), 1);
        assert_eq!(store.archive_count().unwrap(), 1);
    }

    #[test]
    fn test_count_by_type() {
        let (_dir, store) = open_store();
        store.store_memory(&sample("fact one")).unwrap();
        store.store_memory(&sample("fact two")).unwrap();
        store
            .store_memory(&Memory::new("an event", MemoryType::Episodic, "manual"))
            .unwrap();

        let counts = store.count_by_type().unwrap();
        assert!(counts.contains(&("semantic".to_string(), 2)));
        assert!(counts.contains(&("episodic".to_string(), 1)));
    }
}
