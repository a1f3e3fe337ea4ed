//! Cleanup passes: stale memories, duplicate collapse, orphaned edges.
//!
//! Three independent passes, each with a dry-run mode. Failures in one
//! pass are recorded in its result; the other passes continue.

use crate::dedup::DeduplicationEngine;
use crate::models::Memory;
use crate::storage::MemoryStore;
use crate::{Error, Result};
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::time::Instant;
use tracing::instrument;

/// Tunables for the cleanup passes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Never-accessed memories older than this are stale.
    pub stale_after_days: i64,
    /// Pairwise similarity at or above this collapses duplicates.
    pub duplicate_threshold: f64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            stale_after_days: 90,
            duplicate_threshold: 0.95,
        }
    }
}

impl CleanupConfig {
    /// Sets the stale horizon.
    #[must_use]
    pub const fn with_stale_after_days(mut self, days: i64) -> Self {
        self.stale_after_days = days;
        self
    }

    /// Sets the duplicate-collapse threshold.
    #[must_use]
    pub const fn with_duplicate_threshold(mut self, threshold: f64) -> Self {
        self.duplicate_threshold = threshold;
        self
    }
}

/// Outcome of one cleanup pass.
#[derive(Debug, Clone)]
pub struct CleanupResult {
    /// Which pass ran: `stale`, `duplicates`, or `orphans`.
    pub pass: String,
    /// Items inspected.
    pub examined: usize,
    /// Items removed (or that would be removed under dry-run).
    pub removed: usize,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Wall-clock duration.
    pub duration_ms: u64,
    /// False when the pass failed partway.
    pub success: bool,
    /// The failure, when `success` is false.
    pub error: Option<String>,
}

impl CleanupResult {
    fn start(pass: &str, dry_run: bool) -> Self {
        Self {
            pass: pass.to_string(),
            examined: 0,
            removed: 0,
            dry_run,
            duration_ms: 0,
            success: true,
            error: None,
        }
    }

    fn finish(mut self, started: Instant) -> Self {
        self.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self
    }

    fn fail(mut self, started: Instant, error: &Error) -> Self {
        self.success = false;
        self.error = Some(error.to_string());
        self.finish(started)
    }
}

/// Runs the cleanup passes over a store.
#[derive(Debug)]
pub struct CleanupRunner {
    store: MemoryStore,
    config: CleanupConfig,
}

impl CleanupRunner {
    /// Creates a runner with the given config.
    #[must_use]
    pub const fn new(store: MemoryStore, config: CleanupConfig) -> Self {
        Self { store, config }
    }

    /// Stale pass: live memories past the stale horizon that were never
    /// accessed are deleted.
    #[instrument(skip(self))]
    pub fn cleanup_stale(&self, dry_run: bool) -> Result<CleanupResult> {
        let started = Instant::now();
        let mut result = CleanupResult::start("stale", dry_run);
        let horizon = Utc::now() - Duration::days(self.config.stale_after_days);

        let live = match self.store.all_live() {
            Ok(live) => live,
            Err(e) => return Ok(result.fail(started, &e)),
        };

        for memory in &live {
            result.examined += 1;
            let never_used = memory.access_count == 0
                && memory.accessed_at.is_none_or(|accessed| accessed < horizon);
            if memory.created_at >= horizon || !never_used {
                continue;
            }
            if dry_run {
                result.removed += 1;
                continue;
            }
            match self.store.delete_memory(&memory.id) {
                Ok(true) => result.removed += 1,
                Ok(false) => {},
                Err(e) => {
                    tracing::warn!(memory_id = %memory.id, error = %e, "stale delete failed");
                    return Ok(result.fail(started, &e));
                },
            }
        }

        metrics::gauge!("cleanup_stale_removed").set(result.removed as f64);
        tracing::info!(
            examined = result.examined,
            removed = result.removed,
            dry_run,
            "stale cleanup finished"
        );
        Ok(result.finish(started))
    }

    /// Clusters live memories by pairwise similarity and keeps one winner
    /// per cluster: max access count, then max creation time.
    #[instrument(skip(self))]
    pub fn cleanup_duplicates(&self, dry_run: bool) -> Result<CleanupResult> {
        let started = Instant::now();
        let mut result = CleanupResult::start("duplicates", dry_run);

        let live = match self.store.all_live() {
            Ok(live) => live,
            Err(e) => return Ok(result.fail(started, &e)),
        };
        result.examined = live.len();

        let clusters = cluster_by_similarity(&live, self.config.duplicate_threshold);
        for cluster in clusters {
            if cluster.len() < 2 {
                continue;
            }
            let winner = cluster
                .iter()
                .max_by(|a, b| {
                    a.access_count
                        .cmp(&b.access_count)
                        .then_with(|| a.created_at.cmp(&b.created_at))
                        .then_with(|| b.id.cmp(&a.id))
                })
                .map(|m| m.id.clone());

            for member in cluster {
                if Some(&member.id) == winner.as_ref() {
                    continue;
                }
                if dry_run {
                    result.removed += 1;
                    continue;
                }
                match self.store.delete_memory(&member.id) {
                    Ok(true) => result.removed += 1,
                    Ok(false) => {},
                    Err(e) => return Ok(result.fail(started, &e)),
                }
            }
        }

        metrics::gauge!("cleanup_duplicates_removed").set(result.removed as f64);
        tracing::info!(
            examined = result.examined,
            removed = result.removed,
            dry_run,
            "duplicate cleanup finished"
        );
        Ok(result.finish(started))
    }

    /// Removes edges whose endpoint node no longer exists.
    #[instrument(skip(self))]
    pub fn cleanup_orphans(&self, dry_run: bool) -> Result<CleanupResult> {
        let started = Instant::now();
        let mut result = CleanupResult::start("orphans", dry_run);

        if dry_run {
            match self.count_orphan_edges() {
                Ok(count) => {
                    result.examined = count;
                    result.removed = count;
                },
                Err(e) => return Ok(result.fail(started, &e)),
            }
            return Ok(result.finish(started));
        }

        match self.store.delete_orphan_edges() {
            Ok(removed) => {
                let removed = usize::try_from(removed).unwrap_or(usize::MAX);
                result.examined = removed;
                result.removed = removed;
                if removed > 0 {
                    self.store.generation().bump();
                }
            },
            Err(e) => return Ok(result.fail(started, &e)),
        }

        tracing::info!(removed = result.removed, "orphan cleanup finished");
        Ok(result.finish(started))
    }

    /// Separately-requested pass: removes entities with zero `MENTIONS`
    /// edges. Not part of [`CleanupRunner::run_all`]; regular cleanup
    /// only ever touches edges.
    #[instrument(skip(self))]
    pub fn cleanup_orphan_entities(&self, dry_run: bool) -> Result<CleanupResult> {
        let started = Instant::now();
        let mut result = CleanupResult::start("orphan_entities", dry_run);

        if dry_run {
            let count = self.store.execute_raw("count_orphan_entities", |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM entity
                      WHERE id NOT IN (SELECT entity_id FROM mentions)",
                    [],
                    |row| row.get::<_, i64>(0),
                )
            });
            match count {
                Ok(count) => {
                    result.examined = usize::try_from(count).unwrap_or(0);
                    result.removed = result.examined;
                },
                Err(e) => return Ok(result.fail(started, &e)),
            }
            return Ok(result.finish(started));
        }

        match self.store.delete_orphan_entities() {
            Ok(removed) => {
                let removed = usize::try_from(removed).unwrap_or(usize::MAX);
                result.examined = removed;
                result.removed = removed;
                if removed > 0 {
                    self.store.generation().bump();
                }
            },
            Err(e) => return Ok(result.fail(started, &e)),
        }
        Ok(result.finish(started))
    }

    fn count_orphan_edges(&self) -> Result<usize> {
        self.store.execute_raw("count_orphan_edges", |conn| {
            let mentions: i64 = conn.query_row(
                "SELECT COUNT(*) FROM mentions
                  WHERE memory_id NOT IN (SELECT id FROM memory)
                     OR entity_id NOT IN (SELECT id FROM entity)",
                [],
                |row| row.get(0),
            )?;
            let relates: i64 = conn.query_row(
                "SELECT COUNT(*) FROM relates_to
                  WHERE from_id NOT IN (SELECT id FROM memory)
                     OR to_id NOT IN (SELECT id FROM memory)",
                [],
                |row| row.get(0),
            )?;
            let sessions: i64 = conn.query_row(
                "SELECT COUNT(*) FROM belongs_to_session
                  WHERE memory_id NOT IN (SELECT id FROM memory)
                     OR session_id NOT IN (SELECT id FROM session)",
                [],
                |row| row.get(0),
            )?;
            Ok(usize::try_from(mentions + relates + sessions).unwrap_or(0))
        })
    }

    /// Runs all three passes; a failing pass records its error and the
    /// rest continue.
    pub fn run_all(&self, dry_run: bool) -> Vec<CleanupResult> {
        let mut results = Vec::with_capacity(3);
        for pass in [
            Self::cleanup_stale,
            Self::cleanup_duplicates,
            Self::cleanup_orphans,
        ] {
            match pass(self, dry_run) {
                Ok(result) => results.push(result),
                Err(e) => {
                    // Pass-level Err only for infrastructure failures;
                    // record and keep going.
                    let mut failed = CleanupResult::start("unknown", dry_run);
                    failed.success = false;
                    failed.error = Some(e.to_string());
                    results.push(failed);
                },
            }
        }
        results
    }
}

/// Greedy similarity clustering: each unclustered memory seeds a cluster
/// of everything at or above the threshold. Deterministic given input
/// order.
pub(crate) fn cluster_by_similarity(memories: &[Memory], threshold: f64) -> Vec<Vec<Memory>> {
    let mut clustered = vec![false; memories.len()];
    let mut clusters = Vec::new();

    for i in 0..memories.len() {
        if clustered[i] {
            continue;
        }
        clustered[i] = true;
        let mut cluster = vec![memories[i].clone()];
        for j in (i + 1)..memories.len() {
            if clustered[j] {
                continue;
            }
            let similarity =
                DeduplicationEngine::similarity(&memories[i].content, &memories[j].content);
            if similarity >= threshold {
                clustered[j] = true;
                cluster.push(memories[j].clone());
            }
        }
        clusters.push(cluster);
    }
    clusters
}
