//! Consolidation: folding clusters of similar old memories into
//! summaries.
//!
//! Candidates are old, rarely-accessed memories of consolidatable types.
//! Greedy similarity clustering groups them; each cluster's centroid (the
//! member with the highest access count) seeds a summary that carries the
//! unique tokens of every other member as "Related:" tails. Members are
//! linked to the summary with `CONSOLIDATED_INTO` edges and archived
//! through the same path as pruning.

use crate::maintenance::cleanup::cluster_by_similarity;
use crate::models::{ArchivedMemory, Memory, MemoryType};
use crate::storage::MemoryStore;
use crate::text::{token_set, tokenize};
use crate::{Error, Result};
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::time::Instant;
use tracing::instrument;

/// Tunables for consolidation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsolidationConfig {
    /// Only memories at least this old are considered.
    pub min_age_days: i64,
    /// Only memories accessed at most this often are considered.
    pub max_access_count: u32,
    /// Types eligible for consolidation.
    pub consolidatable_types: Vec<MemoryType>,
    /// Pairwise similarity for cluster membership.
    pub similarity_threshold: f64,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            min_age_days: 90,
            max_access_count: 3,
            consolidatable_types: vec![MemoryType::Episodic],
            similarity_threshold: 0.70,
        }
    }
}

/// Outcome of a consolidation run.
#[derive(Debug, Clone, Default)]
pub struct ConsolidationResult {
    /// Clusters of size two or more found.
    pub clusters_found: usize,
    /// Candidates that passed the age/access/type filter.
    pub memories_analyzed: usize,
    /// Members folded into summaries.
    pub memories_consolidated: usize,
    /// Summary memories created.
    pub new_memories_created: usize,
    /// Members archived.
    pub memories_archived: usize,
    /// Wall-clock duration.
    pub execution_time_ms: u64,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Set when the run failed partway; counts cover completed work.
    pub error: Option<String>,
}

/// Consolidates clusters of similar old memories.
#[derive(Debug)]
pub struct Consolidator {
    store: MemoryStore,
    config: ConsolidationConfig,
}

impl Consolidator {
    /// Creates a consolidator with the given config.
    #[must_use]
    pub const fn new(store: MemoryStore, config: ConsolidationConfig) -> Self {
        Self { store, config }
    }

    /// Builds the summary content: centroid content first, then one
    /// "Related:" tail per other member carrying its tokens absent from
    /// the centroid.
    fn summary_content(centroid: &Memory, members: &[&Memory]) -> String {
        let centroid_tokens = token_set(&centroid.content);
        let mut content = centroid.content.clone();
        for member in members {
            let mut unique: Vec<String> = Vec::new();
            for token in tokenize(&member.content) {
                if !centroid_tokens.contains(&token) && !unique.contains(&token) {
                    unique.push(token);
                }
            }
            if !unique.is_empty() {
                content.push_str("\nRelated: ");
                content.push_str(&unique.join(" "));
            }
        }
        content
    }

    /// Picks the centroid: highest access count, earliest position on
    /// ties.
    fn centroid_index(cluster: &[Memory]) -> usize {
        let mut best = 0;
        for (idx, member) in cluster.iter().enumerate().skip(1) {
            if member.access_count > cluster[best].access_count {
                best = idx;
            }
        }
        best
    }

    fn is_candidate(&self, memory: &Memory, cutoff: chrono::DateTime<Utc>) -> bool {
        memory.created_at <= cutoff
            && memory.access_count <= self.config.max_access_count
            && self.config.consolidatable_types.contains(&memory.memory_type)
            && memory.source_type != "consolidation"
    }

    /// Runs consolidation. Dry-run reports counts without mutating.
    #[instrument(skip(self), fields(dry_run))]
    pub fn consolidate(&self, dry_run: bool) -> Result<ConsolidationResult> {
        let started = Instant::now();
        let now = Utc::now();
        let cutoff = now - Duration::days(self.config.min_age_days);

        let mut result = ConsolidationResult {
            dry_run,
            ..ConsolidationResult::default()
        };

        let candidates: Vec<Memory> = self
            .store
            .all_live()?
            .into_iter()
            .filter(|m| self.is_candidate(m, cutoff))
            .collect();
        result.memories_analyzed = candidates.len();

        let clusters: Vec<Vec<Memory>> =
            cluster_by_similarity(&candidates, self.config.similarity_threshold)
                .into_iter()
                .filter(|c| c.len() >= 2)
                .collect();
        result.clusters_found = clusters.len();

        if dry_run {
            result.memories_consolidated = clusters.iter().map(Vec::len).sum();
            result.execution_time_ms =
                u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            tracing::info!(
                clusters = result.clusters_found,
                analyzed = result.memories_analyzed,
                "consolidation dry-run finished"
            );
            return Ok(result);
        }

        for cluster in clusters {
            if let Err(e) = self.apply_cluster(&cluster, &mut result) {
                tracing::warn!(error = %e, "consolidation cluster failed, stopping run");
                result.error = Some(e.to_string());
                break;
            }
        }

        result.execution_time_ms =
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        metrics::counter!("consolidation_runs_total").increment(1);
        tracing::info!(
            clusters = result.clusters_found,
            consolidated = result.memories_consolidated,
            summaries = result.new_memories_created,
            "consolidation finished"
        );
        Ok(result)
    }

    fn apply_cluster(&self, cluster: &[Memory], result: &mut ConsolidationResult) -> Result<()> {
        let centroid_idx = Self::centroid_index(cluster);
        let centroid = &cluster[centroid_idx];
        let others: Vec<&Memory> = cluster
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != centroid_idx)
            .map(|(_, m)| m)
            .collect();

        let importance = cluster
            .iter()
            .map(|m| m.importance)
            .fold(0.0_f64, f64::max);

        let summary = Memory::new(
            Self::summary_content(centroid, &others),
            centroid.memory_type,
            "consolidation",
        )
        .with_importance(importance)
        .with_valid_to(None);

        let summary_id = match self.store.store_memory(&summary) {
            Ok(id) => {
                result.new_memories_created += 1;
                id
            },
            Err(Error::DuplicateContent { existing_id, .. }) => {
                // A previous run already built this summary; reuse it
                existing_id.as_str().into()
            },
            Err(e) => return Err(e),
        };

        let now = Utc::now();
        for member in cluster {
            self.store.add_consolidated_into(&member.id, &summary_id)?;
            let archive = ArchivedMemory::from_memory(member, 0.0, now);
            self.store.insert_archive(&archive)?;
            result.memories_archived += 1;
            self.store.delete_memory(&member.id)?;
            result.memories_consolidated += 1;
        }
        Ok(())
    }
}
