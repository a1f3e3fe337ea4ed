//! Deduplication engine: skip, update, or store.
//!
//! For each extraction candidate the engine inspects the existing live
//! memories and decides its fate with short-circuit priority:
//!
//! 1. exact content-hash match — skip, similarity 1.0;
//! 2. normalized token-set similarity at or above the near threshold —
//!    skip;
//! 3. an update marker plus enough overlap to a compatible existing
//!    memory — update that memory;
//! 4. semantic token overlap at or above the semantic threshold — skip;
//! 5. otherwise — store.
//!
//! Expired memories never count as matches.
//!
//! # Example
//!
//! ```rust,ignore
//! use kuzu_memory::dedup::{DedupDecision, DedupConfig, DeduplicationEngine};
//! use kuzu_memory::extraction::Extractor;
//!
//! let engine = DeduplicationEngine::new(DedupConfig::default());
//! let candidate = &Extractor::default().extract("Actually, I prefer FastAPI.")[0];
//!
//! match engine.decide(candidate, &existing, None) {
//!     DedupDecision::Skip { existing, .. } => println!("duplicate of {existing}"),
//!     DedupDecision::Update { target, .. } => println!("supersedes {target}"),
//!     DedupDecision::Store => println!("new knowledge"),
//! }
//! ```

use crate::extraction::Candidate;
use crate::models::{Memory, MemoryId, MemoryType, content_hash};
use crate::text::{jaccard_similarity, overlap_coefficient};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// How a candidate matched an existing memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Identical content hash after normalization.
    Exact,
    /// Near-identical token set (case and punctuation aside).
    Normalized,
    /// Substantial token overlap without being near-identical.
    Semantic,
    /// Correction/supersede relationship.
    Update,
}

/// The engine's verdict for one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum DedupDecision {
    /// Duplicate of an existing memory; do not store.
    Skip {
        /// The memory the candidate duplicates.
        existing: MemoryId,
        /// Similarity that triggered the skip.
        similarity: f64,
        /// Which tier matched.
        match_type: MatchType,
    },
    /// The candidate corrects or supersedes an existing memory.
    Update {
        /// The memory being superseded.
        target: MemoryId,
        /// Overlap with the target.
        similarity: f64,
    },
    /// Genuinely new; store it.
    Store,
}

/// Thresholds and toggles for the engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Token-set similarity at or above this is a near-duplicate.
    pub near_threshold: f64,
    /// Token-set similarity at or above this is a semantic duplicate.
    pub semantic_threshold: f64,
    /// Minimum overlap for an update marker to bind to a target.
    pub update_similarity_floor: f64,
    /// Candidates shorter than this skip the similarity tiers entirely;
    /// short strings produce degenerate token sets.
    pub min_length_for_similarity: usize,
    /// Whether update detection runs at all.
    pub enable_update_detection: bool,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            near_threshold: 0.95,
            semantic_threshold: 0.70,
            update_similarity_floor: 0.5,
            min_length_for_similarity: 20,
            enable_update_detection: true,
        }
    }
}

impl DedupConfig {
    /// Sets the near-duplicate threshold.
    #[must_use]
    pub const fn with_near_threshold(mut self, threshold: f64) -> Self {
        self.near_threshold = threshold;
        self
    }

    /// Sets the semantic-duplicate threshold.
    #[must_use]
    pub const fn with_semantic_threshold(mut self, threshold: f64) -> Self {
        self.semantic_threshold = threshold;
        self
    }

    /// Enables or disables update detection.
    #[must_use]
    pub const fn with_update_detection(mut self, enabled: bool) -> Self {
        self.enable_update_detection = enabled;
        self
    }
}

/// A ranked match against an existing memory.
#[derive(Debug, Clone, PartialEq)]
pub struct DedupMatch {
    /// The existing memory.
    pub id: MemoryId,
    /// Token-set similarity to the candidate.
    pub similarity: f64,
    /// Which tier produced the match.
    pub match_type: MatchType,
}

/// Pattern-level deduplication over lexical similarity.
#[derive(Debug, Clone, Default)]
pub struct DeduplicationEngine {
    config: DedupConfig,
}

impl DeduplicationEngine {
    /// Creates an engine with the given thresholds.
    #[must_use]
    pub const fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    /// The engine's configuration.
    #[must_use]
    pub const fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Similarity metric shared with maintenance clustering: token-set
    /// Jaccard with case/punctuation normalization.
    #[must_use]
    pub fn similarity(a: &str, b: &str) -> f64 {
        jaccard_similarity(a, b)
    }

    /// All matches of `content` against the live subset of `existing`,
    /// ranked similarity DESC (id as the deterministic tie-break).
    #[must_use]
    pub fn find_matches(&self, content: &str, existing: &[Memory]) -> Vec<DedupMatch> {
        let now = Utc::now();
        let hash = content_hash(content);
        let check_similarity = content.len() >= self.config.min_length_for_similarity;

        let mut matches: Vec<DedupMatch> = existing
            .iter()
            .filter(|m| m.is_live(now))
            .filter_map(|m| {
                if m.content_hash == hash {
                    return Some(DedupMatch {
                        id: m.id.clone(),
                        similarity: 1.0,
                        match_type: MatchType::Exact,
                    });
                }
                if !check_similarity {
                    return None;
                }
                let similarity = jaccard_similarity(content, &m.content);
                if similarity >= self.config.near_threshold {
                    Some(DedupMatch {
                        id: m.id.clone(),
                        similarity,
                        match_type: MatchType::Normalized,
                    })
                } else if similarity >= self.config.semantic_threshold {
                    Some(DedupMatch {
                        id: m.id.clone(),
                        similarity,
                        match_type: MatchType::Semantic,
                    })
                } else {
                    None
                }
            })
            .collect();

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches
    }

    /// Best update target for an update-marked candidate: the most similar
    /// live memory of a compatible type with overlap at or above the
    /// update floor.
    ///
    /// Binding uses the overlap coefficient rather than Jaccard: a short
    /// correction ("Actually, I prefer FastAPI.") shares most of its
    /// tokens with its target but very little of the union.
    fn find_update_target(
        &self,
        candidate: &Candidate,
        existing: &[Memory],
    ) -> Option<(MemoryId, f64)> {
        let now = Utc::now();
        existing
            .iter()
            .filter(|m| m.is_live(now))
            .filter(|m| m.memory_type == candidate.memory_type)
            .map(|m| {
                (
                    m.id.clone(),
                    overlap_coefficient(&candidate.content, &m.content),
                )
            })
            .filter(|(_, similarity)| *similarity >= self.config.update_similarity_floor)
            .max_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.0.cmp(&a.0))
            })
    }

    /// Decides the fate of one candidate against the existing memories,
    /// optionally constrained to one memory type.
    #[must_use]
    #[instrument(skip(self, candidate, existing), fields(candidates = existing.len()))]
    pub fn decide(
        &self,
        candidate: &Candidate,
        existing: &[Memory],
        type_filter: Option<MemoryType>,
    ) -> DedupDecision {
        let scoped: Vec<Memory>;
        let comparison_set = match type_filter {
            Some(ty) => {
                scoped = existing
                    .iter()
                    .filter(|m| m.memory_type == ty)
                    .cloned()
                    .collect();
                scoped.as_slice()
            },
            None => existing,
        };

        let matches = self.find_matches(&candidate.content, comparison_set);

        // Tier 1: exact hash
        if let Some(exact) = matches.iter().find(|m| m.match_type == MatchType::Exact) {
            metrics::counter!("dedup_decisions_total", "decision" => "skip_exact").increment(1);
            return DedupDecision::Skip {
                existing: exact.id.clone(),
                similarity: 1.0,
                match_type: MatchType::Exact,
            };
        }

        // Tier 2: near-identical after normalization
        if let Some(near) = matches
            .iter()
            .find(|m| m.match_type == MatchType::Normalized)
        {
            metrics::counter!("dedup_decisions_total", "decision" => "skip_normalized")
                .increment(1);
            return DedupDecision::Skip {
                existing: near.id.clone(),
                similarity: near.similarity,
                match_type: MatchType::Normalized,
            };
        }

        // Tier 3: update markers bind to the best compatible target
        if self.config.enable_update_detection && candidate.is_update {
            if let Some((target, similarity)) = self.find_update_target(candidate, comparison_set) {
                metrics::counter!("dedup_decisions_total", "decision" => "update").increment(1);
                tracing::debug!(target = %target, similarity, "update target found");
                return DedupDecision::Update { target, similarity };
            }
        }

        // Tier 4: semantic overlap
        if let Some(semantic) = matches.iter().find(|m| m.match_type == MatchType::Semantic) {
            metrics::counter!("dedup_decisions_total", "decision" => "skip_semantic").increment(1);
            return DedupDecision::Skip {
                existing: semantic.id.clone(),
                similarity: semantic.similarity,
                match_type: MatchType::Semantic,
            };
        }

        metrics::counter!("dedup_decisions_total", "decision" => "store").increment(1);
        DedupDecision::Store
    }
}
