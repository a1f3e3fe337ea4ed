//! Recall strategies: keyword, entity, temporal, and the auto ensemble.
//!
//! Strategies are pure CPU scoring over a pre-filtered slice of live
//! memories; the engine loads candidates once and every strategy votes on
//! the same slice. Scores live in [0, 1].

use crate::extraction::tag_entities;
use crate::models::{Memory, MemoryType};
use crate::text::containment_score;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;

/// Days over which the temporal strategy decays a memory to zero.
const TEMPORAL_DECAY_DAYS: f64 = 30.0;

/// Weight applied by the temporal strategy to types it is not primarily
/// for.
const TEMPORAL_OFF_TYPE_WEIGHT: f64 = 0.6;

/// Strategy selector for recall calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RecallStrategy {
    /// Token overlap against content and entities.
    Keyword,
    /// Join through entity mentions.
    Entity,
    /// Recency bias.
    Temporal,
    /// Weighted ensemble of the above.
    #[default]
    Auto,
}

impl RecallStrategy {
    /// Returns the strategy as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Entity => "entity",
            Self::Temporal => "temporal",
            Self::Auto => "auto",
        }
    }

    /// Parses a strategy from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "keyword" => Some(Self::Keyword),
            "entity" => Some(Self::Entity),
            "temporal" => Some(Self::Temporal),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }
}

impl fmt::Display for RecallStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Scores by query-token overlap with content and tagged entities.
#[must_use]
pub fn keyword_scores(query: &str, memories: &[Memory]) -> Vec<(usize, f64)> {
    memories
        .iter()
        .enumerate()
        .filter_map(|(idx, memory)| {
            let haystack = if memory.entities.is_empty() {
                memory.content.clone()
            } else {
                format!("{} {}", memory.content, memory.entities.join(" "))
            };
            let score = containment_score(query, &haystack);
            (score > 0.0).then_some((idx, score))
        })
        .collect()
}

/// Scores by the fraction of query entities a memory mentions.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn entity_scores(query: &str, memories: &[Memory]) -> Vec<(usize, f64)> {
    let query_entities: HashSet<String> = tag_entities(query)
        .into_iter()
        .map(|e| e.normalized)
        .collect();
    if query_entities.is_empty() {
        return Vec::new();
    }

    memories
        .iter()
        .enumerate()
        .filter_map(|(idx, memory)| {
            let mentioned: HashSet<String> = memory
                .entities
                .iter()
                .map(|e| e.trim().to_lowercase())
                .collect();
            let hits = query_entities.intersection(&mentioned).count();
            (hits > 0).then(|| (idx, hits as f64 / query_entities.len() as f64))
        })
        .collect()
}

/// Scores by recency: linear decay from 1.0 now to 0.0 at the decay
/// horizon. Types the strategy is not primarily for (everything except
/// WORKING and EPISODIC) are damped.
#[must_use]
pub fn temporal_scores(now: DateTime<Utc>, memories: &[Memory]) -> Vec<(usize, f64)> {
    memories
        .iter()
        .enumerate()
        .filter_map(|(idx, memory)| {
            let age_days = (now - memory.created_at).num_seconds().max(0) as f64 / 86_400.0;
            let decay = (1.0 - age_days / TEMPORAL_DECAY_DAYS).max(0.0);
            if decay <= 0.0 {
                return None;
            }
            let weight = match memory.memory_type {
                MemoryType::Working | MemoryType::Episodic => 1.0,
                _ => TEMPORAL_OFF_TYPE_WEIGHT,
            };
            Some((idx, decay * weight))
        })
        .collect()
}

/// Final ranking over scored memories.
///
/// Ordering: combined score DESC, importance DESC, access count DESC,
/// creation time DESC, id ASC. The id tie-break keeps the ordering fully
/// deterministic.
pub fn rank(scored: &mut Vec<(Memory, f64)>) {
    scored.sort_by(|(a, score_a), (b, score_b)| {
        score_b
            .partial_cmp(score_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.importance
                    .partial_cmp(&a.importance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| b.access_count.cmp(&a.access_count))
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}
