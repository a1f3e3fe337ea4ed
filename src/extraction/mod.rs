//! Extraction pipeline: free text in, candidate memories out.
//!
//! Deterministic and store-free: the same input always yields the same
//! candidates, and nothing here touches the database. The pipeline
//! normalizes whitespace, splits the blob into sentence-like units,
//! classifies each unit against the pattern families, detects update
//! markers, tags entities, and computes a bounded importance score.
//!
//! # Example
//!
//! ```rust,ignore
//! use kuzu_memory::extraction::Extractor;
//!
//! let extractor = Extractor::default();
//! let candidates = extractor.extract("My name is Alice. I prefer FastAPI over Flask.");
//! assert_eq!(candidates.len(), 2);
//! assert_eq!(candidates[0].memory_type.as_str(), "semantic");
//! assert_eq!(candidates[1].memory_type.as_str(), "preference");
//! ```

pub mod entities;
pub mod patterns;

pub use entities::tag_entities;
pub use patterns::{classify, is_update_marker};

use crate::config::{ExtractionConfig, RetentionConfig};
use crate::models::{ExtractedEntity, Memory, MemoryType};
use crate::text::normalize_whitespace;
use tracing::instrument;

/// An extraction output, before the deduplication engine has decided its
/// fate.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// The unit text, normalized and length-capped.
    pub content: String,
    /// Classified type.
    pub memory_type: MemoryType,
    /// Classification confidence in [0, 1].
    pub confidence: f64,
    /// Importance in [0, 1].
    pub importance: f64,
    /// Entities tagged in the unit.
    pub entities: Vec<ExtractedEntity>,
    /// True when the unit carries an update/correction cue.
    pub is_update: bool,
}

impl Candidate {
    /// Materializes the candidate as a memory record, applying the
    /// retention policy for its type.
    #[must_use]
    pub fn into_memory(self, source_type: &str, retention: &RetentionConfig) -> Memory {
        let entities = self.entities.iter().map(|e| e.text.clone()).collect();
        let retention_period = retention.effective_retention(self.memory_type);
        let memory = Memory::new(self.content, self.memory_type, source_type)
            .with_importance(self.importance)
            .with_confidence(self.confidence)
            .with_entities(entities);
        let valid_to = retention_period.map(|period| memory.created_at + period);
        memory.with_valid_to(valid_to)
    }
}

/// Deterministic pattern-based extractor.
#[derive(Debug, Clone)]
pub struct Extractor {
    config: ExtractionConfig,
}

impl Extractor {
    /// Creates an extractor with the given bounds.
    #[must_use]
    pub fn new(config: ExtractionConfig) -> Self {
        if config.enable_pattern_compilation {
            // Touch the lazy registries so first extraction pays no
            // compilation cost.
            let _ = patterns::CLASSIFICATION_FAMILIES.len();
            let _ = patterns::UPDATE_MARKERS.len();
        }
        Self { config }
    }

    /// Splits a blob into sentence-like units suitable for independent
    /// classification.
    fn split_units(text: &str) -> Vec<String> {
        let mut units = Vec::new();
        for line in text.lines() {
            let mut current = String::new();
            for ch in line.chars() {
                current.push(ch);
                if matches!(ch, '.' | '!' | '?') {
                    let unit = normalize_whitespace(&current);
                    if !unit.is_empty() {
                        units.push(unit);
                    }
                    current.clear();
                }
            }
            let tail = normalize_whitespace(&current);
            if !tail.is_empty() {
                units.push(tail);
            }
        }
        units
    }

    /// Truncates an oversized unit at the last word boundary under the cap.
    fn cap_length(&self, unit: &str) -> String {
        if unit.len() <= self.config.max_memory_length {
            return unit.to_string();
        }
        // Back off to a char boundary, then to a word boundary
        let mut end = self.config.max_memory_length.min(unit.len());
        while end > 0 && !unit.is_char_boundary(end) {
            end -= 1;
        }
        let capped = &unit[..end];
        match capped.rfind(' ') {
            Some(space) if space > 0 => capped[..space].to_string(),
            _ => capped.to_string(),
        }
    }

    fn importance(&self, unit: &str, memory_type: MemoryType) -> f64 {
        let mut score: f64 = 0.5;
        // Decisions and identity facts carry more weight than observations
        match memory_type {
            MemoryType::Semantic => score += 0.2,
            MemoryType::Preference | MemoryType::Procedural => score += 0.1,
            MemoryType::Episodic | MemoryType::Working => {},
            MemoryType::Sensory => score -= 0.1,
        }
        if patterns::IMPORTANCE_CUES.is_match(unit) {
            score += 0.15;
        }
        if unit.len() >= 100 {
            score += 0.05;
        }
        score.clamp(0.0, 1.0)
    }

    /// Extracts zero or more candidates from a text blob.
    ///
    /// Pure: same input, same output. Units shorter than the configured
    /// minimum are dropped; longer ones are truncated at a word boundary.
    #[must_use]
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub fn extract(&self, text: &str) -> Vec<Candidate> {
        let normalized = normalize_whitespace(text);
        if normalized.len() < self.config.min_memory_length {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        for unit in Self::split_units(text) {
            if unit.len() < self.config.min_memory_length {
                continue;
            }
            let content = self.cap_length(&unit);
            let (memory_type, confidence) = patterns::classify(&content);
            let entities = if self.config.enable_entity_extraction {
                entities::tag_entities(&content)
            } else {
                Vec::new()
            };
            let importance = self.importance(&content, memory_type);
            candidates.push(Candidate {
                is_update: patterns::is_update_marker(&content),
                content,
                memory_type,
                confidence,
                importance,
                entities,
            });
        }

        if candidates.is_empty() {
            // Non-empty input that produced nothing is logged, not raised;
            // the caller receives an empty list.
            tracing::debug!(input_len = text.len(), "extraction produced no candidates");
        }
        candidates
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(ExtractionConfig::default())
    }
}
