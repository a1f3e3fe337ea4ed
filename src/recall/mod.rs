//! Recall engine: strategies, ranking, caching, and prompt enhancement.
//!
//! The engine loads the live candidate set once per call, lets the
//! selected strategy (or the auto ensemble) vote, ranks deterministically,
//! caps the result, records access bookkeeping in one batched write, and
//! composes the enhanced prompt. Results are cached per
//! (query, filters, strategy, cap) and invalidated by the shared write
//! generation.

pub mod cache;
pub mod enhance;
pub mod strategies;

pub use cache::{CacheKey, RecallCache};
pub use enhance::compose_enhanced_prompt;
pub use strategies::RecallStrategy;

use crate::config::{PerformanceConfig, RecallConfig};
use crate::models::{Memory, MemoryContext, RecallFilters};
use crate::storage::MemoryStore;
use crate::{Error, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Recall over a memory store.
#[derive(Debug)]
pub struct RecallEngine {
    store: MemoryStore,
    config: RecallConfig,
    performance: PerformanceConfig,
    cache: Option<Arc<RecallCache>>,
}

impl RecallEngine {
    /// Creates an engine; the cache is built when caching is enabled.
    #[must_use]
    pub fn new(store: MemoryStore, config: RecallConfig, performance: PerformanceConfig) -> Self {
        let cache = (config.enable_caching && config.cache_size > 0).then(|| {
            Arc::new(RecallCache::new(
                config.cache_size,
                config.cache_ttl_seconds,
                Arc::clone(store.generation()),
            ))
        });
        Self {
            store,
            config,
            performance,
            cache,
        }
    }

    /// The engine's cache, when enabled.
    #[must_use]
    pub fn cache(&self) -> Option<&Arc<RecallCache>> {
        self.cache.as_ref()
    }

    /// Per-strategy fan-out bound: enough headroom over the cap that the
    /// ensemble has real choices, without scoring the world.
    fn fanout(max_memories: usize) -> usize {
        max_memories.saturating_mul(5).clamp(20, 100)
    }

    fn take_top(mut scores: Vec<(usize, f64)>, fanout: usize) -> Vec<(usize, f64)> {
        scores.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scores.truncate(fanout);
        scores
    }

    fn strategy_enabled(&self, name: &str) -> bool {
        self.config.strategies.iter().any(|s| s == name)
    }

    /// Runs the selected strategy over the candidate slice, producing
    /// combined scores per candidate index.
    fn combined_scores(
        &self,
        query: &str,
        strategy: RecallStrategy,
        candidates: &[Memory],
        max_memories: usize,
    ) -> HashMap<usize, f64> {
        let fanout = Self::fanout(max_memories);
        let now = Utc::now();
        let mut combined: HashMap<usize, f64> = HashMap::new();

        let mut merge = |scores: Vec<(usize, f64)>, weight: f64| {
            for (idx, score) in Self::take_top(scores, fanout) {
                *combined.entry(idx).or_insert(0.0) += score * weight;
            }
        };

        match strategy {
            RecallStrategy::Keyword => {
                merge(strategies::keyword_scores(query, candidates), 1.0);
            },
            RecallStrategy::Entity => {
                merge(strategies::entity_scores(query, candidates), 1.0);
            },
            RecallStrategy::Temporal => {
                merge(strategies::temporal_scores(now, candidates), 1.0);
            },
            RecallStrategy::Auto => {
                let weight_sum = self.config.keyword_weight
                    + self.config.entity_weight
                    + self.config.temporal_weight;
                if self.strategy_enabled("keyword") {
                    merge(
                        strategies::keyword_scores(query, candidates),
                        self.config.keyword_weight / weight_sum,
                    );
                }
                if self.strategy_enabled("entity") {
                    merge(
                        strategies::entity_scores(query, candidates),
                        self.config.entity_weight / weight_sum,
                    );
                }
                if self.strategy_enabled("temporal") {
                    merge(
                        strategies::temporal_scores(now, candidates),
                        self.config.temporal_weight / weight_sum,
                    );
                }
            },
        }
        combined
    }

    /// Retrieves the most relevant live memories for a query and composes
    /// the enhanced prompt.
    ///
    /// `max_memories = 0` short-circuits to a passthrough context. Breaching
    /// the soft recall budget is logged, never raised.
    #[instrument(
        skip(self, prompt, filters),
        fields(strategy = %strategy, max_memories)
    )]
    pub fn attach_memories(
        &self,
        prompt: &str,
        max_memories: usize,
        strategy: RecallStrategy,
        filters: &RecallFilters,
    ) -> Result<MemoryContext> {
        if prompt.trim().is_empty() {
            return Err(Error::Validation("query must not be empty".to_string()));
        }
        if max_memories == 0 {
            return Ok(MemoryContext::passthrough(prompt, strategy.as_str()));
        }

        let cache_key = CacheKey::new(prompt, filters, strategy.as_str(), max_memories);
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&cache_key) {
                tracing::debug!("recall cache hit");
                return Ok(hit);
            }
        }

        let start = Instant::now();
        // The pure entity strategy joins candidates through MENTIONS
        // instead of scanning the live set; the auto ensemble scores
        // entities in-memory over the shared candidate slice.
        let loaded = if strategy == RecallStrategy::Entity {
            let query_entities: Vec<String> = crate::extraction::tag_entities(prompt)
                .into_iter()
                .map(|e| e.normalized)
                .collect();
            self.store.memories_mentioning(&query_entities)?
        } else {
            self.store.all_live()?
        };
        let candidates: Vec<Memory> = loaded
            .into_iter()
            .filter(|m| filters.matches(m))
            .collect();

        let combined = self.combined_scores(prompt, strategy, &candidates, max_memories);

        let mut scored: Vec<(Memory, f64)> = combined
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .map(|(idx, score)| (candidates[idx].clone(), score))
            .collect();
        strategies::rank(&mut scored);
        scored.truncate(max_memories);

        #[allow(clippy::cast_precision_loss)]
        let confidence = if scored.is_empty() {
            0.0
        } else {
            (scored.iter().map(|(_, s)| s).sum::<f64>() / scored.len() as f64).clamp(0.0, 1.0)
        };

        let memories: Vec<Memory> = scored.into_iter().map(|(m, _)| m).collect();

        // One access bump per returned memory per engine call, batched
        let ids: Vec<_> = memories.iter().map(|m| m.id.clone()).collect();
        self.store.batch_update_access(&ids)?;

        let recall_time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        if self.performance.enable_performance_monitoring
            && recall_time_ms > self.performance.max_recall_time_ms
        {
            tracing::warn!(
                recall_time_ms,
                budget_ms = self.performance.max_recall_time_ms,
                "recall exceeded its soft budget"
            );
        }
        metrics::histogram!("recall_duration_ms").record(recall_time_ms as f64);

        let context = MemoryContext {
            enhanced_prompt: compose_enhanced_prompt(prompt, &memories),
            original_prompt: prompt.to_string(),
            confidence,
            memories,
            recall_time_ms,
            strategy_used: strategy.as_str().to_string(),
        };

        if let Some(cache) = &self.cache {
            cache.put(cache_key, context.clone());
        }
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KuzuMemoryConfig;
    use crate::models::MemoryType;
    use crate::storage::{Generation, GraphAdapter};

    fn open_engine() -> (tempfile::TempDir, MemoryStore, RecallEngine) {
        let dir = tempfile::tempdir().unwrap();
        let config = KuzuMemoryConfig::default();
        let adapter = Arc::new(
            GraphAdapter::open(&dir.path().join("recall.db"), &config).unwrap(),
        );
        let store = MemoryStore::new(adapter, Arc::new(Generation::new()));
        let engine = RecallEngine::new(store.clone(), config.recall, config.performance);
        (dir, store, engine)
    }

    fn store_fact(store: &MemoryStore, content: &str, importance: f64) -> Memory {
        let memory = Memory::new(content, MemoryType::Semantic, "manual")
            .with_importance(importance)
            .with_entities(
                crate::extraction::tag_entities(content)
                    .into_iter()
                    .map(|e| e.text)
                    .collect(),
            );
        store.store_memory(&memory).unwrap();
        memory
    }

    #[test]
    fn test_empty_query_rejected() {
        let (_dir, _store, engine) = open_engine();
        let err = engine
            .attach_memories("   ", 10, RecallStrategy::Auto, &RecallFilters::new())
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_zero_cap_passthrough() {
        let (_dir, store, engine) = open_engine();
        store_fact(&store, "Python is used for the ETL jobs", 0.5);

        let ctx = engine
            .attach_memories("python", 0, RecallStrategy::Auto, &RecallFilters::new())
            .unwrap();
        assert!(ctx.memories.is_empty());
        assert_eq!(ctx.enhanced_prompt, ctx.original_prompt);
    }

    #[test]
    fn test_ranking_by_importance_deterministic() {
        let (_dir, store, engine) = open_engine();
        let high = store_fact(&store, "Python powers the recommendation engine", 0.9);
        let mid = store_fact(&store, "Python scripts handle the nightly exports", 0.5);
        let low = store_fact(&store, "Python was mentioned at the offsite", 0.2);

        let first = engine
            .attach_memories("python", 3, RecallStrategy::Auto, &RecallFilters::new())
            .unwrap();
        assert_eq!(first.memories.len(), 3);
        assert_eq!(first.memories[0].id, high.id);
        assert_eq!(first.memories[1].id, mid.id);
        assert_eq!(first.memories[2].id, low.id);

        let second = engine
            .attach_memories("python", 3, RecallStrategy::Auto, &RecallFilters::new())
            .unwrap();
        let order_first: Vec<_> = first.memories.iter().map(|m| m.id.clone()).collect();
        let order_second: Vec<_> = second.memories.iter().map(|m| m.id.clone()).collect();
        assert_eq!(order_first, order_second);
        assert!((first.confidence - second.confidence).abs() < f64::EPSILON);
    }

    #[test]
    fn test_access_bookkeeping_once_per_recall() {
        let (_dir, store, engine) = open_engine();
        let fact = store_fact(&store, "Docker images build in the release stage", 0.6);

        // Cache off for this check so both calls recompute
        let engine_no_cache = RecallEngine::new(
            store.clone(),
            RecallConfig {
                enable_caching: false,
                ..RecallConfig::default()
            },
            PerformanceConfig::default(),
        );

        engine_no_cache
            .attach_memories("docker release", 5, RecallStrategy::Auto, &RecallFilters::new())
            .unwrap();
        let after_one = store.get_memory_by_id(&fact.id).unwrap().unwrap();
        assert_eq!(after_one.access_count, 1);

        engine_no_cache
            .attach_memories("docker release", 5, RecallStrategy::Auto, &RecallFilters::new())
            .unwrap();
        let after_two = store.get_memory_by_id(&fact.id).unwrap().unwrap();
        assert_eq!(after_two.access_count, 2);
        drop(engine);
    }

    #[test]
    fn test_cache_hit_and_invalidation() {
        let (_dir, store, engine) = open_engine();
        store_fact(&store, "Kafka moves events between services", 0.6);

        let first = engine
            .attach_memories("kafka events", 5, RecallStrategy::Auto, &RecallFilters::new())
            .unwrap();
        let cache = engine.cache().unwrap();
        let misses_after_first = cache.miss_count();

        let second = engine
            .attach_memories("kafka events", 5, RecallStrategy::Auto, &RecallFilters::new())
            .unwrap();
        assert!(cache.hit_count() >= 1);
        assert_eq!(cache.miss_count(), misses_after_first);
        assert_eq!(first.memories.len(), second.memories.len());
        assert!((first.confidence - second.confidence).abs() < f64::EPSILON);

        // A write bumps the generation; the next call recomputes
        store_fact(&store, "Kafka topics are compacted weekly", 0.6);
        let third = engine
            .attach_memories("kafka events", 5, RecallStrategy::Auto, &RecallFilters::new())
            .unwrap();
        assert!(third.memories.len() >= second.memories.len());
    }

    #[test]
    fn test_filters_respected() {
        let (_dir, store, engine) = open_engine();
        let mut alice = Memory::new("Python preferences for Alice", MemoryType::Semantic, "manual");
        alice.user_id = Some("alice".to_string());
        store.store_memory(&alice).unwrap();
        let mut bob = Memory::new("Python preferences for Bob", MemoryType::Semantic, "manual");
        bob.user_id = Some("bob".to_string());
        store.store_memory(&bob).unwrap();

        let ctx = engine
            .attach_memories(
                "python preferences",
                10,
                RecallStrategy::Keyword,
                &RecallFilters::new().with_user_id("alice"),
            )
            .unwrap();
        assert_eq!(ctx.memories.len(), 1);
        assert_eq!(ctx.memories[0].id, alice.id);
    }

    #[test]
    fn test_entity_strategy_joins_mentions() {
        let (_dir, store, engine) = open_engine();
        store_fact(&store, "The scraper is written in Python", 0.5);
        store_fact(&store, "Deploy notes live in the runbook", 0.5);

        let ctx = engine
            .attach_memories(
                "Python rewrite plans",
                10,
                RecallStrategy::Entity,
                &RecallFilters::new(),
            )
            .unwrap();
        assert_eq!(ctx.memories.len(), 1);
        assert!(ctx.memories[0].content.contains("Python"));
    }

    #[test]
    fn test_no_matches_passthrough_prompt() {
        let (_dir, _store, engine) = open_engine();
        let ctx = engine
            .attach_memories("completely unknown topic", 10, RecallStrategy::Auto, &RecallFilters::new())
            .unwrap();
        assert!(ctx.memories.is_empty());
        assert_eq!(ctx.enhanced_prompt, ctx.original_prompt);
        assert!(ctx.confidence.abs() < f64::EPSILON);
    }
}
