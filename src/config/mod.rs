//! Configuration management.
//!
//! A [`KuzuMemoryConfig`] carries the tunables recognized by the core:
//! performance budgets, recall behavior, extraction bounds, storage pool
//! sizing, and retention policy. Defaults are sensible for a
//! project-scoped store; per-project overrides load from an optional
//! `config.yaml` next to the database, then environment variables.
//!
//! # Recognized keys and their effects
//!
//! | Key | Effect |
//! |---|---|
//! | `performance.max_recall_time_ms` | soft recall budget; breaches logged |
//! | `performance.max_generation_time_ms` | soft `remember` budget; breaches logged |
//! | `performance.enable_performance_monitoring` | toggles budget measurement |
//! | `recall.max_memories` | default cap per call |
//! | `recall.enable_caching` / `cache_size` / `cache_ttl_seconds` | recall cache shape |
//! | `recall.strategies` | subset of keyword/entity/temporal auto-mode runs |
//! | `recall.{keyword,entity,temporal}_weight` | auto-ensemble weights |
//! | `extraction.min_memory_length` / `max_memory_length` | candidate bounds |
//! | `extraction.enable_entity_extraction` | toggles the entity tagger |
//! | `extraction.enable_pattern_compilation` | eager pattern compilation |
//! | `storage.connection_pool_size` / `max_connections` | pool sizing |
//! | `storage.connection_timeout_ms` | pool wait before `PoolExhausted` |
//! | `storage.use_write_ahead_log` | WAL journal mode |
//! | `storage.max_retries` / `retry_backoff_ms` | transient-contention retry |
//! | `storage.query_timeout_ms` | per-statement time budget |
//! | `retention.enable_auto_cleanup` | opportunistic expiry sweeps |
//! | `retention.max_total_memories` | advisory live-count ceiling |
//! | `retention.retention_days.<type>` | per-type expiry; `-1` means never |

use crate::models::MemoryType;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Soft performance budgets. Breaches are logged, never raised.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Soft budget for a recall call in milliseconds.
    pub max_recall_time_ms: u64,
    /// Soft budget for a `remember` call in milliseconds.
    pub max_generation_time_ms: u64,
    /// Whether budget breaches are measured and logged at all.
    pub enable_performance_monitoring: bool,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_recall_time_ms: 100,
            max_generation_time_ms: 200,
            enable_performance_monitoring: true,
        }
    }
}

/// Recall behavior: default caps, caching, and the auto-mode ensemble.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecallConfig {
    /// Default cap on returned memories per call.
    pub max_memories: usize,
    /// Whether the recall cache is consulted at all.
    pub enable_caching: bool,
    /// LRU capacity of the recall cache.
    pub cache_size: usize,
    /// TTL for cache entries in seconds.
    pub cache_ttl_seconds: u64,
    /// Strategies the auto ensemble runs: subset of
    /// {"keyword", "entity", "temporal"}.
    pub strategies: Vec<String>,
    /// Ensemble weight for the keyword strategy.
    pub keyword_weight: f64,
    /// Ensemble weight for the entity strategy.
    pub entity_weight: f64,
    /// Ensemble weight for the temporal strategy.
    pub temporal_weight: f64,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            max_memories: 10,
            enable_caching: true,
            cache_size: 1000,
            cache_ttl_seconds: 300,
            strategies: vec![
                "keyword".to_string(),
                "entity".to_string(),
                "temporal".to_string(),
            ],
            keyword_weight: 0.5,
            entity_weight: 0.35,
            temporal_weight: 0.15,
        }
    }
}

/// Extraction bounds and toggles.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Units shorter than this never become candidates.
    pub min_memory_length: usize,
    /// Units longer than this are truncated at a word boundary.
    ///
    /// Truncation, not splitting: one oversized unit yields one capped
    /// candidate.
    pub max_memory_length: usize,
    /// Whether the entity tagger runs.
    pub enable_entity_extraction: bool,
    /// Whether pattern registries are compiled eagerly at startup.
    pub enable_pattern_compilation: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_memory_length: 5,
            max_memory_length: 1000,
            enable_entity_extraction: true,
            enable_pattern_compilation: true,
        }
    }
}

/// Storage pool sizing and adapter retry policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Connections opened eagerly at pool creation.
    pub connection_pool_size: usize,
    /// Hard upper bound on pooled connections.
    pub max_connections: usize,
    /// How long `with_connection` waits for a free connection.
    pub connection_timeout_ms: u64,
    /// Whether write-ahead logging is enabled on each connection.
    pub use_write_ahead_log: bool,
    /// Retry budget for transient write contention.
    pub max_retries: u32,
    /// Base backoff between retries; doubles per attempt, plus jitter.
    pub retry_backoff_ms: u64,
    /// Default per-statement time budget.
    pub query_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            connection_pool_size: 2,
            max_connections: 8,
            connection_timeout_ms: 5_000,
            use_write_ahead_log: true,
            max_retries: 3,
            retry_backoff_ms: 50,
            query_timeout_ms: 10_000,
        }
    }
}

/// Retention policy: auto-cleanup and per-type expiry overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Whether expired memories are swept opportunistically.
    pub enable_auto_cleanup: bool,
    /// Advisory ceiling on live memories; pruning consults it.
    pub max_total_memories: usize,
    /// Per-type retention in days; `-1` means never expire. Types absent
    /// from the map use the built-in defaults.
    pub retention_days: HashMap<String, i64>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enable_auto_cleanup: true,
            max_total_memories: 100_000,
            retention_days: HashMap::new(),
        }
    }
}

impl RetentionConfig {
    /// Effective retention for a type: the configured override, or the
    /// type's built-in default. `None` means never expire.
    #[must_use]
    pub fn effective_retention(&self, memory_type: MemoryType) -> Option<chrono::Duration> {
        match self.retention_days.get(memory_type.as_str()) {
            Some(days) if *days < 0 => None,
            Some(days) => Some(chrono::Duration::days(*days)),
            None => memory_type.default_retention(),
        }
    }
}

/// Top-level configuration for a memory store instance.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KuzuMemoryConfig {
    /// Soft performance budgets.
    pub performance: PerformanceConfig,
    /// Recall behavior.
    pub recall: RecallConfig,
    /// Extraction bounds.
    pub extraction: ExtractionConfig,
    /// Pool sizing and retry policy.
    pub storage: StorageConfig,
    /// Retention policy.
    pub retention: RetentionConfig,
}

impl KuzuMemoryConfig {
    /// Creates a configuration with all defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from YAML text.
    ///
    /// Absent keys keep their defaults, so a partial override file works.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml_ng::from_str(yaml).map_err(|e| Error::Validation(format!("invalid config: {e}")))
    }

    /// Loads configuration from a `config.yaml` file if it exists,
    /// otherwise returns defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Storage {
            operation: "read_config".to_string(),
            cause: e.to_string(),
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Applies environment variable overrides.
    ///
    /// Recognized: `KUZU_MEMORY_MAX_RECALL_MS`, `KUZU_MEMORY_MAX_MEMORIES`,
    /// `KUZU_MEMORY_CACHE_SIZE`, `KUZU_MEMORY_CACHE_TTL_SECONDS`,
    /// `KUZU_MEMORY_MAX_CONNECTIONS`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_parse::<u64>("KUZU_MEMORY_MAX_RECALL_MS") {
            self.performance.max_recall_time_ms = v;
        }
        if let Some(v) = env_parse::<usize>("KUZU_MEMORY_MAX_MEMORIES") {
            self.recall.max_memories = v;
        }
        if let Some(v) = env_parse::<usize>("KUZU_MEMORY_CACHE_SIZE") {
            self.recall.cache_size = v;
        }
        if let Some(v) = env_parse::<u64>("KUZU_MEMORY_CACHE_TTL_SECONDS") {
            self.recall.cache_ttl_seconds = v;
        }
        if let Some(v) = env_parse::<usize>("KUZU_MEMORY_MAX_CONNECTIONS") {
            self.storage.max_connections = v.max(1);
        }
        self
    }

    /// Validates cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.storage.max_connections == 0 {
            return Err(Error::Validation(
                "storage.max_connections must be at least 1".to_string(),
            ));
        }
        if self.storage.connection_pool_size > self.storage.max_connections {
            return Err(Error::Validation(format!(
                "storage.connection_pool_size ({}) exceeds storage.max_connections ({})",
                self.storage.connection_pool_size, self.storage.max_connections
            )));
        }
        if self.extraction.min_memory_length >= self.extraction.max_memory_length {
            return Err(Error::Validation(
                "extraction.min_memory_length must be below max_memory_length".to_string(),
            ));
        }
        let weight_sum =
            self.recall.keyword_weight + self.recall.entity_weight + self.recall.temporal_weight;
        if weight_sum <= 0.0 {
            return Err(Error::Validation(
                "recall strategy weights must sum to a positive value".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
