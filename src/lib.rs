//! # Kuzu Memory
//!
//! A project-scoped, graph-backed memory store for AI assistants.
//!
//! Kuzu Memory ingests free text into typed, deduplicated memory records,
//! retrieves the most relevant records for a query, and composes enhanced
//! prompts that interleave recalled facts with the caller's prompt. A
//! project's memories live in a single embedded database directory inside
//! the project tree; no external service is required.
//!
//! ## Features
//!
//! - Three-primitive contract: `remember`, `recall`, `attach_memories`
//! - Typed memory records with retention policy and bitemporal validity
//! - Deterministic pattern-based extraction with entity tagging
//! - Three-tier deduplication (exact hash, normalized, semantic overlap)
//! - Pluggable recall strategies (keyword, entity, temporal, auto ensemble)
//! - LRU recall cache with generation-based invalidation
//! - Maintenance: cleanup, multi-factor smart pruning with archive,
//!   consolidation of similar old memories into summaries
//! - Shared-database connection pooling so sibling processes can safely
//!   share one on-disk database
//!
//! ## Example
//!
//! ```rust,ignore
//! use kuzu_memory::service::RememberOptions;
//! use kuzu_memory::{KuzuMemoryConfig, MemoryService, RecallFilters, RecallStrategy};
//!
//! let service = MemoryService::initialize(".kuzu-memory/memories.db", KuzuMemoryConfig::default())?;
//! service.remember(
//!     "We decided to use PostgreSQL for storage.",
//!     "manual",
//!     &RememberOptions::default(),
//! )?;
//! let context = service.attach_memories(
//!     "What database do we use?",
//!     None,
//!     RecallStrategy::Auto,
//!     &RecallFilters::new(),
//! )?;
//! println!("{}", context.enhanced_prompt);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod dedup;
pub mod extraction;
pub mod logging;
pub mod maintenance;
pub mod models;
pub mod project;
pub mod recall;
pub mod service;
pub mod storage;
pub mod text;

// Re-exports for convenience
pub use config::KuzuMemoryConfig;
pub use dedup::{DedupDecision, DeduplicationEngine, MatchType};
pub use extraction::Extractor;
pub use models::{
    ArchivedMemory, EntityType, ExtractedEntity, Memory, MemoryContext, MemoryId, MemoryType,
    RecallFilters,
};
pub use recall::{RecallEngine, RecallStrategy};
pub use service::{MemoryService, MemoryStats};
pub use storage::{GraphAdapter, MemoryStore};

/// Error type for memory operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait
/// implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `Validation` | Empty content, empty query, out-of-range cap, malformed id |
/// | `DuplicateContent` | A store write would violate content-hash uniqueness |
/// | `DatabaseUnavailable` | The database path cannot be opened |
/// | `SchemaMismatch` | Persisted schema version is newer than supported |
/// | `PoolExhausted` | No free connection within the pool timeout |
/// | `QueryTimeout` | A single statement exceeded its budget |
/// | `WriteConflict` | Write-lock contention survived the retry budget |
/// | `Maintenance` | A maintenance pass failed (other passes continue) |
/// | `Storage` | A non-transient engine failure |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - Content is empty or whitespace-only
    /// - A recall query is empty
    /// - A cap or threshold is out of range
    /// - An id is malformed
    ///
    /// Never retried.
    #[error("invalid input: {0}")]
    Validation(String),

    /// A write would violate content-hash uniqueness.
    ///
    /// Internal signal: the store raises it, the deduplication engine
    /// catches it and upgrades the outcome to a skip. Callers of
    /// `MemoryService::remember` observe a success carrying the existing id
    /// instead.
    #[error("duplicate content: hash {content_hash} already stored as {existing_id}")]
    DuplicateContent {
        /// Hash of the duplicated content.
        content_hash: String,
        /// Id of the live memory that already carries this content.
        existing_id: String,
    },

    /// The database path could not be opened. Fatal for the caller.
    #[error("database unavailable at {path}: {cause}")]
    DatabaseUnavailable {
        /// The database path that failed to open.
        path: String,
        /// The underlying cause.
        cause: String,
    },

    /// The persisted schema version is newer than this build supports.
    #[error(
        "schema version {found} is newer than supported {supported}; \
         upgrade kuzu-memory to read this database"
    )]
    SchemaMismatch {
        /// Version found on disk.
        found: i32,
        /// Newest version this build understands.
        supported: i32,
    },

    /// No free connection became available within the pool timeout.
    #[error("connection pool exhausted after waiting {waited_ms}ms")]
    PoolExhausted {
        /// How long the caller waited before giving up.
        waited_ms: u64,
    },

    /// A single statement exceeded its time budget.
    #[error("query timeout: '{operation}' exceeded {timeout_ms}ms")]
    QueryTimeout {
        /// The operation that timed out.
        operation: String,
        /// The budget that was exceeded.
        timeout_ms: u64,
    },

    /// Write-lock contention survived the whole retry budget.
    ///
    /// Transient errors are retried internally with exponential backoff
    /// and jitter; this variant surfaces only when the budget is spent.
    #[error("write conflict: '{operation}' failed after {attempts} attempts: {cause}")]
    WriteConflict {
        /// The operation that kept conflicting.
        operation: String,
        /// Attempts made, including the first.
        attempts: u32,
        /// The last underlying engine error.
        cause: String,
    },

    /// A maintenance pass failed. Other passes continue.
    #[error("maintenance pass '{pass}' failed: {cause}")]
    Maintenance {
        /// The pass that failed (stale, duplicates, orphans, prune, consolidate).
        pass: String,
        /// The underlying cause.
        cause: String,
    },

    /// A non-transient storage failure.
    #[error("storage operation '{operation}' failed: {cause}")]
    Storage {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

/// Stable error classes exposed by the service facade.
///
/// The core layer raises precise [`Error`] variants; adapters (MCP, CLI)
/// only need to distinguish these three classes when formatting for their
/// channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller mistake; never retried.
    Validation,
    /// Worth retrying from the caller's point of view.
    Transient,
    /// Not recoverable without operator intervention.
    Fatal,
}

impl Error {
    /// Collapses the precise variant into a stable facade-level class.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) | Self::DuplicateContent { .. } => ErrorCategory::Validation,
            Self::PoolExhausted { .. } | Self::QueryTimeout { .. } | Self::WriteConflict { .. } => {
                ErrorCategory::Transient
            },
            Self::DatabaseUnavailable { .. }
            | Self::SchemaMismatch { .. }
            | Self::Maintenance { .. }
            | Self::Storage { .. } => ErrorCategory::Fatal,
        }
    }
}

/// Result type alias for memory operations.
pub type Result<T> = std::result::Result<T, Error>;
