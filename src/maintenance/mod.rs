//! Maintenance: cleanup, smart pruning, archive management, and
//! consolidation.
//!
//! Every destructive operation has a dry-run mode that reports counts
//! without mutating, and every pass is independent: a failing pass records
//! its error and the others continue.

pub mod archive;
pub mod cleanup;
pub mod consolidation;
pub mod pruning;

pub use archive::ArchiveManager;
pub use cleanup::{CleanupConfig, CleanupResult, CleanupRunner};
pub use consolidation::{ConsolidationConfig, ConsolidationResult, Consolidator};
pub use pruning::{PruneResult, PruningConfig, ScoreBreakdown, SmartPruner};
