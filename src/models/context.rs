//! Recall output types: filters and the composed memory context.

use super::{Memory, MemoryType};
use serde::{Deserialize, Serialize};

/// Filters constraining a recall call.
///
/// Scoping tags participate in the recall cache key, so per-user isolation
/// falls out of key construction rather than cache-side checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecallFilters {
    /// Restrict to memories carrying this user tag.
    pub user_id: Option<String>,
    /// Restrict to memories carrying this session tag.
    pub session_id: Option<String>,
    /// Restrict to memories carrying this agent tag.
    pub agent_id: Option<String>,
    /// Restrict to a single memory type.
    pub memory_type: Option<MemoryType>,
}

impl RecallFilters {
    /// Creates an empty filter set (matches all).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            user_id: None,
            session_id: None,
            agent_id: None,
            memory_type: None,
        }
    }

    /// Restricts to a user tag.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Restricts to a session tag.
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Restricts to an agent tag.
    #[must_use]
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Restricts to a memory type.
    #[must_use]
    pub const fn with_memory_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = Some(memory_type);
        self
    }

    /// Returns true if a memory passes every set filter.
    #[must_use]
    pub fn matches(&self, memory: &Memory) -> bool {
        if let Some(user_id) = &self.user_id {
            if memory.user_id.as_deref() != Some(user_id.as_str()) {
                return false;
            }
        }
        if let Some(session_id) = &self.session_id {
            if memory.session_id.as_deref() != Some(session_id.as_str()) {
                return false;
            }
        }
        if let Some(agent_id) = &self.agent_id {
            if memory.agent_id.as_deref() != Some(agent_id.as_str()) {
                return false;
            }
        }
        if let Some(memory_type) = self.memory_type {
            if memory.memory_type != memory_type {
                return false;
            }
        }
        true
    }
}

/// The composed result of a recall: ranked memories plus the enhanced
/// prompt built from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryContext {
    /// The caller's prompt, verbatim.
    pub original_prompt: String,
    /// Recalled facts interleaved with the original prompt. Equals
    /// `original_prompt` when nothing was recalled.
    pub enhanced_prompt: String,
    /// Recalled memories in final ranked order, capped at the caller's
    /// `max_memories`.
    pub memories: Vec<Memory>,
    /// Mean of the top-k combined scores, clamped to [0, 1].
    pub confidence: f64,
    /// Wall-clock duration of the recall.
    pub recall_time_ms: u64,
    /// Name of the strategy that produced the result.
    pub strategy_used: String,
}

impl MemoryContext {
    /// An empty context that passes the prompt through unchanged.
    #[must_use]
    pub fn passthrough(prompt: &str, strategy: &str) -> Self {
        Self {
            original_prompt: prompt.to_string(),
            enhanced_prompt: prompt.to_string(),
            memories: Vec::new(),
            confidence: 0.0,
            recall_time_ms: 0,
            strategy_used: strategy.to_string(),
        }
    }
}
