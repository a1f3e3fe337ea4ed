//! Memory records: the unit of knowledge.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Unique identifier for a memory (UUID-shaped, globally unique).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(String);

impl MemoryId {
    /// Creates a memory ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MemoryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MemoryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Memory type categories. Drives default retention and classification
/// priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    /// Facts, identities, decisions. Never expires by default.
    #[default]
    Semantic,
    /// Events and work history. Expires after 30 days by default.
    Episodic,
    /// How-to knowledge and instructions. Never expires by default.
    Procedural,
    /// User and team preferences. Never expires by default.
    Preference,
    /// Current-task state. Expires after 1 day by default.
    Working,
    /// Raw observations. Expires after 6 hours by default.
    Sensory,
}

impl MemoryType {
    /// Returns all memory type variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Semantic,
            Self::Episodic,
            Self::Procedural,
            Self::Preference,
            Self::Working,
            Self::Sensory,
        ]
    }

    /// Returns the type as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Episodic => "episodic",
            Self::Procedural => "procedural",
            Self::Preference => "preference",
            Self::Working => "working",
            Self::Sensory => "sensory",
        }
    }

    /// Parses a memory type from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "semantic" => Some(Self::Semantic),
            "episodic" => Some(Self::Episodic),
            "procedural" => Some(Self::Procedural),
            "preference" => Some(Self::Preference),
            "working" => Some(Self::Working),
            "sensory" => Some(Self::Sensory),
            _ => None,
        }
    }

    /// Classification priority for tie-breaking: lower wins.
    ///
    /// SEMANTIC > PROCEDURAL > PREFERENCE > EPISODIC > WORKING > SENSORY.
    #[must_use]
    pub const fn priority(&self) -> u8 {
        match self {
            Self::Semantic => 0,
            Self::Procedural => 1,
            Self::Preference => 2,
            Self::Episodic => 3,
            Self::Working => 4,
            Self::Sensory => 5,
        }
    }

    /// Default retention period. `None` means the type never expires.
    #[must_use]
    pub fn default_retention(&self) -> Option<Duration> {
        match self {
            Self::Semantic | Self::Procedural | Self::Preference => None,
            Self::Episodic => Some(Duration::days(30)),
            Self::Working => Some(Duration::days(1)),
            Self::Sensory => Some(Duration::hours(6)),
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Computes the content hash: SHA-256 over lowercased, whitespace-normalized
/// content, hex-encoded. The uniqueness key for exact-duplicate detection.
#[must_use]
pub fn content_hash(content: &str) -> String {
    let normalized = crate::text::canonical_content(content);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// A single typed record of knowledge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Unique identifier.
    pub id: MemoryId,
    /// The text carrying the knowledge.
    pub content: String,
    /// SHA-256 over normalized content; unique across live memories.
    pub content_hash: String,
    /// Memory type; drives default retention.
    pub memory_type: MemoryType,
    /// Free-form origin tag: `ai-conversation`, `manual`, `git_sync`,
    /// `consolidation`, `claude-code-hook`, ...
    pub source_type: String,
    /// Importance in [0, 1].
    pub importance: f64,
    /// Classification confidence in [0, 1].
    pub confidence: f64,
    /// Wall-clock instant of creation, UTC.
    pub created_at: DateTime<Utc>,
    /// Start of the validity window.
    pub valid_from: DateTime<Utc>,
    /// End of the validity window. `None` means still valid.
    pub valid_to: Option<DateTime<Utc>>,
    /// Last recall hit, if any.
    pub accessed_at: Option<DateTime<Utc>>,
    /// Number of recall hits. Only grows.
    pub access_count: u32,
    /// Optional agent scoping tag.
    pub agent_id: Option<String>,
    /// Optional user scoping tag.
    pub user_id: Option<String>,
    /// Optional session scoping tag.
    pub session_id: Option<String>,
    /// Opaque JSON-shaped metadata.
    pub metadata: Option<String>,
    /// Entity surface forms mentioned by this memory. Persisted through
    /// `MENTIONS` edges, not as a memory column.
    #[serde(default)]
    pub entities: Vec<String>,
}

impl Memory {
    /// Creates a new memory with the default retention policy for its type.
    ///
    /// `valid_to` is set at write time from the retention period; `None`
    /// for types that never expire.
    #[must_use]
    pub fn new(content: impl Into<String>, memory_type: MemoryType, source_type: &str) -> Self {
        let content = content.into();
        let now = Utc::now();
        let hash = content_hash(&content);
        Self {
            id: MemoryId::generate(),
            content,
            content_hash: hash,
            memory_type,
            source_type: source_type.to_string(),
            importance: 0.5,
            confidence: 1.0,
            created_at: now,
            valid_from: now,
            valid_to: memory_type.default_retention().map(|d| now + d),
            accessed_at: None,
            access_count: 0,
            agent_id: None,
            user_id: None,
            session_id: None,
            metadata: None,
            entities: Vec::new(),
        }
    }

    /// Sets the importance, clamped to [0, 1].
    #[must_use]
    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance.clamp(0.0, 1.0);
        self
    }

    /// Sets the classification confidence, clamped to [0, 1].
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Sets the session scoping tag.
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Sets the agent scoping tag.
    #[must_use]
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Sets the user scoping tag.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets opaque metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    /// Sets the entity surface forms.
    #[must_use]
    pub fn with_entities(mut self, entities: Vec<String>) -> Self {
        self.entities = entities;
        self
    }

    /// Overrides the validity window end.
    #[must_use]
    pub const fn with_valid_to(mut self, valid_to: Option<DateTime<Utc>>) -> Self {
        self.valid_to = valid_to;
        self
    }

    /// Returns true if this memory is live at `now`: `valid_to` unset or in
    /// the future.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.valid_to.is_none_or(|v| v > now)
    }

    /// Returns true if the validity window has closed.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.is_live(now)
    }

    /// Age of this memory at `now`.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_id_generate_is_unique() {
        let a = MemoryId::generate();
        let b = MemoryId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn test_memory_type_roundtrip() {
        for ty in MemoryType::all() {
            assert_eq!(MemoryType::parse(ty.as_str()), Some(*ty));
        }
        assert_eq!(MemoryType::parse("SEMANTIC"), Some(MemoryType::Semantic));
        assert_eq!(MemoryType::parse("unknown"), None);
    }

    #[test]
    fn test_memory_type_priority_ordering() {
        assert!(MemoryType::Semantic.priority() < MemoryType::Procedural.priority());
        assert!(MemoryType::Procedural.priority() < MemoryType::Preference.priority());
        assert!(MemoryType::Preference.priority() < MemoryType::Episodic.priority());
        assert!(MemoryType::Episodic.priority() < MemoryType::Working.priority());
        assert!(MemoryType::Working.priority() < MemoryType::Sensory.priority());
    }

    #[test]
    fn test_default_retention() {
        assert!(MemoryType::Semantic.default_retention().is_none());
        assert!(MemoryType::Procedural.default_retention().is_none());
        assert!(MemoryType::Preference.default_retention().is_none());
        assert_eq!(
            MemoryType::Episodic.default_retention(),
            Some(Duration::days(30))
        );
        assert_eq!(
            MemoryType::Working.default_retention(),
            Some(Duration::days(1))
        );
        assert_eq!(
            MemoryType::Sensory.default_retention(),
            Some(Duration::hours(6))
        );
    }

    #[test]
    fn test_content_hash_normalization() {
        let a = content_hash("My name is Alice.");
        let b = content_hash("my   name   is alice.");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_content_hash_distinguishes_content() {
        assert_ne!(content_hash("Use PostgreSQL"), content_hash("Use MySQL"));
    }

    #[test]
    fn test_new_memory_sets_retention() {
        let semantic = Memory::new("a fact", MemoryType::Semantic, "manual");
        assert!(semantic.valid_to.is_none());

        let working = Memory::new("current task", MemoryType::Working, "manual");
        let valid_to = working.valid_to.unwrap();
        assert_eq!(valid_to - working.created_at, Duration::days(1));
    }

    #[test]
    fn test_liveness() {
        let now = Utc::now();
        let mut m = Memory::new("a fact", MemoryType::Semantic, "manual");
        assert!(m.is_live(now));

        m.valid_to = Some(now - Duration::seconds(1));
        assert!(m.is_expired(now));

        m.valid_to = Some(now + Duration::seconds(1));
        assert!(m.is_live(now));
    }

    #[test]
    fn test_importance_clamped() {
        let m = Memory::new("x", MemoryType::Semantic, "manual").with_importance(2.5);
        assert!((m.importance - 1.0).abs() < f64::EPSILON);
        let m = Memory::new("x", MemoryType::Semantic, "manual").with_importance(-0.5);
        assert!(m.importance.abs() < f64::EPSILON);
    }

    #[test]
    fn test_memory_serde_roundtrip() {
        let memory = Memory::new("a serializable fact", MemoryType::Preference, "manual")
            .with_importance(0.7)
            .with_session_id("sess-1")
            .with_entities(vec!["Fact".to_string()]);

        let json = serde_json::to_string(&memory).unwrap();
        assert!(json.contains("\"preference\""));
        let back: Memory = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, memory.id);
        assert_eq!(back.content, memory.content);
        assert_eq!(back.memory_type, memory.memory_type);
        assert_eq!(back.entities, memory.entities);
        assert_eq!(back.created_at, memory.created_at);
    }

    #[test]
    fn test_valid_from_not_after_created_at() {
        let m = Memory::new("a fact", MemoryType::Episodic, "manual");
        assert!(m.valid_from <= m.created_at);
        if let Some(valid_to) = m.valid_to {
            assert!(valid_to > m.valid_from);
        }
    }
}
