//! Entity types: surface-form tokens referenced by memories.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity type categories recognized by the extraction tagger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// Programming languages ("Rust", "Python").
    ProgrammingLanguage,
    /// Tools, frameworks, databases ("Docker", "PostgreSQL").
    Technology,
    /// Named individuals ("Alice Johnson").
    Person,
    /// Companies, teams, groups ("Acme Corp").
    Organization,
    /// File paths ("src/main.rs").
    File,
    /// URLs.
    Url,
    /// Email addresses.
    Email,
    /// Version strings ("v2.1.0").
    Version,
    /// Calendar dates.
    Date,
    /// Multi-word title-case noun phrases ("Payment Service").
    CompoundEntity,
}

impl EntityType {
    /// Returns the type as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ProgrammingLanguage => "programming_language",
            Self::Technology => "technology",
            Self::Person => "person",
            Self::Organization => "organization",
            Self::File => "file",
            Self::Url => "url",
            Self::Email => "email",
            Self::Version => "version",
            Self::Date => "date",
            Self::CompoundEntity => "compound_entity",
        }
    }

    /// Parses an entity type from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "programming_language" => Some(Self::ProgrammingLanguage),
            "technology" => Some(Self::Technology),
            "person" => Some(Self::Person),
            "organization" => Some(Self::Organization),
            "file" => Some(Self::File),
            "url" => Some(Self::Url),
            "email" => Some(Self::Email),
            "version" => Some(Self::Version),
            "date" => Some(Self::Date),
            "compound_entity" => Some(Self::CompoundEntity),
            _ => None,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An entity tagged in a piece of text.
///
/// Uniqueness is by `(entity_type, normalized)`; the original surface form
/// is kept for display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtractedEntity {
    /// The surface form as it appeared in the text.
    pub text: String,
    /// Lowercased, trimmed form used for uniqueness.
    pub normalized: String,
    /// The entity type.
    pub entity_type: EntityType,
}

impl ExtractedEntity {
    /// Creates an entity, computing the normalized form.
    #[must_use]
    pub fn new(text: impl Into<String>, entity_type: EntityType) -> Self {
        let text = text.into();
        let normalized = text.trim().to_lowercase();
        Self {
            text,
            normalized,
            entity_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_roundtrip() {
        for ty in [
            EntityType::ProgrammingLanguage,
            EntityType::Technology,
            EntityType::Person,
            EntityType::Organization,
            EntityType::File,
            EntityType::Url,
            EntityType::Email,
            EntityType::Version,
            EntityType::Date,
            EntityType::CompoundEntity,
        ] {
            assert_eq!(EntityType::parse(ty.as_str()), Some(ty));
        }
    }

    #[test]
    fn test_extracted_entity_normalization() {
        let e = ExtractedEntity::new("  FastAPI ", EntityType::Technology);
        assert_eq!(e.normalized, "fastapi");
        assert_eq!(e.text, "  FastAPI ");
    }
}
