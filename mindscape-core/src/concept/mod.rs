//! Concepts — recurring semantic units distilled from memories.
//!
//! Extraction ([`extract`]) turns one memory into candidates; merging
//! ([`merge`]) folds candidates into the agent's graph and discovers
//! relationships between concepts.

pub mod extract;
pub mod merge;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ConceptId, MemoryId, clamp_signed, clamp_unit};

pub use extract::{ConceptCandidate, extract_concepts};
pub use merge::{MergeOutcome, discover_relationships, merge_candidates};

/// Semantic category of a concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptCategory {
    /// A named person, place or thing.
    Entity,
    /// A subject the memory is about.
    Topic,
    /// A feeling.
    Emotion,
    /// Something that happens at a point in time.
    Event,
    /// A property of the user ("favorite color blue", "I am a nurse").
    Attribute,
    /// A relationship to another person.
    Relation,
}

impl ConceptCategory {
    /// All categories, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Entity,
        Self::Topic,
        Self::Emotion,
        Self::Event,
        Self::Attribute,
        Self::Relation,
    ];

    /// Lowercase label, also the id-derivation prefix.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entity => "entity",
            Self::Topic => "topic",
            Self::Emotion => "emotion",
            Self::Event => "event",
            Self::Attribute => "attribute",
            Self::Relation => "relation",
        }
    }
}

impl std::fmt::Display for ConceptCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which heuristic produced a concept relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// The concepts appear in the same memories.
    CoOccurrence,
    /// The concept names share tokens.
    Similarity,
}

/// A directed entry in a concept's relationship list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedConcept {
    /// The related concept.
    pub target: ConceptId,
    /// How the relationship was discovered.
    pub kind: RelationKind,
    /// Relationship strength in `[0, 1]`.
    pub strength: f32,
}

/// A recurring semantic unit, shared by every memory it was extracted from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    /// Deterministic id derived from category and name.
    pub id: ConceptId,
    /// Normalized (lowercase) name.
    pub name: String,
    /// Semantic category.
    pub category: ConceptCategory,
    /// Human-readable description.
    pub description: String,
    /// Relationships to other concepts, strongest first.
    pub related: Vec<RelatedConcept>,
    /// How many memories mentioned this concept.
    pub occurrences: u32,
    /// Timestamp of the latest mention.
    pub last_occurrence: DateTime<Utc>,
    /// Every memory the concept was extracted from. Only grows.
    pub memory_ids: BTreeSet<MemoryId>,
    /// Importance in `[0, 1]`.
    pub importance: f32,
    /// Emotional valence in `[-1, 1]`.
    pub valence: f32,
}

impl Concept {
    /// Create a concept from its first mention.
    #[must_use]
    pub fn new(
        name: &str,
        category: ConceptCategory,
        memory: MemoryId,
        seen_at: DateTime<Utc>,
        importance: f32,
        valence: f32,
    ) -> Self {
        let name = name.trim().to_lowercase();
        Self {
            id: ConceptId::derive(category.as_str(), &name),
            description: format!("{category} '{name}'"),
            name,
            category,
            related: Vec::new(),
            occurrences: 1,
            last_occurrence: seen_at,
            memory_ids: BTreeSet::from([memory]),
            importance: clamp_unit(importance),
            valence: clamp_signed(valence),
        }
    }

    /// Strength of the relationship to `target`, if recorded.
    #[must_use]
    pub fn relation_to(&self, target: ConceptId) -> Option<&RelatedConcept> {
        self.related.iter().find(|r| r.target == target)
    }
}
