//! Concept merging and relationship discovery.
//!
//! Candidates are matched against existing concepts by category and
//! case-insensitive name (the same key the concept id is derived from).
//! Matches are reinforced; misses create new concepts.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{Concept, ConceptCandidate, RelationKind};
use crate::config::MergeConfig;
use crate::error::Result;
use crate::graph::MemoryGraph;
use crate::memory::MemoryRecord;
use crate::types::{ConceptId, MemoryId, clamp_signed, clamp_unit};

/// Which concepts a merge created and which it reinforced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    /// Newly created concepts.
    pub created: Vec<ConceptId>,
    /// Existing concepts that gained an occurrence.
    pub updated: Vec<ConceptId>,
}

impl MergeOutcome {
    /// Every concept the merge touched, created first.
    #[must_use]
    pub fn touched(&self) -> Vec<ConceptId> {
        self.created.iter().chain(&self.updated).copied().collect()
    }
}

/// Fold extracted candidates into `graph` on behalf of `memory`.
///
/// A memory already recorded on a concept does not count as a second
/// occurrence, so re-merging the same memory is a no-op.
pub fn merge_candidates(
    graph: &mut MemoryGraph,
    candidates: Vec<ConceptCandidate>,
    memory: &MemoryRecord,
    cfg: &MergeConfig,
) -> MergeOutcome {
    let seen_at = memory.created_at.unwrap_or(graph.last_updated);
    let mut outcome = MergeOutcome::default();

    for candidate in candidates {
        let id = ConceptId::derive(candidate.category.as_str(), &candidate.name);
        match graph.concept_mut(id) {
            Ok(concept) => {
                if reinforce(concept, &candidate, memory.id, seen_at, cfg) {
                    outcome.updated.push(id);
                }
            }
            Err(_) => {
                let concept = Concept::new(
                    &candidate.name,
                    candidate.category,
                    memory.id,
                    seen_at,
                    candidate.importance,
                    candidate.valence,
                );
                if graph.insert_concept(concept) {
                    outcome.created.push(id);
                }
            }
        }
    }

    debug!(
        memory_id = %memory.id,
        created = outcome.created.len(),
        updated = outcome.updated.len(),
        "candidates merged"
    );
    outcome
}

fn reinforce(
    concept: &mut Concept,
    candidate: &ConceptCandidate,
    memory: MemoryId,
    seen_at: chrono::DateTime<chrono::Utc>,
    cfg: &MergeConfig,
) -> bool {
    if !concept.memory_ids.insert(memory) {
        return false;
    }
    concept.occurrences = concept.occurrences.saturating_add(1);
    if seen_at > concept.last_occurrence {
        concept.last_occurrence = seen_at;
    }
    #[allow(clippy::cast_precision_loss)]
    let weight = (1.0 / concept.occurrences as f32).max(cfg.valence_recency_weight);
    concept.valence = clamp_signed(concept.valence * (1.0 - weight) + candidate.valence * weight);
    concept.importance =
        clamp_unit(concept.importance.max(candidate.importance) + cfg.importance_bump);
    true
}

/// Discover relationships between `touched` concepts and every other concept.
///
/// Strength is the larger of memory co-occurrence (Jaccard of memory-id
/// sets) and name similarity (token Jaccard × `similarity_weight`). An
/// existing relation whose recomputed strength falls below the minimum is
/// removed from both concepts. Returns how many relationships were written.
///
/// # Errors
/// Returns `MindError::ConceptNotFound` if a touched id is not in the graph.
pub fn discover_relationships(
    graph: &mut MemoryGraph,
    touched: &[ConceptId],
    cfg: &MergeConfig,
) -> Result<usize> {
    let mut written = 0;
    for &id in touched {
        let Some(concept) = graph.concept(id) else {
            return Err(crate::MindError::ConceptNotFound(id));
        };
        let tokens = name_tokens(&concept.name);
        let found: Vec<(ConceptId, RelationKind, f32)> = graph
            .concepts()
            .values()
            .filter(|other| other.id != id)
            .filter_map(|other| {
                let co = jaccard(&concept.memory_ids, &other.memory_ids);
                let sim = token_jaccard(&tokens, &name_tokens(&other.name)) * cfg.similarity_weight;
                let (kind, strength) = if co >= sim {
                    (RelationKind::CoOccurrence, co)
                } else {
                    (RelationKind::Similarity, sim)
                };
                let keep = strength >= cfg.min_relation_strength;
                (keep || concept.relation_to(other.id).is_some())
                    .then_some((other.id, kind, strength))
            })
            .collect();

        for (target, kind, strength) in found {
            if strength >= cfg.min_relation_strength {
                graph.relate(id, target, kind, strength, cfg.max_related)?;
                written += 1;
            } else if graph.unrelate(id, target)? {
                trace!(concept = %id, target = %target, strength, "relation dropped below minimum");
            }
        }
    }
    Ok(written)
}

fn name_tokens(name: &str) -> HashSet<&str> {
    name.split(|c: char| c.is_whitespace() || c == '-')
        .filter(|t| !t.is_empty())
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn jaccard(a: &BTreeSet<MemoryId>, b: &BTreeSet<MemoryId>) -> f32 {
    let shared = a.intersection(b).count();
    let union = a.len() + b.len() - shared;
    if union == 0 { 0.0 } else { shared as f32 / union as f32 }
}

#[allow(clippy::cast_precision_loss)]
fn token_jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> f32 {
    let shared = a.intersection(b).count();
    let union = a.len() + b.len() - shared;
    if union == 0 { 0.0 } else { shared as f32 / union as f32 }
}
