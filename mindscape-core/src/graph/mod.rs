//! The per-agent memory graph.
//!
//! Concepts and links live in owning maps keyed by their deterministic ids.
//! Every mutation either applies completely or returns an error naming the
//! missing node; there is no silent no-op path.

pub mod query;
pub mod stats;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::concept::{Concept, ConceptCategory, RelatedConcept, RelationKind};
use crate::config::StatsConfig;
use crate::error::{MindError, Result};
use crate::types::{AgentId, ConceptId, LinkId, MemoryId, clamp_unit};

pub use query::{
    GraphEdge, GraphEdgeKind, GraphFilter, GraphNode, GraphNodeKind, KnowledgeGraphData,
    KnowledgeGraphOptions, build_knowledge_graph,
};
pub use stats::{ConceptCluster, GraphStats, compute_stats};

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

/// Type of a persisted memory-to-memory link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    /// The memories share topics.
    Semantic,
    /// The memories happened close together.
    Temporal,
    /// The memories share an event.
    Causal,
    /// The memories share a feeling.
    Emotional,
    /// The memories share a named entity.
    Associative,
}

impl LinkType {
    /// Link type implied by a set of shared concept categories.
    ///
    /// Precedence: `Emotion` > `Event` > `Topic` > `Entity`; anything else
    /// (or nothing) is `Semantic`.
    #[must_use]
    pub fn from_shared_categories(categories: impl IntoIterator<Item = ConceptCategory>) -> Self {
        let mut best: Option<(u8, Self)> = None;
        for category in categories {
            let ranked = match category {
                ConceptCategory::Emotion => (4, Self::Emotional),
                ConceptCategory::Event => (3, Self::Causal),
                ConceptCategory::Topic => (2, Self::Semantic),
                ConceptCategory::Entity => (1, Self::Associative),
                ConceptCategory::Attribute | ConceptCategory::Relation => continue,
            };
            if best.is_none_or(|(rank, _)| ranked.0 > rank) {
                best = Some(ranked);
            }
        }
        best.map_or(Self::Semantic, |(_, link_type)| link_type)
    }

    /// Lowercase label used in graph payloads.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Temporal => "temporal",
            Self::Causal => "causal",
            Self::Emotional => "emotional",
            Self::Associative => "associative",
        }
    }
}

/// A scored edge between two memories. Created once per unordered pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryLink {
    /// Deterministic id of the unordered pair.
    pub id: LinkId,
    /// The memory whose processing created the link.
    pub source: MemoryId,
    /// The earlier memory it was linked to.
    pub target: MemoryId,
    /// Link type.
    pub link_type: LinkType,
    /// Strength in `[0, 1]`.
    pub strength: f32,
    /// Concepts both memories share.
    pub shared_concepts: Vec<ConceptId>,
    /// Human-readable breakdown of the score.
    pub reason: String,
    /// When the link was created.
    pub created_at: DateTime<Utc>,
}

impl MemoryLink {
    /// Whether the link touches `memory`.
    #[must_use]
    pub fn touches(&self, memory: MemoryId) -> bool {
        self.source == memory || self.target == memory
    }

    /// The endpoint opposite `memory`, if the link touches it.
    #[must_use]
    pub fn other(&self, memory: MemoryId) -> Option<MemoryId> {
        if self.source == memory {
            Some(self.target)
        } else if self.target == memory {
            Some(self.source)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// One agent's concepts, links and derived statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryGraph {
    /// Owning agent.
    pub agent_id: AgentId,
    concepts: BTreeMap<ConceptId, Concept>,
    links: BTreeMap<LinkId, MemoryLink>,
    /// Statistics derived from concepts and links.
    pub stats: GraphStats,
    /// Last mutation time.
    pub last_updated: DateTime<Utc>,
}

impl MemoryGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new(agent_id: AgentId, now: DateTime<Utc>) -> Self {
        Self {
            agent_id,
            concepts: BTreeMap::new(),
            links: BTreeMap::new(),
            stats: GraphStats::default(),
            last_updated: now,
        }
    }

    /// All concepts keyed by id.
    #[must_use]
    pub fn concepts(&self) -> &BTreeMap<ConceptId, Concept> {
        &self.concepts
    }

    /// All links keyed by id.
    #[must_use]
    pub fn links(&self) -> &BTreeMap<LinkId, MemoryLink> {
        &self.links
    }

    /// Look up a concept.
    #[must_use]
    pub fn concept(&self, id: ConceptId) -> Option<&Concept> {
        self.concepts.get(&id)
    }

    /// Mutable access to a concept.
    ///
    /// # Errors
    /// Returns `MindError::ConceptNotFound` if the concept is absent.
    pub fn concept_mut(&mut self, id: ConceptId) -> Result<&mut Concept> {
        self.concepts.get_mut(&id).ok_or(MindError::ConceptNotFound(id))
    }

    /// Insert a new concept. Returns `false` (and leaves the graph
    /// unchanged) if a concept with the same id already exists.
    pub fn insert_concept(&mut self, concept: Concept) -> bool {
        if self.concepts.contains_key(&concept.id) {
            return false;
        }
        self.concepts.insert(concept.id, concept);
        true
    }

    /// Record a symmetric relationship between two concepts.
    ///
    /// Both relation lists are re-sorted by strength (descending, ties by
    /// target id ascending) and truncated to `max_related`. An entry evicted
    /// by the cap is also dropped from the evicted concept's list, so
    /// relations stay mutual.
    ///
    /// # Errors
    /// Returns `MindError::SelfLink` if `a == b` and
    /// `MindError::ConceptNotFound` if either concept is absent.
    pub fn relate(
        &mut self,
        a: ConceptId,
        b: ConceptId,
        kind: RelationKind,
        strength: f32,
        max_related: usize,
    ) -> Result<()> {
        if a == b {
            return Err(MindError::SelfLink(a.to_string()));
        }
        for id in [a, b] {
            if !self.concepts.contains_key(&id) {
                return Err(MindError::ConceptNotFound(id));
            }
        }
        let strength = clamp_unit(strength);
        let mut evicted = Vec::new();
        for (from, to) in [(a, b), (b, a)] {
            let concept = self.concept_mut(from)?;
            for dropped in upsert_relation(&mut concept.related, to, kind, strength, max_related) {
                evicted.push((from, dropped));
            }
        }
        for (from, dropped) in evicted {
            if let Some(other) = self.concepts.get_mut(&dropped) {
                other.related.retain(|r| r.target != from);
            }
        }
        Ok(())
    }

    /// Remove the relationship between two concepts from both sides.
    /// Returns whether either side held an entry.
    ///
    /// # Errors
    /// Returns `MindError::ConceptNotFound` if either concept is absent.
    pub fn unrelate(&mut self, a: ConceptId, b: ConceptId) -> Result<bool> {
        for id in [a, b] {
            if !self.concepts.contains_key(&id) {
                return Err(MindError::ConceptNotFound(id));
            }
        }
        let mut removed = false;
        for (from, to) in [(a, b), (b, a)] {
            let related = &mut self.concept_mut(from)?.related;
            let before = related.len();
            related.retain(|r| r.target != to);
            removed |= related.len() != before;
        }
        Ok(removed)
    }

    /// Whether a link exists between `a` and `b` in either direction.
    #[must_use]
    pub fn has_link(&self, a: MemoryId, b: MemoryId) -> bool {
        self.links.contains_key(&LinkId::for_pair(a, b))
    }

    /// Insert a link. Returns `Ok(false)` if the pair is already linked.
    ///
    /// # Errors
    /// Returns `MindError::SelfLink` if both endpoints are the same memory.
    pub fn insert_link(&mut self, link: MemoryLink) -> Result<bool> {
        if link.source == link.target {
            return Err(MindError::SelfLink(link.source.to_string()));
        }
        let id = LinkId::for_pair(link.source, link.target);
        if self.links.contains_key(&id) {
            return Ok(false);
        }
        self.links.insert(
            id,
            MemoryLink {
                id,
                strength: clamp_unit(link.strength),
                ..link
            },
        );
        Ok(true)
    }

    /// Recompute statistics from concepts and links and stamp the graph.
    pub fn refresh_stats(&mut self, cfg: &StatsConfig, now: DateTime<Utc>) {
        self.stats = compute_stats(&self.concepts, &self.links, cfg);
        self.last_updated = now;
    }

    /// Case-insensitive lookup by name, optionally within one category.
    #[must_use]
    pub fn concept_by_name(&self, name: &str, category: Option<ConceptCategory>) -> Option<&Concept> {
        match category {
            Some(category) => self.concept(ConceptId::derive(category.as_str(), name)),
            None => {
                let name = name.trim().to_lowercase();
                self.concepts.values().find(|c| c.name == name)
            }
        }
    }

    /// Concepts related to `id`, strongest first.
    ///
    /// # Errors
    /// Returns `MindError::ConceptNotFound` if `id` is absent.
    pub fn related_concepts(&self, id: ConceptId) -> Result<Vec<(&Concept, &RelatedConcept)>> {
        let concept = self.concept(id).ok_or(MindError::ConceptNotFound(id))?;
        Ok(concept
            .related
            .iter()
            .filter_map(|r| self.concept(r.target).map(|c| (c, r)))
            .collect())
    }

    /// Links touching `memory`, strongest first.
    #[must_use]
    pub fn links_for_memory(&self, memory: MemoryId) -> Vec<&MemoryLink> {
        let mut links: Vec<&MemoryLink> =
            self.links.values().filter(|l| l.touches(memory)).collect();
        links.sort_by(|a, b| b.strength.total_cmp(&a.strength).then(a.id.cmp(&b.id)));
        links
    }

    /// Memories a concept was extracted from.
    ///
    /// # Errors
    /// Returns `MindError::ConceptNotFound` if `id` is absent.
    pub fn memories_for_concept(&self, id: ConceptId) -> Result<Vec<MemoryId>> {
        self.concept(id)
            .map(|c| c.memory_ids.iter().copied().collect())
            .ok_or(MindError::ConceptNotFound(id))
    }

    /// Concepts extracted from `memory`.
    pub fn concepts_for_memory(&self, memory: MemoryId) -> impl Iterator<Item = &Concept> {
        self.concepts
            .values()
            .filter(move |c| c.memory_ids.contains(&memory))
    }
}

/// Upsert and re-cap one side's relations. Returns the targets evicted.
fn upsert_relation(
    related: &mut Vec<RelatedConcept>,
    target: ConceptId,
    kind: RelationKind,
    strength: f32,
    max_related: usize,
) -> Vec<ConceptId> {
    if let Some(entry) = related.iter_mut().find(|r| r.target == target) {
        entry.kind = kind;
        entry.strength = strength;
    } else {
        related.push(RelatedConcept {
            target,
            kind,
            strength,
        });
    }
    related.sort_by(|x, y| {
        y.strength
            .total_cmp(&x.strength)
            .then(x.target.cmp(&y.target))
    });
    if related.len() <= max_related {
        return Vec::new();
    }
    related.split_off(max_related).into_iter().map(|r| r.target).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concept(name: &str, memory: MemoryId) -> Concept {
        Concept::new(name, ConceptCategory::Topic, memory, Utc::now(), 0.5, 0.0)
    }

    fn link(a: MemoryId, b: MemoryId, strength: f32) -> MemoryLink {
        MemoryLink {
            id: LinkId::for_pair(a, b),
            source: a,
            target: b,
            link_type: LinkType::Semantic,
            strength,
            shared_concepts: Vec::new(),
            reason: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn link_type_precedence() {
        use ConceptCategory::{Emotion, Entity, Event, Relation, Topic};
        assert_eq!(LinkType::from_shared_categories([Topic, Emotion]), LinkType::Emotional);
        assert_eq!(LinkType::from_shared_categories([Entity, Event, Topic]), LinkType::Causal);
        assert_eq!(LinkType::from_shared_categories([Entity, Topic]), LinkType::Semantic);
        assert_eq!(LinkType::from_shared_categories([Entity]), LinkType::Associative);
        assert_eq!(LinkType::from_shared_categories([Relation]), LinkType::Semantic);
        assert_eq!(
            LinkType::from_shared_categories(std::iter::empty()),
            LinkType::Semantic
        );
    }

    #[test]
    fn relate_missing_concept_fails_observably() {
        let mut graph = MemoryGraph::new(AgentId::new(), Utc::now());
        let c = concept("ocean", MemoryId::new());
        let id = c.id;
        graph.insert_concept(c);
        let missing = ConceptId::derive("topic", "nowhere");
        let err = graph
            .relate(id, missing, RelationKind::CoOccurrence, 0.5, 10)
            .expect_err("missing target");
        assert!(matches!(err, MindError::ConceptNotFound(m) if m == missing));
        assert!(graph.concept(id).expect("present").related.is_empty());
    }

    #[test]
    fn relate_is_symmetric_and_rejects_self() {
        let mut graph = MemoryGraph::new(AgentId::new(), Utc::now());
        let m = MemoryId::new();
        let (a, b) = (concept("ocean", m), concept("beach", m));
        let (ia, ib) = (a.id, b.id);
        graph.insert_concept(a);
        graph.insert_concept(b);
        graph
            .relate(ia, ib, RelationKind::CoOccurrence, 0.8, 10)
            .expect("relate");
        assert!(graph.concept(ia).and_then(|c| c.relation_to(ib)).is_some());
        assert!(graph.concept(ib).and_then(|c| c.relation_to(ia)).is_some());
        assert!(matches!(
            graph.relate(ia, ia, RelationKind::Similarity, 1.0, 10),
            Err(MindError::SelfLink(_))
        ));
    }

    #[test]
    fn relation_lists_are_capped_with_deterministic_ties() {
        let mut graph = MemoryGraph::new(AgentId::new(), Utc::now());
        let m = MemoryId::new();
        let hub = concept("hub", m);
        let hub_id = hub.id;
        graph.insert_concept(hub);
        let mut others = Vec::new();
        for name in ["a1", "b2", "c3", "d4"] {
            let c = concept(name, m);
            others.push(c.id);
            graph.insert_concept(c);
        }
        for id in &others {
            graph
                .relate(hub_id, *id, RelationKind::CoOccurrence, 0.5, 2)
                .expect("relate");
        }
        others.sort();
        let kept: Vec<ConceptId> = graph
            .concept(hub_id)
            .expect("hub")
            .related
            .iter()
            .map(|r| r.target)
            .collect();
        assert_eq!(kept, others[..2].to_vec());
    }

    #[test]
    fn capped_eviction_keeps_relations_mutual() {
        let mut graph = MemoryGraph::new(AgentId::new(), Utc::now());
        let m = MemoryId::new();
        let mut ids = Vec::new();
        for name in ["hub", "weak", "s1", "s2"] {
            let c = concept(name, m);
            ids.push(c.id);
            graph.insert_concept(c);
        }
        let (hub, weak, s1, s2) = (ids[0], ids[1], ids[2], ids[3]);
        graph
            .relate(hub, weak, RelationKind::CoOccurrence, 0.2, 2)
            .expect("relate");
        graph
            .relate(hub, s1, RelationKind::CoOccurrence, 0.9, 2)
            .expect("relate");
        graph
            .relate(hub, s2, RelationKind::CoOccurrence, 0.9, 2)
            .expect("relate");

        let has = |from: ConceptId, to: ConceptId| {
            graph.concept(from).and_then(|c| c.relation_to(to)).is_some()
        };
        assert!(!has(hub, weak));
        assert!(!has(weak, hub));
        assert!(has(hub, s1) && has(s1, hub));
        assert!(has(hub, s2) && has(s2, hub));
        for c in graph.concepts().values() {
            for r in &c.related {
                assert!(has(r.target, c.id), "one-sided relation {} -> {}", c.name, r.target);
            }
        }
    }

    #[test]
    fn full_target_list_rejects_relation_on_both_sides() {
        let mut graph = MemoryGraph::new(AgentId::new(), Utc::now());
        let m = MemoryId::new();
        let mut ids = Vec::new();
        for name in ["busy", "p1", "p2", "newcomer"] {
            let c = concept(name, m);
            ids.push(c.id);
            graph.insert_concept(c);
        }
        let (busy, p1, p2, newcomer) = (ids[0], ids[1], ids[2], ids[3]);
        graph.relate(busy, p1, RelationKind::CoOccurrence, 0.9, 2).expect("relate");
        graph.relate(busy, p2, RelationKind::CoOccurrence, 0.9, 2).expect("relate");
        graph
            .relate(newcomer, busy, RelationKind::Similarity, 0.1, 2)
            .expect("relate");
        assert!(graph.concept(newcomer).expect("newcomer").related.is_empty());
        assert_eq!(graph.concept(busy).expect("busy").related.len(), 2);
    }

    #[test]
    fn unrelate_clears_both_sides() {
        let mut graph = MemoryGraph::new(AgentId::new(), Utc::now());
        let m = MemoryId::new();
        let (a, b) = (concept("ocean", m), concept("beach", m));
        let (ia, ib) = (a.id, b.id);
        graph.insert_concept(a);
        graph.insert_concept(b);
        graph.relate(ia, ib, RelationKind::CoOccurrence, 0.8, 10).expect("relate");
        assert!(graph.unrelate(ib, ia).expect("unrelate"));
        assert!(graph.concept(ia).expect("a").related.is_empty());
        assert!(graph.concept(ib).expect("b").related.is_empty());
        assert!(!graph.unrelate(ia, ib).expect("already gone"));
    }

    #[test]
    fn duplicate_and_self_links() {
        let mut graph = MemoryGraph::new(AgentId::new(), Utc::now());
        let (a, b) = (MemoryId::new(), MemoryId::new());
        assert!(graph.insert_link(link(a, b, 0.5)).expect("insert"));
        assert!(!graph.insert_link(link(b, a, 0.9)).expect("duplicate"));
        assert_eq!(graph.links().len(), 1);
        assert!(graph.has_link(b, a));
        assert!(matches!(
            graph.insert_link(link(a, a, 0.5)),
            Err(MindError::SelfLink(_))
        ));
    }

    #[test]
    fn inserted_link_strength_is_clamped() {
        let mut graph = MemoryGraph::new(AgentId::new(), Utc::now());
        let (a, b) = (MemoryId::new(), MemoryId::new());
        graph.insert_link(link(a, b, 1.4)).expect("insert");
        assert!(graph.links().values().all(|l| l.strength <= 1.0));
    }

    #[test]
    fn concept_lookup_by_name() {
        let mut graph = MemoryGraph::new(AgentId::new(), Utc::now());
        let m = MemoryId::new();
        graph.insert_concept(concept("ocean", m));
        assert!(graph.concept_by_name("OCEAN", None).is_some());
        assert!(graph.concept_by_name("ocean", Some(ConceptCategory::Topic)).is_some());
        assert!(graph.concept_by_name("ocean", Some(ConceptCategory::Event)).is_none());
        assert_eq!(graph.concepts_for_memory(m).count(), 1);
    }
}
