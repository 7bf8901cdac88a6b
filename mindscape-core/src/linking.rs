//! Memory linking — independent scoring heuristics between memory pairs.
//!
//! The same three terms score both persisted graph links and ephemeral
//! frame connections:
//!
//! ```text
//! concept  = min(shared × per_shared_concept, concept_cap)
//! thread   = thread_bonus            if both carry the same thread id
//! temporal = temporal_weight × (1 − Δt / window)   if Δt < window
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::activation::Activation;
use crate::concept::ConceptCategory;
use crate::config::LinkingConfig;
use crate::error::Result;
use crate::graph::{LinkType, MemoryGraph, MemoryLink};
use crate::memory::MemoryRecord;
use crate::types::{ConceptId, LinkId, MemoryId, clamp_unit};

/// Per-term breakdown of a pair score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkScore {
    /// Shared-concept (or shared-keyword) term.
    pub concept: f32,
    /// Same-thread bonus.
    pub thread: f32,
    /// Temporal-proximity term.
    pub temporal: f32,
    /// Sum of the terms, clamped to `[0, 1]`.
    pub total: f32,
}

impl LinkScore {
    /// Human-readable summary of the non-zero terms.
    #[must_use]
    pub fn reason(&self, shared: usize) -> String {
        let mut parts = Vec::new();
        if self.concept > 0.0 {
            parts.push(format!("{shared} shared concept(s)"));
        }
        if self.thread > 0.0 {
            parts.push("same conversation".to_string());
        }
        if self.temporal > 0.0 {
            parts.push("close in time".to_string());
        }
        parts.join(", ")
    }
}

/// Score a memory pair given how many concepts (or keywords) they share.
#[must_use]
pub fn score_pair(
    a: &MemoryRecord,
    b: &MemoryRecord,
    shared: usize,
    cfg: &LinkingConfig,
) -> LinkScore {
    #[allow(clippy::cast_precision_loss)]
    let concept = (shared as f32 * cfg.per_shared_concept).min(cfg.concept_cap);

    let thread = match (a.thread_id_by(&cfg.thread_key), b.thread_id_by(&cfg.thread_key)) {
        (Some(x), Some(y)) if x == y => cfg.thread_bonus,
        _ => 0.0,
    };

    #[allow(clippy::cast_precision_loss)]
    let temporal = match a.seconds_apart(b) {
        Some(dt) if dt < cfg.temporal_window_secs => {
            cfg.temporal_weight * (1.0 - dt as f32 / cfg.temporal_window_secs as f32)
        }
        _ => 0.0,
    };

    LinkScore {
        concept,
        thread,
        temporal,
        total: clamp_unit(concept + thread + temporal),
    }
}

/// Link a freshly merged memory to every other active memory it shares a
/// concept with. Returns the ids of the links created.
///
/// Pairs that are already linked are left untouched.
///
/// # Errors
/// Propagates graph mutation errors.
pub fn link_new_memory(
    graph: &mut MemoryGraph,
    memory: &MemoryRecord,
    others: &[MemoryRecord],
    cfg: &LinkingConfig,
    now: DateTime<Utc>,
) -> Result<Vec<LinkId>> {
    let mut shared: BTreeMap<MemoryId, Vec<(ConceptId, ConceptCategory)>> = BTreeMap::new();
    for concept in graph.concepts_for_memory(memory.id) {
        for other in concept.memory_ids.iter().filter(|m| **m != memory.id) {
            shared
                .entry(*other)
                .or_default()
                .push((concept.id, concept.category));
        }
    }

    let mut created = Vec::new();
    for other in others {
        if other.id == memory.id || !other.is_active() {
            continue;
        }
        let Some(concepts) = shared.get(&other.id) else {
            continue;
        };
        if graph.has_link(memory.id, other.id) {
            continue;
        }
        let score = score_pair(memory, other, concepts.len(), cfg);
        if score.total < cfg.threshold {
            continue;
        }
        let link = MemoryLink {
            id: LinkId::for_pair(memory.id, other.id),
            source: memory.id,
            target: other.id,
            link_type: LinkType::from_shared_categories(concepts.iter().map(|(_, c)| *c)),
            strength: score.total,
            shared_concepts: concepts.iter().map(|(id, _)| *id).collect(),
            reason: score.reason(concepts.len()),
            created_at: now,
        };
        let id = link.id;
        if graph.insert_link(link)? {
            created.push(id);
        }
    }

    debug!(
        memory_id = %memory.id,
        candidates = shared.len(),
        links = created.len(),
        "memory linked"
    );
    Ok(created)
}

// ---------------------------------------------------------------------------
// Frame connections
// ---------------------------------------------------------------------------

/// An endpoint of a frame connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum NodeRef {
    /// A memory.
    Memory(MemoryId),
    /// The synthetic core node at the origin.
    Core,
}

/// Why two frame nodes are connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    /// Same conversation thread.
    Conversation,
    /// Close in time.
    Temporal,
    /// Shared keywords only.
    Keyword,
    /// An activated memory tied to the core.
    Core,
}

/// An ephemeral connection drawn in a visualization frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    /// First endpoint.
    pub from: NodeRef,
    /// Second endpoint.
    pub to: NodeRef,
    /// Connection kind.
    pub kind: ConnectionKind,
    /// Strength in `[0, 1]`.
    pub strength: f32,
}

/// Connect every pair of active memories whose keyword-overlap score
/// reaches the threshold, and tie every activated memory to the core.
#[must_use]
pub fn connect_memories(
    memories: &[MemoryRecord],
    activation: &Activation,
    cfg: &LinkingConfig,
) -> Vec<Connection> {
    let active: Vec<(&MemoryRecord, Vec<String>)> = memories
        .iter()
        .filter(|m| m.is_active())
        .map(|m| (m, m.normalized_keywords()))
        .collect();

    let mut connections = Vec::new();
    for (i, (a, a_keywords)) in active.iter().enumerate() {
        for (b, b_keywords) in &active[i + 1..] {
            let shared = a_keywords.iter().filter(|k| b_keywords.contains(k)).count();
            let score = score_pair(a, b, shared, cfg);
            if score.total < cfg.threshold {
                continue;
            }
            let kind = if score.thread > 0.0 {
                ConnectionKind::Conversation
            } else if score.temporal > 0.0 {
                ConnectionKind::Temporal
            } else {
                ConnectionKind::Keyword
            };
            connections.push(Connection {
                from: NodeRef::Memory(a.id),
                to: NodeRef::Memory(b.id),
                kind,
                strength: score.total,
            });
        }
    }

    for (memory, _) in &active {
        if activation.contains(memory.id) {
            connections.push(Connection {
                from: NodeRef::Core,
                to: NodeRef::Memory(memory.id),
                kind: ConnectionKind::Core,
                strength: clamp_unit(cfg.core_strength),
            });
        }
    }
    connections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concept::Concept;
    use crate::memory::MemoryType;
    use crate::types::AgentId;
    use chrono::Duration;

    fn pair(gap: Duration, thread: Option<&str>) -> (MemoryRecord, MemoryRecord) {
        let agent = AgentId::new();
        let t0 = Utc::now();
        let mut a = MemoryRecord::new(agent, MemoryType::Conversation, "a", 5, t0)
            .with_keywords(["ocean", "travel"]);
        let mut b = MemoryRecord::new(agent, MemoryType::Conversation, "b", 5, t0 + gap)
            .with_keywords(["ocean", "travel"]);
        if let Some(t) = thread {
            a = a.with_thread(t);
            b = b.with_thread(t);
        }
        (a, b)
    }

    #[test]
    fn score_terms_follow_weights() {
        let (a, b) = pair(Duration::minutes(3), Some("t1"));
        let s = score_pair(&a, &b, 2, &LinkingConfig::default());
        assert!((s.concept - 0.2).abs() < 1e-6);
        assert!((s.thread - 0.3).abs() < 1e-6);
        assert!((s.temporal - 0.19).abs() < 1e-6);
        assert!((s.total - 0.69).abs() < 1e-5);
    }

    #[test]
    fn concept_term_saturates_and_total_clamps() {
        let (a, b) = pair(Duration::zero(), Some("t1"));
        let s = score_pair(&a, &b, 50, &LinkingConfig::default());
        assert!((s.concept - 0.3).abs() < 1e-6);
        assert!(s.total <= 1.0);
    }

    #[test]
    fn distant_unthreaded_pair_scores_only_concepts() {
        let (a, b) = pair(Duration::hours(2), None);
        let s = score_pair(&a, &b, 1, &LinkingConfig::default());
        assert!(s.thread.abs() < f32::EPSILON);
        assert!(s.temporal.abs() < f32::EPSILON);
        assert!((s.total - 0.1).abs() < 1e-6);
    }

    #[test]
    fn missing_timestamp_drops_temporal_term() {
        let (a, mut b) = pair(Duration::zero(), None);
        b.created_at = None;
        let s = score_pair(&a, &b, 0, &LinkingConfig::default());
        assert!(s.temporal.abs() < f32::EPSILON);
    }

    #[test]
    fn conversation_scenario_yields_single_connection() {
        let (a, b) = pair(Duration::minutes(3), Some("t1"));
        let conns = connect_memories(&[a, b], &Activation::new(), &LinkingConfig::default());
        assert_eq!(conns.len(), 1);
        assert_eq!(conns[0].kind, ConnectionKind::Conversation);
        assert!((0.68..=0.70).contains(&conns[0].strength));
    }

    #[test]
    fn activated_memories_connect_to_core() {
        let (a, b) = pair(Duration::hours(5), None);
        let mut act = Activation::new();
        act.insert(a.id, 0.8);
        let conns = connect_memories(&[a.clone(), b], &act, &LinkingConfig::default());
        let core: Vec<_> = conns
            .iter()
            .filter(|c| c.kind == ConnectionKind::Core)
            .collect();
        assert_eq!(core.len(), 1);
        assert_eq!(core[0].from, NodeRef::Core);
        assert_eq!(core[0].to, NodeRef::Memory(a.id));
        assert!((core[0].strength - 0.9).abs() < 1e-6);
    }

    #[test]
    fn new_memory_links_only_through_shared_concepts() {
        let (a, b) = pair(Duration::minutes(3), Some("t1"));
        let stranger = MemoryRecord::new(
            a.agent_id,
            MemoryType::Fact,
            "unrelated",
            5,
            Utc::now(),
        )
        .with_thread("t1");
        let now = Utc::now();
        let mut graph = MemoryGraph::new(a.agent_id, now);
        let mut ocean = Concept::new("ocean", ConceptCategory::Topic, a.id, now, 0.5, 0.0);
        ocean.memory_ids.insert(b.id);
        let mut travel = Concept::new("travel", ConceptCategory::Event, a.id, now, 0.5, 0.0);
        travel.memory_ids.insert(b.id);
        graph.insert_concept(ocean);
        graph.insert_concept(travel);

        let others = vec![a.clone(), stranger];
        let created = link_new_memory(&mut graph, &b, &others, &LinkingConfig::default(), now)
            .expect("link");
        assert_eq!(created.len(), 1);
        let link = &graph.links()[&created[0]];
        assert_eq!(link.link_type, LinkType::Causal);
        assert_eq!(link.shared_concepts.len(), 2);
        assert!((link.strength - 0.69).abs() < 1e-5);

        let again = link_new_memory(&mut graph, &b, &others, &LinkingConfig::default(), now)
            .expect("relink");
        assert!(again.is_empty());
        assert_eq!(graph.links().len(), 1);
    }
}
