//! Knowledge-graph payloads for exploration views.
//!
//! Flattens a [`MemoryGraph`] (plus the memories it references) into a
//! bounded node/edge list that a force-directed layout can consume.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{LinkType, MemoryGraph};
use crate::concept::{ConceptCategory, RelationKind};
use crate::memory::{MemoryRecord, MemoryType};
use crate::types::{ConceptId, MemoryId};

/// Bounds applied when building a knowledge-graph payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeGraphOptions {
    /// Maximum concept nodes.
    pub max_nodes: usize,
    /// Maximum memory nodes (when memories are included).
    pub max_memory_nodes: usize,
    /// Edges weaker than this are dropped.
    pub min_link_strength: f32,
    /// Whether memories appear as nodes.
    pub include_memories: bool,
}

impl Default for KnowledgeGraphOptions {
    fn default() -> Self {
        Self {
            max_nodes: 100,
            max_memory_nodes: 50,
            min_link_strength: 0.1,
            include_memories: true,
        }
    }
}

/// Typed node identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum GraphNodeKind {
    /// A concept node.
    Concept(ConceptId),
    /// A memory node.
    Memory(MemoryId),
}

/// A node in the knowledge-graph payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Node identity.
    pub key: GraphNodeKind,
    /// Display label.
    pub label: String,
    /// Concept category (concept nodes only).
    pub category: Option<ConceptCategory>,
    /// Memory type (memory nodes only).
    pub memory_type: Option<MemoryType>,
    /// Relative size in `[0, 1]`.
    pub weight: f32,
}

/// Kind of a knowledge-graph edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphEdgeKind {
    /// Concept ↔ concept relationship.
    Related(RelationKind),
    /// Concept → memory it was extracted from.
    Mentions,
    /// Memory ↔ memory link.
    Link(LinkType),
}

/// An edge in the knowledge-graph payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Source node.
    pub source: GraphNodeKind,
    /// Target node.
    pub target: GraphNodeKind,
    /// Edge kind.
    pub kind: GraphEdgeKind,
    /// Strength in `[0, 1]`.
    pub strength: f32,
}

/// Nodes and edges for an exploration view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGraphData {
    /// Nodes, concepts first.
    pub nodes: Vec<GraphNode>,
    /// Edges between listed nodes only.
    pub edges: Vec<GraphEdge>,
}

/// Build a bounded knowledge-graph payload.
///
/// Concepts are ranked by occurrences, then importance, then id. Memory
/// nodes are drawn only from active memories the selected concepts mention.
#[must_use]
pub fn build_knowledge_graph(
    graph: &MemoryGraph,
    memories: &[MemoryRecord],
    opts: &KnowledgeGraphOptions,
) -> KnowledgeGraphData {
    let mut concepts: Vec<_> = graph.concepts().values().collect();
    concepts.sort_by(|a, b| {
        b.occurrences
            .cmp(&a.occurrences)
            .then(b.importance.total_cmp(&a.importance))
            .then(a.id.cmp(&b.id))
    });
    concepts.truncate(opts.max_nodes);

    let max_occurrences = concepts.first().map_or(1, |c| c.occurrences.max(1));
    let selected: BTreeSet<ConceptId> = concepts.iter().map(|c| c.id).collect();

    let mut data = KnowledgeGraphData::default();
    for concept in &concepts {
        #[allow(clippy::cast_precision_loss)]
        let weight = concept.occurrences as f32 / max_occurrences as f32;
        data.nodes.push(GraphNode {
            key: GraphNodeKind::Concept(concept.id),
            label: concept.name.clone(),
            category: Some(concept.category),
            memory_type: None,
            weight,
        });
        for rel in &concept.related {
            if concept.id < rel.target
                && selected.contains(&rel.target)
                && rel.strength >= opts.min_link_strength
            {
                data.edges.push(GraphEdge {
                    source: GraphNodeKind::Concept(concept.id),
                    target: GraphNodeKind::Concept(rel.target),
                    kind: GraphEdgeKind::Related(rel.kind),
                    strength: rel.strength,
                });
            }
        }
    }

    if !opts.include_memories || opts.max_memory_nodes == 0 {
        return data;
    }

    let mentioned: BTreeSet<MemoryId> = concepts
        .iter()
        .flat_map(|c| c.memory_ids.iter().copied())
        .collect();
    let mut records: Vec<&MemoryRecord> = memories
        .iter()
        .filter(|m| m.is_active() && mentioned.contains(&m.id))
        .collect();
    records.sort_by(|a, b| {
        b.importance()
            .cmp(&a.importance())
            .then(b.created_at.cmp(&a.created_at))
            .then(a.id.cmp(&b.id))
    });
    records.truncate(opts.max_memory_nodes);
    let shown: BTreeMap<MemoryId, &MemoryRecord> = records.iter().map(|m| (m.id, *m)).collect();

    for memory in &records {
        data.nodes.push(GraphNode {
            key: GraphNodeKind::Memory(memory.id),
            label: memory_label(memory),
            category: None,
            memory_type: Some(memory.memory_type),
            weight: f32::from(memory.importance()) / 10.0,
        });
    }
    for concept in &concepts {
        for memory in concept.memory_ids.iter().filter(|m| shown.contains_key(m)) {
            data.edges.push(GraphEdge {
                source: GraphNodeKind::Concept(concept.id),
                target: GraphNodeKind::Memory(*memory),
                kind: GraphEdgeKind::Mentions,
                strength: concept.importance.max(opts.min_link_strength),
            });
        }
    }
    for link in graph.links().values() {
        if link.strength >= opts.min_link_strength
            && shown.contains_key(&link.source)
            && shown.contains_key(&link.target)
        {
            data.edges.push(GraphEdge {
                source: GraphNodeKind::Memory(link.source),
                target: GraphNodeKind::Memory(link.target),
                kind: GraphEdgeKind::Link(link.link_type),
                strength: link.strength,
            });
        }
    }
    data
}

fn memory_label(memory: &MemoryRecord) -> String {
    let text = if memory.summary.is_empty() {
        &memory.content
    } else {
        &memory.summary
    };
    let mut label: String = text.chars().take(40).collect();
    if text.chars().count() > 40 {
        label.push('…');
    }
    label
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// Node filter applied before a force-directed layout runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphFilter {
    /// Keep only concepts of this category (memory nodes are unaffected).
    pub category: Option<ConceptCategory>,
    /// Keep only memory nodes.
    pub memories_only: bool,
    /// Keep only concept nodes.
    pub concepts_only: bool,
}

impl GraphFilter {
    /// Whether a node passes the filter.
    #[must_use]
    pub fn accepts(&self, node: &GraphNode) -> bool {
        match node.key {
            GraphNodeKind::Concept(_) => {
                !self.memories_only
                    && self
                        .category
                        .is_none_or(|category| node.category == Some(category))
            }
            GraphNodeKind::Memory(_) => !self.concepts_only,
        }
    }

    /// Filter nodes and drop edges whose endpoints did not survive.
    #[must_use]
    pub fn apply(&self, data: &KnowledgeGraphData) -> KnowledgeGraphData {
        let nodes: Vec<GraphNode> = data
            .nodes
            .iter()
            .filter(|n| self.accepts(n))
            .cloned()
            .collect();
        let kept: BTreeSet<GraphNodeKind> = nodes.iter().map(|n| n.key).collect();
        let edges = data
            .edges
            .iter()
            .filter(|e| kept.contains(&e.source) && kept.contains(&e.target))
            .cloned()
            .collect();
        KnowledgeGraphData { nodes, edges }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concept::Concept;
    use crate::types::AgentId;
    use chrono::Utc;

    fn fixture() -> (MemoryGraph, Vec<MemoryRecord>) {
        let agent = AgentId::new();
        let now = Utc::now();
        let m1 = MemoryRecord::new(agent, MemoryType::Fact, "likes the ocean", 7, now);
        let m2 = MemoryRecord::new(agent, MemoryType::Emotion, "felt calm", 3, now);
        let mut graph = MemoryGraph::new(agent, now);
        let mut ocean = Concept::new("ocean", ConceptCategory::Topic, m1.id, now, 0.7, 0.0);
        ocean.memory_ids.insert(m2.id);
        ocean.occurrences = 2;
        let calm = Concept::new("calm", ConceptCategory::Emotion, m2.id, now, 0.3, 0.4);
        let (io, ic) = (ocean.id, calm.id);
        graph.insert_concept(ocean);
        graph.insert_concept(calm);
        graph
            .relate(io, ic, RelationKind::CoOccurrence, 0.5, 10)
            .expect("relate");
        (graph, vec![m1, m2])
    }

    #[test]
    fn concepts_ranked_and_capped() {
        let (graph, memories) = fixture();
        let data = build_knowledge_graph(
            &graph,
            &memories,
            &KnowledgeGraphOptions {
                max_nodes: 1,
                include_memories: false,
                ..KnowledgeGraphOptions::default()
            },
        );
        assert_eq!(data.nodes.len(), 1);
        assert_eq!(data.nodes[0].label, "ocean");
        assert!(data.edges.is_empty());
    }

    #[test]
    fn memories_and_edges_included() {
        let (graph, memories) = fixture();
        let data = build_knowledge_graph(&graph, &memories, &KnowledgeGraphOptions::default());
        assert_eq!(data.nodes.len(), 4);
        let related = data
            .edges
            .iter()
            .filter(|e| matches!(e.kind, GraphEdgeKind::Related(_)))
            .count();
        let mentions = data
            .edges
            .iter()
            .filter(|e| e.kind == GraphEdgeKind::Mentions)
            .count();
        assert_eq!(related, 1);
        assert_eq!(mentions, 3);
    }

    #[test]
    fn min_strength_drops_weak_edges() {
        let (graph, memories) = fixture();
        let data = build_knowledge_graph(
            &graph,
            &memories,
            &KnowledgeGraphOptions {
                min_link_strength: 0.6,
                include_memories: false,
                ..KnowledgeGraphOptions::default()
            },
        );
        assert!(data.edges.is_empty());
    }

    #[test]
    fn filter_keeps_edges_consistent() {
        let (graph, memories) = fixture();
        let data = build_knowledge_graph(&graph, &memories, &KnowledgeGraphOptions::default());

        let concepts = GraphFilter {
            concepts_only: true,
            ..GraphFilter::default()
        }
        .apply(&data);
        assert_eq!(concepts.nodes.len(), 2);
        assert_eq!(concepts.edges.len(), 1);

        let emotions = GraphFilter {
            category: Some(ConceptCategory::Emotion),
            concepts_only: true,
            ..GraphFilter::default()
        }
        .apply(&data);
        assert_eq!(emotions.nodes.len(), 1);
        assert!(emotions.edges.is_empty());

        let memories_only = GraphFilter {
            memories_only: true,
            ..GraphFilter::default()
        }
        .apply(&data);
        assert!(memories_only
            .nodes
            .iter()
            .all(|n| matches!(n.key, GraphNodeKind::Memory(_))));
    }
}
