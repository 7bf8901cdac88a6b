//! Graph statistics — derived entirely from concepts and links.
//!
//! Recomputed in full on every graph change, so the stored value can always
//! be checked against a fresh derivation.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::MemoryLink;
use crate::concept::{Concept, ConceptCategory};
use crate::config::StatsConfig;
use crate::types::{ConceptId, LinkId, MemoryId};

/// A group of closely related concepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptCluster {
    /// Display label.
    pub label: String,
    /// Dominant category of the members.
    pub category: ConceptCategory,
    /// Member concepts in id order.
    pub concepts: Vec<ConceptId>,
}

/// Aggregate statistics of one memory graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    /// Number of concepts.
    pub total_concepts: usize,
    /// Number of memory links.
    pub total_links: usize,
    /// Distinct memories referenced by any concept or link.
    pub total_memories: usize,
    /// Mean link strength, 0 when there are no links.
    pub average_link_strength: f32,
    /// Memory with the most incident links (lowest id on ties).
    pub most_connected_memory: Option<MemoryId>,
    /// Relation-based clusters followed by per-category groups.
    pub concept_clusters: Vec<ConceptCluster>,
}

/// Derive statistics from a graph's concepts and links.
#[must_use]
pub fn compute_stats(
    concepts: &BTreeMap<ConceptId, Concept>,
    links: &BTreeMap<LinkId, MemoryLink>,
    cfg: &StatsConfig,
) -> GraphStats {
    let mut memories: BTreeSet<MemoryId> = concepts
        .values()
        .flat_map(|c| c.memory_ids.iter().copied())
        .collect();

    let mut degree: BTreeMap<MemoryId, usize> = BTreeMap::new();
    let mut strength_sum = 0.0_f64;
    for link in links.values() {
        memories.insert(link.source);
        memories.insert(link.target);
        *degree.entry(link.source).or_default() += 1;
        *degree.entry(link.target).or_default() += 1;
        strength_sum += f64::from(link.strength);
    }

    // BTreeMap iteration is id-ascending and max_by_key keeps the last
    // maximum, so iterate in reverse to prefer the lowest id.
    let most_connected_memory = degree
        .iter()
        .rev()
        .max_by_key(|(_, d)| **d)
        .map(|(id, _)| *id);

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    let average_link_strength = if links.is_empty() {
        0.0
    } else {
        (strength_sum / links.len() as f64) as f32
    };

    GraphStats {
        total_concepts: concepts.len(),
        total_links: links.len(),
        total_memories: memories.len(),
        average_link_strength,
        most_connected_memory,
        concept_clusters: cluster_concepts(concepts, cfg.cluster_strength),
    }
}

// ---------------------------------------------------------------------------
// Clustering
// ---------------------------------------------------------------------------

/// Union-find over mutual relations at or above `threshold`.
fn cluster_concepts(
    concepts: &BTreeMap<ConceptId, Concept>,
    threshold: f32,
) -> Vec<ConceptCluster> {
    let ids: Vec<ConceptId> = concepts.keys().copied().collect();
    let index: BTreeMap<ConceptId, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let mut sets = DisjointSet::new(ids.len());

    for (i, concept) in concepts.values().enumerate() {
        for rel in &concept.related {
            if rel.strength < threshold {
                continue;
            }
            let Some(&j) = index.get(&rel.target) else {
                continue;
            };
            let mutual = concepts
                .get(&rel.target)
                .and_then(|other| other.relation_to(concept.id))
                .is_some_and(|back| back.strength >= threshold);
            if mutual {
                sets.union(i, j);
            }
        }
    }

    let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..ids.len() {
        components.entry(sets.find(i)).or_default().push(i);
    }

    let members: Vec<&Concept> = concepts.values().collect();
    let mut clusters = Vec::new();
    let mut loose: BTreeMap<ConceptCategory, Vec<ConceptId>> = BTreeMap::new();
    let mut groups: Vec<Vec<usize>> = components.into_values().collect();
    groups.sort_by_key(|g| g.first().copied());

    for group in groups {
        if group.len() < 2 {
            for i in group {
                loose.entry(members[i].category).or_default().push(ids[i]);
            }
            continue;
        }
        let category = dominant_category(group.iter().map(|&i| members[i].category));
        let anchor = group
            .iter()
            .map(|&i| members[i])
            .max_by(|a, b| a.occurrences.cmp(&b.occurrences).then(b.id.cmp(&a.id)));
        let label = anchor.map_or_else(
            || category.to_string(),
            |c| format!("{} ({category})", c.name),
        );
        clusters.push(ConceptCluster {
            label,
            category,
            concepts: group.iter().map(|&i| ids[i]).collect(),
        });
    }

    for (category, concepts) in loose {
        clusters.push(ConceptCluster {
            label: category.to_string(),
            category,
            concepts,
        });
    }
    clusters
}

/// Most frequent category; ties go to the earlier category.
fn dominant_category(categories: impl Iterator<Item = ConceptCategory>) -> ConceptCategory {
    let mut counts: BTreeMap<ConceptCategory, usize> = BTreeMap::new();
    for c in categories {
        *counts.entry(c).or_default() += 1;
    }
    counts
        .iter()
        .rev()
        .max_by_key(|(_, n)| **n)
        .map_or(ConceptCategory::Topic, |(c, _)| *c)
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}
