//! Force-directed layout for knowledge-graph exploration.
//!
//! A fixed-budget simulation: inverse-square repulsion between every node
//! pair, spring attraction along edges, a pull toward the canvas midpoint,
//! and damped velocities. Positions are clamped to the padded canvas after
//! every step.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ForceConfig;
use crate::graph::{GraphEdge, GraphFilter, GraphNode, GraphNodeKind, KnowledgeGraphData};
use crate::types::Point2;

/// Final position of one node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    /// Node identity.
    pub key: GraphNodeKind,
    /// Position on the canvas.
    pub position: Point2,
}

/// Iterative force-directed simulation.
#[derive(Debug, Clone)]
pub struct ForceLayout {
    cfg: ForceConfig,
}

impl ForceLayout {
    /// Create a layout with the given parameters.
    #[must_use]
    pub fn new(cfg: ForceConfig) -> Self {
        Self { cfg }
    }

    /// Apply `filter` to `data`, then run the simulation.
    #[must_use]
    pub fn run_filtered(&self, data: &KnowledgeGraphData, filter: &GraphFilter) -> Vec<NodePosition> {
        let filtered = filter.apply(data);
        self.run(&filtered.nodes, &filtered.edges)
    }

    /// Run the full iteration budget and return final positions in node order.
    ///
    /// Edges naming unknown nodes (or the same node twice) are ignored.
    #[must_use]
    pub fn run(&self, nodes: &[GraphNode], edges: &[GraphEdge]) -> Vec<NodePosition> {
        if nodes.is_empty() {
            return Vec::new();
        }
        let cfg = &self.cfg;
        let (lo_x, hi_x) = bounds(cfg.width, cfg.padding);
        let (lo_y, hi_y) = bounds(cfg.height, cfg.padding);
        let center = Point2::new((lo_x + hi_x) / 2.0, (lo_y + hi_y) / 2.0);

        let mut rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut pos: Vec<Point2> = nodes
            .iter()
            .map(|_| Point2::new(sample(&mut rng, lo_x, hi_x), sample(&mut rng, lo_y, hi_y)))
            .collect();
        let mut vel = vec![Point2::default(); nodes.len()];

        let index: HashMap<GraphNodeKind, usize> =
            nodes.iter().enumerate().map(|(i, n)| (n.key, i)).collect();
        let springs: Vec<(usize, usize, f32)> = edges
            .iter()
            .filter_map(|e| {
                let (a, b) = (*index.get(&e.source)?, *index.get(&e.target)?);
                (a != b).then_some((a, b, e.strength))
            })
            .collect();

        let min_distance = cfg.min_distance.max(f32::EPSILON);
        let mut force = vec![Point2::default(); nodes.len()];
        for _ in 0..cfg.iterations {
            force.fill(Point2::default());

            for i in 0..pos.len() {
                for j in (i + 1)..pos.len() {
                    let (mut dx, mut dy) = (pos[i].x - pos[j].x, pos[i].y - pos[j].y);
                    if dx * dx + dy * dy < f32::EPSILON {
                        (dx, dy) = (1.0, 0.0);
                    }
                    let dist = (dx * dx + dy * dy).sqrt().max(min_distance);
                    let push = cfg.repulsion / (dist * dist);
                    let (fx, fy) = (dx / dist * push, dy / dist * push);
                    force[i].x += fx;
                    force[i].y += fy;
                    force[j].x -= fx;
                    force[j].y -= fy;
                }
            }

            for &(a, b, strength) in &springs {
                let pull = spring_force(pos[a], pos[b], strength * cfg.attraction);
                force[a].x += pull.x;
                force[a].y += pull.y;
                force[b].x -= pull.x;
                force[b].y -= pull.y;
            }

            for i in 0..pos.len() {
                force[i].x += (center.x - pos[i].x) * cfg.centering;
                force[i].y += (center.y - pos[i].y) * cfg.centering;

                vel[i].x = (vel[i].x + force[i].x) * cfg.damping;
                vel[i].y = (vel[i].y + force[i].y) * cfg.damping;
                pos[i].x = (pos[i].x + vel[i].x).clamp(lo_x, hi_x);
                pos[i].y = (pos[i].y + vel[i].y).clamp(lo_y, hi_y);
            }
        }

        debug!(
            nodes = nodes.len(),
            springs = springs.len(),
            iterations = cfg.iterations,
            "force layout complete"
        );
        nodes
            .iter()
            .zip(pos)
            .map(|(node, position)| NodePosition {
                key: node.key,
                position,
            })
            .collect()
    }
}

/// Padded `[lo, hi]` interval; collapses to the midpoint when the padding
/// does not fit.
fn bounds(size: f32, padding: f32) -> (f32, f32) {
    let lo = padding.max(0.0);
    let hi = size - lo;
    if hi >= lo {
        (lo, hi)
    } else {
        let mid = size.max(0.0) / 2.0;
        (mid, mid)
    }
}

/// Spring pull on `from`: displacement × strength × attraction. Grows
/// linearly with distance.
fn spring_force(from: Point2, to: Point2, stiffness: f32) -> Point2 {
    Point2::new((to.x - from.x) * stiffness, (to.y - from.y) * stiffness)
}

fn sample(rng: &mut StdRng, lo: f32, hi: f32) -> f32 {
    if hi > lo { rng.gen_range(lo..hi) } else { lo }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concept::ConceptCategory;
    use crate::graph::GraphEdgeKind;
    use crate::memory::MemoryType;
    use crate::types::{ConceptId, MemoryId};

    fn node(key: GraphNodeKind) -> GraphNode {
        GraphNode {
            key,
            label: String::new(),
            category: Some(ConceptCategory::Topic),
            memory_type: None,
            weight: 1.0,
        }
    }

    fn seeded() -> ForceLayout {
        ForceLayout::new(ForceConfig {
            seed: Some(42),
            iterations: 100,
            ..ForceConfig::default()
        })
    }

    fn in_bounds(p: Point2, cfg: &ForceConfig) -> bool {
        (cfg.padding..=cfg.width - cfg.padding).contains(&p.x)
            && (cfg.padding..=cfg.height - cfg.padding).contains(&p.y)
    }

    #[test]
    fn zero_nodes_yield_empty_output() {
        assert!(seeded().run(&[], &[]).is_empty());
    }

    #[test]
    fn single_node_stays_in_bounds() {
        let layout = seeded();
        let out = layout.run(&[node(GraphNodeKind::Concept(ConceptId::derive("topic", "x")))], &[]);
        assert_eq!(out.len(), 1);
        assert!(in_bounds(out[0].position, &layout.cfg));
    }

    #[test]
    fn same_seed_is_reproducible() {
        let nodes: Vec<GraphNode> = (0..6)
            .map(|i| node(GraphNodeKind::Concept(ConceptId::derive("topic", &format!("n{i}")))))
            .collect();
        let a = seeded().run(&nodes, &[]);
        let b = seeded().run(&nodes, &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn springs_pull_connected_nodes_closer() {
        let nodes: Vec<GraphNode> = (0..4)
            .map(|i| node(GraphNodeKind::Concept(ConceptId::derive("topic", &format!("n{i}")))))
            .collect();
        let edge = GraphEdge {
            source: nodes[0].key,
            target: nodes[1].key,
            kind: GraphEdgeKind::Mentions,
            strength: 1.0,
        };
        let layout = ForceLayout::new(ForceConfig {
            seed: Some(7),
            attraction: 0.2,
            ..ForceConfig::default()
        });
        let out = layout.run(&nodes, &[edge]);
        let d = |a: Point2, b: Point2| ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt();
        let linked = d(out[0].position, out[1].position);
        let unlinked = d(out[2].position, out[3].position);
        assert!(linked < unlinked);
        assert!(out.iter().all(|p| in_bounds(p.position, &layout.cfg)));
    }

    #[test]
    fn spring_pull_scales_with_displacement() {
        let origin = Point2::new(0.0, 0.0);
        let near = spring_force(origin, Point2::new(3.0, 4.0), 0.5);
        let far = spring_force(origin, Point2::new(6.0, 8.0), 0.5);
        assert!((near.x - 1.5).abs() < 1e-6 && (near.y - 2.0).abs() < 1e-6);
        assert!((far.x - 2.0 * near.x).abs() < 1e-6);
        assert!((far.y - 2.0 * near.y).abs() < 1e-6);
    }

    #[test]
    fn unknown_edges_are_ignored() {
        let a = node(GraphNodeKind::Memory(MemoryId::new()));
        let ghost = GraphEdge {
            source: a.key,
            target: GraphNodeKind::Memory(MemoryId::new()),
            kind: GraphEdgeKind::Mentions,
            strength: 1.0,
        };
        let out = seeded().run(&[a], &[ghost]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn filter_runs_before_simulation() {
        let concept = node(GraphNodeKind::Concept(ConceptId::derive("topic", "c")));
        let memory = GraphNode {
            key: GraphNodeKind::Memory(MemoryId::new()),
            category: None,
            memory_type: Some(MemoryType::Fact),
            ..concept.clone()
        };
        let data = KnowledgeGraphData {
            nodes: vec![concept, memory],
            edges: Vec::new(),
        };
        let out = seeded().run_filtered(
            &data,
            &GraphFilter {
                memories_only: true,
                ..GraphFilter::default()
            },
        );
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0].key, GraphNodeKind::Memory(_)));
    }

    #[test]
    fn oversized_padding_collapses_to_midpoint() {
        let layout = ForceLayout::new(ForceConfig {
            width: 10.0,
            height: 10.0,
            padding: 20.0,
            seed: Some(1),
            ..ForceConfig::default()
        });
        let out = layout.run(&[node(GraphNodeKind::Memory(MemoryId::new()))], &[]);
        assert!((out[0].position.x - 5.0).abs() < 1e-5);
    }
}
