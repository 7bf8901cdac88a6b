//! Visualization frames.
//!
//! A frame is a pure function of a memory snapshot, a stage, an optional
//! query and the forced ids from the last retrieval. Nothing here touches
//! storage or the clock; `now` is supplied by the caller.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use mindscape_core::activation::score_activation;
use mindscape_core::layout::polar_layout;
use mindscape_core::linking::{Connection, connect_memories};
use mindscape_core::{Activation, MemoryId, MemoryRecord, MindConfig, Vec3};
use serde::{Deserialize, Serialize};

use crate::flow::{ThoughtFlow, thought_flows};
use crate::stage::ProcessingStage;

/// Everything a renderer needs to draw one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationFrame {
    /// Stage the frame was generated for.
    pub stage: ProcessingStage,
    /// Polar position of every active memory.
    pub positions: BTreeMap<MemoryId, Vec3>,
    /// Activated memories and their strengths.
    pub activation: Activation,
    /// Memory-to-memory and core connections.
    pub connections: Vec<Connection>,
    /// Stage-dependent thought flows.
    pub thought_flows: Vec<ThoughtFlow>,
    /// Time the frame was laid out for.
    pub generated_at: DateTime<Utc>,
}

/// Build one frame from a memory snapshot.
#[must_use]
pub fn generate_frame(
    memories: &[MemoryRecord],
    stage: ProcessingStage,
    query: Option<&str>,
    forced: &[MemoryId],
    now: DateTime<Utc>,
    config: &MindConfig,
) -> VisualizationFrame {
    let activation = score_activation(memories, query, forced, &config.activation);
    let positions = polar_layout(memories, &activation, now, &config.polar);
    let connections = connect_memories(memories, &activation, &config.linking);
    let thought_flows = thought_flows(stage, &activation);
    VisualizationFrame {
        stage,
        positions,
        activation,
        connections,
        thought_flows,
        generated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use mindscape_core::linking::{ConnectionKind, NodeRef};
    use mindscape_core::{AgentId, MemoryType};

    fn snapshot() -> Vec<MemoryRecord> {
        let agent = AgentId::new();
        let t0 = Utc::now();
        vec![
            MemoryRecord::new(agent, MemoryType::Experience, "I went to the beach last year", 6, t0)
                .with_keywords(["beach", "vacation"]),
            MemoryRecord::new(agent, MemoryType::Fact, "Paris is in France", 4, t0 - Duration::days(2))
                .with_keywords(["paris"]),
        ]
    }

    #[test]
    fn frame_is_deterministic() {
        let memories = snapshot();
        let now = Utc::now();
        let cfg = MindConfig::default();
        let a = generate_frame(&memories, ProcessingStage::Processing, Some("beach"), &[], now, &cfg);
        let b = generate_frame(&memories, ProcessingStage::Processing, Some("beach"), &[], now, &cfg);
        assert_eq!(a, b);
        assert_eq!(a.positions.len(), 2);
    }

    #[test]
    fn activated_memories_connect_to_core() {
        let memories = snapshot();
        let cfg = MindConfig::default();
        let frame = generate_frame(
            &memories,
            ProcessingStage::Retrieving,
            None,
            &[memories[1].id],
            Utc::now(),
            &cfg,
        );
        assert!((frame.activation.get(memories[1].id).expect("forced") - 1.0).abs() < 1e-6);
        assert!(frame.connections.iter().any(|c| c.kind == ConnectionKind::Core
            && c.from == NodeRef::Core
            && c.to == NodeRef::Memory(memories[1].id)));
        assert_eq!(frame.thought_flows.len(), frame.activation.len());
    }

    #[test]
    fn empty_snapshot_yields_empty_frame() {
        let frame = generate_frame(&[], ProcessingStage::Idle, Some(""), &[], Utc::now(), &MindConfig::default());
        assert!(frame.positions.is_empty());
        assert!(frame.activation.is_empty());
        assert!(frame.connections.is_empty());
        assert!(frame.thought_flows.is_empty());
    }
}
