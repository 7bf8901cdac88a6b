//! Thought flows: the animated vectors drawn between the core, the
//! input/output points and activated memories.

use std::collections::BTreeMap;

use mindscape_core::{Activation, MemoryId, Vec3};
use serde::{Deserialize, Serialize};

use crate::stage::ProcessingStage;

/// One end of a thought flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum FlowEndpoint {
    /// Where incoming messages enter the scene.
    Input,
    /// Where responses leave the scene.
    Output,
    /// The agent's core at the origin.
    Core,
    /// An activated memory.
    Memory(MemoryId),
}

/// Fixed anchor points for the non-memory endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowAnchors {
    /// Input point.
    pub input: Vec3,
    /// Output point.
    pub output: Vec3,
    /// Core point.
    pub core: Vec3,
}

impl Default for FlowAnchors {
    fn default() -> Self {
        Self {
            input: Vec3::new(-12.0, 0.0, 0.0),
            output: Vec3::new(12.0, 0.0, 0.0),
            core: Vec3::ORIGIN,
        }
    }
}

/// A directed flow with an intensity in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThoughtFlow {
    /// Start.
    pub from: FlowEndpoint,
    /// End.
    pub to: FlowEndpoint,
    /// Activation strength, 1.0 for core-only flows.
    pub intensity: f32,
}

impl ThoughtFlow {
    /// Resolve both ends to coordinates. `None` if a memory end has no
    /// position.
    #[must_use]
    pub fn points(
        &self,
        positions: &BTreeMap<MemoryId, Vec3>,
        anchors: &FlowAnchors,
    ) -> Option<(Vec3, Vec3)> {
        let resolve = |end: FlowEndpoint| match end {
            FlowEndpoint::Input => Some(anchors.input),
            FlowEndpoint::Output => Some(anchors.output),
            FlowEndpoint::Core => Some(anchors.core),
            FlowEndpoint::Memory(id) => positions.get(&id).copied(),
        };
        Some((resolve(self.from)?, resolve(self.to)?))
    }
}

/// Flows drawn for `stage` given the current activation.
///
/// `Processing` links activated memories in a ring ordered by strength; a
/// single activated memory is fed from the core instead.
#[must_use]
pub fn thought_flows(stage: ProcessingStage, activation: &Activation) -> Vec<ThoughtFlow> {
    let core_only = |from, to| ThoughtFlow {
        from,
        to,
        intensity: 1.0,
    };
    match stage {
        ProcessingStage::Idle => Vec::new(),
        ProcessingStage::Receiving => vec![core_only(FlowEndpoint::Input, FlowEndpoint::Core)],
        ProcessingStage::Responding => vec![core_only(FlowEndpoint::Core, FlowEndpoint::Output)],
        ProcessingStage::Retrieving => activation
            .ranked()
            .into_iter()
            .map(|(id, strength)| ThoughtFlow {
                from: FlowEndpoint::Core,
                to: FlowEndpoint::Memory(id),
                intensity: strength,
            })
            .collect(),
        ProcessingStage::Processing => {
            let ranked = activation.ranked();
            match ranked.as_slice() {
                [] => Vec::new(),
                [(id, strength)] => vec![ThoughtFlow {
                    from: FlowEndpoint::Core,
                    to: FlowEndpoint::Memory(*id),
                    intensity: *strength,
                }],
                _ => ranked
                    .iter()
                    .zip(ranked.iter().cycle().skip(1))
                    .map(|((from, strength), (to, _))| ThoughtFlow {
                        from: FlowEndpoint::Memory(*from),
                        to: FlowEndpoint::Memory(*to),
                        intensity: *strength,
                    })
                    .collect(),
            }
        }
    }
}
