//! Per-agent visualization session.
//!
//! A session owns a snapshot of one agent's memories and graph plus its
//! stage machine. Lifecycle: `initialize → update* → dispose`. After
//! `dispose` every call fails with [`SessionError::Disposed`] and pending
//! stage timers go stale.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mindscape_core::graph::{
    GraphFilter, KnowledgeGraphData, KnowledgeGraphOptions, MemoryGraph, build_knowledge_graph,
};
use mindscape_core::layout::{ForceLayout, NodePosition};
use mindscape_core::metrics::{FrameTimer, GraphCounters, spans};
use mindscape_core::store::MemoryStore;
use mindscape_core::{AgentId, GraphEngine, MemoryRecord, MindConfig, MindError};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};
use crate::frame::{VisualizationFrame, generate_frame};
use crate::stage::{ProcessingStage, StageMachine};

/// Frame budget for a 60 Hz renderer.
const FRAME_BUDGET_MS: f64 = 16.0;
/// Frames kept in the timing ring buffer.
const FRAME_HISTORY: usize = 120;

#[derive(Debug)]
struct SessionState {
    memories: Vec<MemoryRecord>,
    graph: MemoryGraph,
    disposed: bool,
}

/// One agent's live visualization context.
#[derive(Debug)]
pub struct VisualizationSession {
    agent: AgentId,
    config: MindConfig,
    state: Mutex<SessionState>,
    stages: StageMachine,
    frame_timer: FrameTimer,
    counters: Arc<GraphCounters>,
}

impl VisualizationSession {
    /// Start a session over a memory snapshot. Records owned by other
    /// agents are dropped.
    #[must_use]
    pub fn initialize(agent: AgentId, memories: Vec<MemoryRecord>, config: MindConfig) -> Self {
        let memories = own_memories(agent, memories);
        info!(agent = %agent, memories = memories.len(), "visualization session started");
        Self {
            agent,
            stages: StageMachine::new(config.stages.clone()),
            config,
            state: Mutex::new(SessionState {
                memories,
                graph: MemoryGraph::new(agent, Utc::now()),
                disposed: false,
            }),
            frame_timer: FrameTimer::new(FRAME_BUDGET_MS, FRAME_HISTORY),
            counters: Arc::new(GraphCounters::new()),
        }
    }

    /// Start a session from an engine's stores, sharing its counters.
    ///
    /// # Errors
    /// Returns `SessionError::Core` if the memories or graph cannot be
    /// loaded.
    pub fn from_engine(engine: &GraphEngine, agent: AgentId) -> Result<Self> {
        let memories = engine.memory_store().all_memories(agent)?;
        let graph = engine.try_graph(agent)?;
        let mut session = Self::initialize(agent, memories, engine.config().clone());
        session.state.get_mut().graph = graph;
        session.counters = engine.counters();
        Ok(session)
    }

    /// Agent this session visualizes.
    #[must_use]
    pub fn agent(&self) -> AgentId {
        self.agent
    }

    /// Stage machine driving thought flows.
    #[must_use]
    pub fn stages(&self) -> &StageMachine {
        &self.stages
    }

    /// Frame-generation timings.
    #[must_use]
    pub fn frame_timer(&self) -> &FrameTimer {
        &self.frame_timer
    }

    /// Counters this session reports into.
    #[must_use]
    pub fn counters(&self) -> Arc<GraphCounters> {
        Arc::clone(&self.counters)
    }

    /// Whether [`Self::dispose`] has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    /// Number of memories in the snapshot.
    #[must_use]
    pub fn memory_count(&self) -> usize {
        self.state.lock().memories.len()
    }

    /// Replace the memory snapshot.
    ///
    /// # Errors
    /// Returns `SessionError::Disposed` after disposal.
    pub fn update_memories(&self, memories: Vec<MemoryRecord>) -> Result<()> {
        let memories = own_memories(self.agent, memories);
        let mut state = self.live_state()?;
        debug!(agent = %self.agent, memories = memories.len(), "session memories updated");
        state.memories = memories;
        Ok(())
    }

    /// Replace the graph snapshot.
    ///
    /// # Errors
    /// Returns `SessionError::Disposed` after disposal, or
    /// `MindError::AgentMismatch` if the graph belongs to another agent.
    pub fn update_graph(&self, graph: MemoryGraph) -> Result<()> {
        if graph.agent_id != self.agent {
            return Err(MindError::AgentMismatch {
                expected: self.agent,
                actual: graph.agent_id,
            }
            .into());
        }
        let mut state = self.live_state()?;
        state.graph = graph;
        Ok(())
    }

    /// Generate a frame. `stage` overrides the machine's current stage;
    /// forced activation comes from the last completed retrieval.
    ///
    /// # Errors
    /// Returns `SessionError::Disposed` after disposal.
    pub fn generate_frame(
        &self,
        stage: Option<ProcessingStage>,
        query: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<VisualizationFrame> {
        let _span = tracing::trace_span!(spans::FRAME, agent = %self.agent).entered();
        let _timing = self.frame_timer.begin();
        let stage = stage.unwrap_or_else(|| self.stages.stage());
        let forced = self.stages.forced();
        let state = self.live_state()?;
        let frame = generate_frame(&state.memories, stage, query, &forced, now, &self.config);
        GraphCounters::add(&self.counters.frames_generated, 1);
        Ok(frame)
    }

    /// Knowledge-graph payload over the session's snapshots.
    ///
    /// # Errors
    /// Returns `SessionError::Disposed` after disposal.
    pub fn knowledge_graph(&self, opts: &KnowledgeGraphOptions) -> Result<KnowledgeGraphData> {
        let state = self.live_state()?;
        Ok(build_knowledge_graph(&state.graph, &state.memories, opts))
    }

    /// Force-directed layout of the filtered knowledge graph.
    ///
    /// # Errors
    /// Returns `SessionError::Disposed` after disposal.
    pub fn layout_knowledge_graph(
        &self,
        opts: &KnowledgeGraphOptions,
        filter: &GraphFilter,
    ) -> Result<Vec<NodePosition>> {
        let data = self.knowledge_graph(opts)?;
        let _span = tracing::debug_span!(spans::FORCE_LAYOUT, agent = %self.agent).entered();
        let positions = ForceLayout::new(self.config.force.clone()).run_filtered(&data, filter);
        GraphCounters::add(&self.counters.layouts_run, 1);
        Ok(positions)
    }

    /// End the session. Idempotent.
    pub fn dispose(&self) {
        let mut state = self.state.lock();
        if state.disposed {
            return;
        }
        state.disposed = true;
        state.memories.clear();
        state.graph = MemoryGraph::new(self.agent, Utc::now());
        drop(state);
        self.stages.reset();
        info!(agent = %self.agent, "visualization session disposed");
    }

    fn live_state(&self) -> Result<parking_lot::MutexGuard<'_, SessionState>> {
        let state = self.state.lock();
        if state.disposed {
            return Err(SessionError::Disposed);
        }
        Ok(state)
    }
}

impl Drop for VisualizationSession {
    fn drop(&mut self) {
        if !self.state.get_mut().disposed {
            self.stages.reset();
        }
    }
}

fn own_memories(agent: AgentId, memories: Vec<MemoryRecord>) -> Vec<MemoryRecord> {
    let total = memories.len();
    let owned: Vec<MemoryRecord> = memories.into_iter().filter(|m| m.agent_id == agent).collect();
    if owned.len() < total {
        warn!(agent = %agent, dropped = total - owned.len(), "ignoring memories of other agents");
    }
    owned
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindscape_core::MemoryType;

    fn session() -> VisualizationSession {
        let agent = AgentId::new();
        let memories = vec![
            MemoryRecord::new(agent, MemoryType::Fact, "The sky is blue", 5, Utc::now()),
            MemoryRecord::new(AgentId::new(), MemoryType::Fact, "stranger", 5, Utc::now()),
        ];
        VisualizationSession::initialize(agent, memories, MindConfig::default())
    }

    #[test]
    fn foreign_memories_are_dropped() {
        assert_eq!(session().memory_count(), 1);
    }

    #[test]
    fn frames_are_counted_and_timed() {
        let s = session();
        let frame = s.generate_frame(None, None, Utc::now()).expect("frame");
        assert_eq!(frame.stage, ProcessingStage::Idle);
        assert_eq!(frame.positions.len(), 1);
        assert_eq!(s.frame_timer().frame_count(), 1);
        assert_eq!(s.counters().snapshot().frames_generated, 1);
    }

    #[test]
    fn graph_of_other_agent_is_rejected() {
        let s = session();
        let err = s
            .update_graph(MemoryGraph::new(AgentId::new(), Utc::now()))
            .expect_err("mismatch");
        assert!(matches!(err, SessionError::Core(MindError::AgentMismatch { .. })));
    }

    #[test]
    fn disposed_session_refuses_calls() {
        let s = session();
        s.dispose();
        s.dispose();
        assert!(s.is_disposed());
        assert!(matches!(s.generate_frame(None, None, Utc::now()), Err(SessionError::Disposed)));
        assert!(matches!(s.update_memories(Vec::new()), Err(SessionError::Disposed)));
        assert!(matches!(
            s.knowledge_graph(&KnowledgeGraphOptions::default()),
            Err(SessionError::Disposed)
        ));
    }
}
