//! Concurrent registry of visualization sessions, one per agent.

use std::sync::Arc;

use dashmap::DashMap;
use mindscape_core::{AgentId, MemoryRecord, MindConfig};
use tracing::debug;

use crate::session::VisualizationSession;

/// Sessions keyed by agent. Sessions of different agents never share state.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: DashMap<AgentId, Arc<VisualizationSession>>,
    config: MindConfig,
}

impl SessionRegistry {
    /// Create an empty registry whose sessions use `config`.
    #[must_use]
    pub fn new(config: MindConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
        }
    }

    /// Open a session for `agent`, disposing any session it replaces.
    pub fn open(&self, agent: AgentId, memories: Vec<MemoryRecord>) -> Arc<VisualizationSession> {
        let session = Arc::new(VisualizationSession::initialize(
            agent,
            memories,
            self.config.clone(),
        ));
        if let Some(previous) = self.sessions.insert(agent, Arc::clone(&session)) {
            debug!(agent = %agent, "replacing visualization session");
            previous.dispose();
        }
        session
    }

    /// Register an already-built session, disposing any it replaces.
    pub fn insert(&self, session: VisualizationSession) -> Arc<VisualizationSession> {
        let session = Arc::new(session);
        if let Some(previous) = self.sessions.insert(session.agent(), Arc::clone(&session)) {
            previous.dispose();
        }
        session
    }

    /// The live session for `agent`.
    #[must_use]
    pub fn get(&self, agent: AgentId) -> Option<Arc<VisualizationSession>> {
        self.sessions.get(&agent).map(|entry| Arc::clone(entry.value()))
    }

    /// Dispose and remove the session for `agent`. Returns `false` if none
    /// was open.
    pub fn close(&self, agent: AgentId) -> bool {
        match self.sessions.remove(&agent) {
            Some((_, session)) => {
                session.dispose();
                true
            }
            None => false,
        }
    }

    /// Agents with an open session.
    #[must_use]
    pub fn agents(&self) -> Vec<AgentId> {
        let mut agents: Vec<AgentId> = self.sessions.iter().map(|e| *e.key()).collect();
        agents.sort();
        agents
    }

    /// Number of open sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_replace_close() {
        let registry = SessionRegistry::new(MindConfig::default());
        let agent = AgentId::new();
        let first = registry.open(agent, Vec::new());
        let second = registry.open(agent, Vec::new());
        assert!(first.is_disposed());
        assert!(!second.is_disposed());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.agents(), vec![agent]);

        assert!(registry.close(agent));
        assert!(second.is_disposed());
        assert!(registry.get(agent).is_none());
        assert!(!registry.close(agent));
        assert!(registry.is_empty());
    }

    #[test]
    fn agents_are_independent() {
        let registry = SessionRegistry::new(MindConfig::default());
        let (a, b) = (AgentId::new(), AgentId::new());
        registry.open(a, Vec::new());
        registry.open(b, Vec::new());
        registry.close(a);
        assert!(registry.get(b).is_some_and(|s| !s.is_disposed()));
    }
}
