//! Storage seams for memories and graphs.
//!
//! The engine talks to storage only through [`MemoryStore`] and
//! [`GraphStore`]. [`InMemoryStore`] backs tests and ephemeral sessions;
//! [`crate::persistence::SqliteStore`] backs durable deployments.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use crate::error::{MindError, Result};
use crate::graph::MemoryGraph;
use crate::memory::MemoryRecord;
use crate::types::{AgentId, MemoryId};

/// Source of memory records.
pub trait MemoryStore: Send + Sync {
    /// Every record (active or not) owned by `agent`, ordered by creation
    /// time then id. Records without a timestamp come first.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    fn all_memories(&self, agent: AgentId) -> Result<Vec<MemoryRecord>>;

    /// One record by id.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    fn memory(&self, id: MemoryId) -> Result<Option<MemoryRecord>>;

    /// Append a new record.
    ///
    /// # Errors
    /// Returns an error if the store cannot be written.
    fn append(&self, record: MemoryRecord) -> Result<()>;

    /// Replace the mutable fields of an existing record.
    ///
    /// # Errors
    /// Returns `MindError::MemoryNotFound` if the record does not exist.
    fn update(&self, record: &MemoryRecord) -> Result<()>;

    /// Mark a record inactive. Returns `false` if it did not exist.
    ///
    /// # Errors
    /// Returns an error if the store cannot be written.
    fn soft_delete(&self, id: MemoryId) -> Result<bool>;

    /// Remove a record permanently. Returns `false` if it did not exist.
    ///
    /// # Errors
    /// Returns an error if the store cannot be written.
    fn hard_delete(&self, id: MemoryId) -> Result<bool>;
}

/// Persistence for per-agent graphs. Saves are full replacements.
pub trait GraphStore: Send + Sync {
    /// Load an agent's graph, `None` if it was never saved.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read or the snapshot is corrupt.
    fn load_graph(&self, agent: AgentId) -> Result<Option<MemoryGraph>>;

    /// Replace the stored graph for `graph.agent_id`.
    ///
    /// # Errors
    /// Returns an error if the store cannot be written.
    fn save_graph(&self, graph: &MemoryGraph) -> Result<()>;
}

/// Sort records by creation time (missing first), then id.
pub(crate) fn sort_chronologically(records: &mut [MemoryRecord]) {
    records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Thread-safe in-process store for memories and graphs.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    memories: RwLock<BTreeMap<MemoryId, MemoryRecord>>,
    graphs: RwLock<HashMap<AgentId, MemoryGraph>>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records across all agents.
    #[must_use]
    pub fn memory_count(&self) -> usize {
        self.memories.read().len()
    }
}

impl MemoryStore for InMemoryStore {
    fn all_memories(&self, agent: AgentId) -> Result<Vec<MemoryRecord>> {
        let mut records: Vec<MemoryRecord> = self
            .memories
            .read()
            .values()
            .filter(|m| m.agent_id == agent)
            .cloned()
            .collect();
        sort_chronologically(&mut records);
        Ok(records)
    }

    fn memory(&self, id: MemoryId) -> Result<Option<MemoryRecord>> {
        Ok(self.memories.read().get(&id).cloned())
    }

    fn append(&self, record: MemoryRecord) -> Result<()> {
        self.memories.write().insert(record.id, record);
        Ok(())
    }

    fn update(&self, record: &MemoryRecord) -> Result<()> {
        let mut memories = self.memories.write();
        let stored = memories
            .get_mut(&record.id)
            .ok_or(MindError::MemoryNotFound(record.id))?;
        stored.set_importance(record.importance());
        stored.set_keywords(record.keywords().to_vec());
        if !record.is_active() {
            stored.deactivate();
        }
        Ok(())
    }

    fn soft_delete(&self, id: MemoryId) -> Result<bool> {
        Ok(self
            .memories
            .write()
            .get_mut(&id)
            .map(MemoryRecord::deactivate)
            .is_some())
    }

    fn hard_delete(&self, id: MemoryId) -> Result<bool> {
        Ok(self.memories.write().remove(&id).is_some())
    }
}

impl GraphStore for InMemoryStore {
    fn load_graph(&self, agent: AgentId) -> Result<Option<MemoryGraph>> {
        Ok(self.graphs.read().get(&agent).cloned())
    }

    fn save_graph(&self, graph: &MemoryGraph) -> Result<()> {
        self.graphs.write().insert(graph.agent_id, graph.clone());
        Ok(())
    }
}
