//! The graph engine — the public entry points for building and querying
//! memory graphs.
//!
//! Every update is a read-modify-write of one agent's graph: load, apply,
//! recompute statistics, save. The graph is saved only after every step
//! succeeds, so a failed update never persists a partial graph. Callers
//! serialize writers per agent; the engine itself does not lock.
//!
//! Each operation comes in two flavours: `try_*` returns a [`Result`], the
//! plain variant logs the failure and returns an empty/default value.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::concept::{
    Concept, ConceptCategory, RelatedConcept, discover_relationships, extract_concepts,
    merge_candidates,
};
use crate::config::MindConfig;
use crate::error::Result;
use crate::graph::{
    GraphFilter, GraphStats, KnowledgeGraphData, KnowledgeGraphOptions, MemoryGraph, MemoryLink,
    build_knowledge_graph,
};
use crate::layout::{ForceLayout, NodePosition};
use crate::linking::link_new_memory;
use crate::memory::MemoryRecord;
use crate::metrics::{GraphCounters, spans};
use crate::store::{GraphStore, MemoryStore};
use crate::types::{AgentId, ConceptId, LinkId, MemoryId};

/// What processing one memory added to the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutcome {
    /// Concepts created by this memory.
    pub new_concepts: Vec<ConceptId>,
    /// Links created by this memory.
    pub new_links: Vec<LinkId>,
}

/// Builds, persists and queries per-agent memory graphs.
pub struct GraphEngine {
    memories: Arc<dyn MemoryStore>,
    graphs: Arc<dyn GraphStore>,
    config: MindConfig,
    counters: Arc<GraphCounters>,
}

impl std::fmt::Debug for GraphEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphEngine")
            .field("counters", &self.counters.snapshot())
            .finish_non_exhaustive()
    }
}

impl GraphEngine {
    /// Create an engine over separate memory and graph stores.
    #[must_use]
    pub fn new(
        memories: Arc<dyn MemoryStore>,
        graphs: Arc<dyn GraphStore>,
        config: MindConfig,
    ) -> Self {
        Self {
            memories,
            graphs,
            config,
            counters: Arc::new(GraphCounters::new()),
        }
    }

    /// Create an engine over one store that holds both memories and graphs.
    #[must_use]
    pub fn with_store<S>(store: Arc<S>, config: MindConfig) -> Self
    where
        S: MemoryStore + GraphStore + 'static,
    {
        Self::new(store.clone(), store, config)
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &MindConfig {
        &self.config
    }

    /// Shared counters.
    #[must_use]
    pub fn counters(&self) -> Arc<GraphCounters> {
        Arc::clone(&self.counters)
    }

    /// The memory store the engine reads from.
    #[must_use]
    pub fn memory_store(&self) -> Arc<dyn MemoryStore> {
        Arc::clone(&self.memories)
    }

    // ------------------------------------------------------------------
    // Updates
    // ------------------------------------------------------------------

    /// Fold one new memory into its agent's graph.
    ///
    /// # Errors
    /// Returns the store error if the graph or memories cannot be loaded or
    /// the graph cannot be saved. Nothing is saved on failure.
    pub fn try_process_new_memory(&self, memory: &MemoryRecord) -> Result<ProcessOutcome> {
        let _span = tracing::debug_span!(spans::PROCESS_MEMORY, memory_id = %memory.id).entered();
        if !self.config.general.enabled {
            return Ok(ProcessOutcome::default());
        }
        let agent = memory.agent_id;
        let now = Utc::now();

        let mut graph = self.load_or_new(agent, now)?;
        let others = self.load_memories(agent)?;
        let outcome = self.apply_memory(&mut graph, memory, &others, now)?;
        graph.refresh_stats(&self.config.stats, now);
        self.save(&graph)?;

        self.record(&outcome);
        debug!(
            memory_id = %memory.id,
            agent = %agent,
            new_concepts = outcome.new_concepts.len(),
            new_links = outcome.new_links.len(),
            "memory processed"
        );
        Ok(outcome)
    }

    /// Degrading variant of [`Self::try_process_new_memory`].
    pub fn process_new_memory(&self, memory: &MemoryRecord) -> ProcessOutcome {
        self.try_process_new_memory(memory).unwrap_or_else(|e| {
            warn!(memory_id = %memory.id, error = %e, "memory processing failed, graph unchanged");
            ProcessOutcome::default()
        })
    }

    /// Rebuild an agent's graph from scratch out of its active memories.
    ///
    /// Memories are replayed oldest first and each is linked only against
    /// the ones before it, so rebuilding an unchanged memory set always
    /// yields the same concepts and links.
    ///
    /// # Errors
    /// Returns the store error if memories cannot be loaded or the graph
    /// cannot be saved.
    pub fn try_rebuild_graph(&self, agent: AgentId) -> Result<GraphStats> {
        let _span = tracing::info_span!(spans::REBUILD, agent = %agent).entered();
        let now = Utc::now();
        let records: Vec<MemoryRecord> = self
            .load_memories(agent)?
            .into_iter()
            .filter(MemoryRecord::is_active)
            .collect();

        let mut graph = MemoryGraph::new(agent, now);
        for (i, memory) in records.iter().enumerate() {
            let outcome = self.apply_memory(&mut graph, memory, &records[..i], now)?;
            self.record(&outcome);
        }
        graph.refresh_stats(&self.config.stats, now);
        self.save(&graph)?;

        GraphCounters::add(&self.counters.rebuilds, 1);
        info!(
            agent = %agent,
            memories = records.len(),
            concepts = graph.stats.total_concepts,
            links = graph.stats.total_links,
            "graph rebuilt"
        );
        Ok(graph.stats)
    }

    /// Degrading variant of [`Self::try_rebuild_graph`].
    pub fn rebuild_graph(&self, agent: AgentId) -> GraphStats {
        self.try_rebuild_graph(agent).unwrap_or_else(|e| {
            warn!(agent = %agent, error = %e, "graph rebuild failed");
            GraphStats::default()
        })
    }

    fn apply_memory(
        &self,
        graph: &mut MemoryGraph,
        memory: &MemoryRecord,
        others: &[MemoryRecord],
        now: DateTime<Utc>,
    ) -> Result<ProcessOutcome> {
        let candidates = extract_concepts(memory, &self.config.extraction);
        let merged = merge_candidates(graph, candidates, memory, &self.config.merge);
        discover_relationships(graph, &merged.touched(), &self.config.merge)?;
        let new_links = link_new_memory(graph, memory, others, &self.config.linking, now)?;
        Ok(ProcessOutcome {
            new_concepts: merged.created,
            new_links,
        })
    }

    fn record(&self, outcome: &ProcessOutcome) {
        GraphCounters::add(&self.counters.memories_processed, 1);
        GraphCounters::add(&self.counters.concepts_created, outcome.new_concepts.len());
        GraphCounters::add(&self.counters.links_created, outcome.new_links.len());
    }

    // ------------------------------------------------------------------
    // Store access
    // ------------------------------------------------------------------

    fn load_or_new(&self, agent: AgentId, now: DateTime<Utc>) -> Result<MemoryGraph> {
        let _span = tracing::trace_span!(spans::PERSIST_LOAD, agent = %agent).entered();
        match self.graphs.load_graph(agent) {
            Ok(graph) => Ok(graph.unwrap_or_else(|| MemoryGraph::new(agent, now))),
            Err(e) => {
                GraphCounters::add(&self.counters.store_failures, 1);
                Err(e)
            }
        }
    }

    fn load_memories(&self, agent: AgentId) -> Result<Vec<MemoryRecord>> {
        self.memories.all_memories(agent).inspect_err(|_| {
            GraphCounters::add(&self.counters.store_failures, 1);
        })
    }

    fn save(&self, graph: &MemoryGraph) -> Result<()> {
        let _span = tracing::trace_span!(spans::PERSIST_SAVE, agent = %graph.agent_id).entered();
        self.graphs.save_graph(graph).inspect_err(|_| {
            GraphCounters::add(&self.counters.store_failures, 1);
        })
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// An agent's graph, empty if it was never built.
    ///
    /// # Errors
    /// Returns the store error if the graph cannot be loaded.
    pub fn try_graph(&self, agent: AgentId) -> Result<MemoryGraph> {
        self.load_or_new(agent, Utc::now())
    }

    /// Degrading variant of [`Self::try_graph`].
    pub fn graph(&self, agent: AgentId) -> MemoryGraph {
        self.try_graph(agent).unwrap_or_else(|e| {
            warn!(agent = %agent, error = %e, "graph unavailable, returning empty graph");
            MemoryGraph::new(agent, Utc::now())
        })
    }

    /// Bounded node/edge payload for an exploration view.
    ///
    /// # Errors
    /// Returns the store error if the graph or memories cannot be loaded.
    pub fn try_knowledge_graph_data(
        &self,
        agent: AgentId,
        opts: &KnowledgeGraphOptions,
    ) -> Result<KnowledgeGraphData> {
        let _span = tracing::debug_span!(spans::KNOWLEDGE_GRAPH, agent = %agent).entered();
        let graph = self.try_graph(agent)?;
        let memories = if opts.include_memories {
            self.load_memories(agent)?
        } else {
            Vec::new()
        };
        Ok(build_knowledge_graph(&graph, &memories, opts))
    }

    /// Degrading variant of [`Self::try_knowledge_graph_data`].
    pub fn knowledge_graph_data(
        &self,
        agent: AgentId,
        opts: &KnowledgeGraphOptions,
    ) -> KnowledgeGraphData {
        self.try_knowledge_graph_data(agent, opts)
            .unwrap_or_else(|e| {
                warn!(agent = %agent, error = %e, "knowledge graph unavailable");
                KnowledgeGraphData::default()
            })
    }

    /// Build the knowledge-graph payload, filter it and run the
    /// force-directed layout over what remains.
    ///
    /// # Errors
    /// Returns the store error if the graph or memories cannot be loaded.
    pub fn try_layout_knowledge_graph(
        &self,
        agent: AgentId,
        opts: &KnowledgeGraphOptions,
        filter: &GraphFilter,
    ) -> Result<Vec<NodePosition>> {
        let data = self.try_knowledge_graph_data(agent, opts)?;
        let _span = tracing::debug_span!(spans::FORCE_LAYOUT, agent = %agent).entered();
        let positions = ForceLayout::new(self.config.force.clone()).run_filtered(&data, filter);
        GraphCounters::add(&self.counters.layouts_run, 1);
        Ok(positions)
    }

    /// Case-insensitive concept lookup.
    ///
    /// # Errors
    /// Returns the store error if the graph cannot be loaded.
    pub fn concept_by_name(
        &self,
        agent: AgentId,
        name: &str,
        category: Option<ConceptCategory>,
    ) -> Result<Option<Concept>> {
        Ok(self.try_graph(agent)?.concept_by_name(name, category).cloned())
    }

    /// Concepts related to `concept`, strongest first.
    ///
    /// # Errors
    /// Returns `MindError::ConceptNotFound` if the concept does not exist,
    /// or the store error if the graph cannot be loaded.
    pub fn related_concepts(
        &self,
        agent: AgentId,
        concept: ConceptId,
    ) -> Result<Vec<(Concept, RelatedConcept)>> {
        let graph = self.try_graph(agent)?;
        Ok(graph
            .related_concepts(concept)?
            .into_iter()
            .map(|(c, r)| (c.clone(), r.clone()))
            .collect())
    }

    /// Links touching `memory`, strongest first.
    ///
    /// # Errors
    /// Returns the store error if the graph cannot be loaded.
    pub fn links_for_memory(&self, agent: AgentId, memory: MemoryId) -> Result<Vec<MemoryLink>> {
        let graph = self.try_graph(agent)?;
        Ok(graph.links_for_memory(memory).into_iter().cloned().collect())
    }

    /// Memory records a concept was extracted from. Records that have since
    /// been hard-deleted are skipped.
    ///
    /// # Errors
    /// Returns `MindError::ConceptNotFound` if the concept does not exist,
    /// or the store error if a read fails.
    pub fn memories_for_concept(
        &self,
        agent: AgentId,
        concept: ConceptId,
    ) -> Result<Vec<MemoryRecord>> {
        let ids = self.try_graph(agent)?.memories_for_concept(concept)?;
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.memories.memory(id)? {
                records.push(record);
            }
        }
        Ok(records)
    }
}
