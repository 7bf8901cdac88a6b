//! Error types for the mindscape core library.

use thiserror::Error;

use crate::types::{AgentId, ConceptId, MemoryId};

/// Top-level error type for all mindscape graph operations.
#[derive(Error, Debug)]
pub enum MindError {
    /// A memory with the given ID was not found.
    #[error("Memory not found: {0}")]
    MemoryNotFound(MemoryId),

    /// A concept referenced by a graph mutation does not exist.
    #[error("Concept not found: {0}")]
    ConceptNotFound(ConceptId),

    /// A link or relationship would connect a node to itself.
    #[error("Self-link rejected for node {0}")]
    SelfLink(String),

    /// A memory was handed to the graph of a different agent.
    #[error("Agent mismatch: graph belongs to {expected}, memory belongs to {actual}")]
    AgentMismatch {
        /// Agent that owns the graph.
        expected: AgentId,
        /// Agent recorded on the memory.
        actual: AgentId,
    },

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The backing store could not be reached or refused the operation.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, MindError>;
