//! # Mindscape Core Library
//!
//! Builds a per-agent knowledge graph out of an agent's memories and projects
//! it into space for visualization.
//!
//! - **Concepts** — entities, topics, emotions, events, attributes and
//!   relations extracted from memory text and keywords, merged by
//!   case-insensitive name within a category
//! - **Links** — weighted edges between memories that share concepts, a
//!   conversation thread, or a moment in time
//! - **Statistics** — totals, average link strength, the most connected
//!   memory and concept clusters
//! - **Layouts** — a closed-form polar placement keyed by memory type,
//!   importance and recency, and a force-directed layout for exploration
//! - **Activation** — which memories are "lit up" by a query or an explicit
//!   selection
//!
//! All scoring functions are pure. [`GraphEngine`] owns the
//! load → apply → save cycle against the storage seams in [`store`].

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod activation;
pub mod concept;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod layout;
pub mod linking;
pub mod memory;
pub mod metrics;
pub mod persistence;
pub mod store;
pub mod types;

pub use activation::Activation;
pub use config::MindConfig;
pub use engine::{GraphEngine, ProcessOutcome};
pub use error::MindError;
pub use graph::MemoryGraph;
pub use memory::{MemoryRecord, MemoryType};
pub use types::*;
