//! # Mindscape Visualization Sessions
//!
//! Live, per-agent visualization on top of `mindscape-core`:
//!
//! - [`stage`] — the externally driven processing-stage machine with its
//!   two timed transitions
//! - [`flow`] — thought flows drawn for each stage
//! - [`frame`] — pure frame generation (positions, activation,
//!   connections, flows)
//! - [`session`] — the `initialize → update* → dispose` session object
//! - [`registry`] — one session per agent, safe to share across threads

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod flow;
pub mod frame;
pub mod registry;
pub mod session;
pub mod stage;

pub use error::SessionError;
pub use frame::{VisualizationFrame, generate_frame};
pub use registry::SessionRegistry;
pub use session::VisualizationSession;
pub use stage::{ProcessingStage, StageMachine};
