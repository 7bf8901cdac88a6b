//! Visualization session error types.

use mindscape_core::MindError;
use thiserror::Error;

/// Errors that can occur while driving a visualization session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session was disposed and no longer accepts calls.
    #[error("Visualization session has been disposed")]
    Disposed,

    /// A core graph operation failed.
    #[error(transparent)]
    Core(#[from] MindError),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, SessionError>;
