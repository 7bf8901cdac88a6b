//! Spatial projection of memories and concepts.
//!
//! - [`polar`] — closed-form 3-D placement by type, importance and recency.
//! - [`force`] — iterative 2-D simulation over a knowledge-graph payload.

pub mod force;
pub mod polar;

pub use force::{ForceLayout, NodePosition};
pub use polar::{polar_layout, quadrant_angle, radius_for};
