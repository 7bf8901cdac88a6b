//! Core type definitions for the mindscape graph engine.
//!
//! Identifiers are UUID newtypes. Memory and agent ids are random (v4);
//! concept and link ids are derived (v5) from their natural keys so that
//! rebuilding a graph from the same memories reproduces the same ids.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Namespace for concept id derivation.
const CONCEPT_NAMESPACE: Uuid = Uuid::from_u128(0x6d69_6e64_7363_6170_655f_636f_6e63_6570);

/// Namespace for link id derivation.
const LINK_NAMESPACE: Uuid = Uuid::from_u128(0x6d69_6e64_7363_6170_655f_6c69_6e6b_0001);

/// Unique identifier for an agent (the owner of a memory graph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    /// Create a new random agent ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a memory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    /// Create a new random memory ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifier of a concept, derived from its category and normalized name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConceptId(pub Uuid);

impl ConceptId {
    /// Derive the id for a `(category, name)` key.
    ///
    /// The name is lowercased and trimmed first, so lookups are
    /// case-insensitive.
    #[must_use]
    pub fn derive(category: &str, name: &str) -> Self {
        let key = format!("{category}:{}", name.trim().to_lowercase());
        Self(Uuid::new_v5(&CONCEPT_NAMESPACE, key.as_bytes()))
    }
}

/// Identifier of a memory link, derived from the unordered memory pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkId(pub Uuid);

impl LinkId {
    /// Derive the id for the unordered pair `{a, b}`.
    ///
    /// `for_pair(a, b) == for_pair(b, a)`.
    #[must_use]
    pub fn for_pair(a: MemoryId, b: MemoryId) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let mut key = [0_u8; 32];
        key[..16].copy_from_slice(lo.0.as_bytes());
        key[16..].copy_from_slice(hi.0.as_bytes());
        Self(Uuid::new_v5(&LINK_NAMESPACE, &key))
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ConceptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Spatial
// ---------------------------------------------------------------------------

/// A point in 3-D layout space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    /// X coordinate.
    pub x: f32,
    /// Y coordinate (vertical axis in the polar layout).
    pub y: f32,
    /// Z coordinate.
    pub z: f32,
}

impl Vec3 {
    /// The origin, where the synthetic core node sits.
    pub const ORIGIN: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// Create a new point.
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to `other`.
    #[must_use]
    pub fn distance(&self, other: &Self) -> f32 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1})", self.x, self.y, self.z)
    }
}

/// A point on the 2-D force-layout canvas.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    /// X coordinate.
    pub x: f32,
    /// Y coordinate.
    pub y: f32,
}

impl Point2 {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

// ---------------------------------------------------------------------------
// Scores
// ---------------------------------------------------------------------------

/// A totally ordered strength in `[0, 1]`, used to rank nodes and edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Strength(pub OrderedFloat<f32>);

impl Strength {
    /// Create a strength, clamping into `[0, 1]`. NaN becomes 0.
    #[must_use]
    pub fn new(value: f32) -> Self {
        Self(OrderedFloat(clamp_unit(value)))
    }

    /// Get the raw value.
    #[must_use]
    pub fn value(self) -> f32 {
        self.0.into_inner()
    }
}

/// Clamp a value into `[0, 1]`, mapping NaN to 0.
#[must_use]
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// Clamp a value into `[-1, 1]`, mapping NaN to 0.
#[must_use]
pub fn clamp_signed(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(-1.0, 1.0) }
}
