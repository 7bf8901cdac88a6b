//! Deterministic polar layout.
//!
//! Each memory type owns a 90° quadrant. Within a quadrant memories are
//! spread by recency rank, importance pulls them toward the center, and age
//! sinks them along the vertical axis. The caller supplies `now`, so the
//! same inputs always produce the same positions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::activation::Activation;
use crate::config::PolarConfig;
use crate::memory::{MemoryRecord, MemoryType};
use crate::types::{MemoryId, Vec3};

const SECONDS_PER_DAY: f32 = 86_400.0;

/// Place every active memory in 3-D space.
#[must_use]
pub fn polar_layout(
    memories: &[MemoryRecord],
    activation: &Activation,
    now: DateTime<Utc>,
    cfg: &PolarConfig,
) -> BTreeMap<MemoryId, Vec3> {
    let mut quadrants: BTreeMap<MemoryType, Vec<&MemoryRecord>> = BTreeMap::new();
    for memory in memories.iter().filter(|m| m.is_active()) {
        quadrants.entry(memory.memory_type).or_default().push(memory);
    }

    let mut positions = BTreeMap::new();
    for (memory_type, mut group) in quadrants {
        // Newest first; missing timestamps sort last.
        group.sort_by(|a, b| match (a.created_at, b.created_at) {
            (Some(x), Some(y)) => y.cmp(&x).then(a.id.cmp(&b.id)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.id.cmp(&b.id),
        });
        let count = group.len();
        for (rank, memory) in group.into_iter().enumerate() {
            let theta = quadrant_angle(memory_type, rank, count, cfg).to_radians();
            let radius = radius_for(memory.importance(), cfg);
            let y = height_for(memory.created_at, now, cfg);

            let mut position = Vec3::new(radius * theta.cos(), y, radius * theta.sin());
            if activation.contains(memory.id) {
                #[allow(clippy::cast_precision_loss)]
                let phase = (rank + 1) as f32 * cfg.jitter_frequency;
                position.z += cfg.jitter_amplitude * phase.sin();
            }
            positions.insert(memory.id, position);
        }
    }
    positions
}

/// Angle in degrees of the `rank`-th of `count` memories in a quadrant.
#[must_use]
pub fn quadrant_angle(memory_type: MemoryType, rank: usize, count: usize, cfg: &PolarConfig) -> f32 {
    let start = memory_type.quadrant_start_degrees();
    let padding = 90.0 * cfg.padding_fraction.clamp(0.0, 0.5);
    let usable = 90.0 - 2.0 * padding;
    if count <= 1 {
        return start + 45.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let fraction = rank as f32 / (count - 1) as f32;
    start + padding + usable * fraction
}

/// Radius for an importance on the 1–10 scale; more important is closer in.
#[must_use]
pub fn radius_for(importance: u8, cfg: &PolarConfig) -> f32 {
    let t = f32::from(importance.clamp(1, 10) - 1) / 9.0;
    cfg.max_radius - t * (cfg.max_radius - cfg.min_radius)
}

fn height_for(created_at: Option<DateTime<Utc>>, now: DateTime<Utc>, cfg: &PolarConfig) -> f32 {
    let horizon = cfg.horizon_days.max(f32::EPSILON);
    #[allow(clippy::cast_precision_loss)]
    let age_days = created_at.map_or(horizon, |t| {
        ((now - t).num_seconds() as f32 / SECONDS_PER_DAY).clamp(0.0, horizon)
    });
    cfg.y_max - (age_days / horizon) * (cfg.y_max - cfg.y_min)
}
