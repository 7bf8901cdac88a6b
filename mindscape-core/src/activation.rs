//! Activation scoring — transient per-query relevance of memories.
//!
//! Three additive stages over active memories:
//!
//! 1. **Forced** ids (e.g. retrieval results) get `base × (1 − decay)^rank`.
//! 2. **Query** keyword and content matches, kept only above the threshold.
//! 3. **Recency** bonus for those of the newest memories not yet activated.
//!
//! Stateless; callers recompute per frame.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::ActivationConfig;
use crate::memory::MemoryRecord;
use crate::types::{MemoryId, clamp_unit};

/// Activation strengths keyed by memory id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Activation(BTreeMap<MemoryId, f32>);

impl Activation {
    /// Empty activation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a memory's strength (clamped to `[0, 1]`).
    pub fn insert(&mut self, id: MemoryId, strength: f32) {
        self.0.insert(id, clamp_unit(strength));
    }

    /// Strength of `id`, if activated.
    #[must_use]
    pub fn get(&self, id: MemoryId) -> Option<f32> {
        self.0.get(&id).copied()
    }

    /// Whether `id` is activated.
    #[must_use]
    pub fn contains(&self, id: MemoryId) -> bool {
        self.0.contains_key(&id)
    }

    /// Number of activated memories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing is activated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in id order.
    pub fn iter(&self) -> impl Iterator<Item = (MemoryId, f32)> + '_ {
        self.0.iter().map(|(id, s)| (*id, *s))
    }

    /// Activated ids, strongest first (ties by id).
    #[must_use]
    pub fn ranked(&self) -> Vec<(MemoryId, f32)> {
        let mut ranked: Vec<_> = self.iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked
    }
}

/// Score memories against an optional query and a forced-id list.
///
/// Forced ids keep their rank-decayed strength and are not rescored by
/// the query stage. A query with no usable tokens skips the keyword stage.
#[must_use]
pub fn score_activation(
    memories: &[MemoryRecord],
    query: Option<&str>,
    forced: &[MemoryId],
    cfg: &ActivationConfig,
) -> Activation {
    let active: BTreeMap<MemoryId, &MemoryRecord> = memories
        .iter()
        .filter(|m| m.is_active())
        .map(|m| (m.id, m))
        .collect();
    let mut activation = Activation::new();

    let mut strength = cfg.forced_base;
    let mut seen = BTreeSet::new();
    for id in forced {
        if seen.insert(*id) && active.contains_key(id) {
            activation.insert(*id, strength);
        }
        strength *= 1.0 - cfg.forced_decay_rate;
    }

    let tokens = query.map(|q| query_tokens(q, cfg)).unwrap_or_default();
    if !tokens.is_empty() {
        let token_set: BTreeSet<&str> = tokens.iter().map(String::as_str).collect();
        for memory in active.values() {
            if activation.contains(memory.id) {
                continue;
            }
            let score = query_score(memory, &tokens, &token_set, cfg);
            if score > cfg.activation_threshold {
                activation.insert(memory.id, score);
            }
        }
    }

    // Rank is the true recency rank; activated memories keep their slot.
    let mut recent: Vec<&MemoryRecord> = active.values().copied().collect();
    recent.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
    for (rank, memory) in recent.into_iter().take(cfg.recency_count).enumerate() {
        if activation.contains(memory.id) {
            continue;
        }
        #[allow(clippy::cast_precision_loss)]
        let bonus = cfg.recency_base - rank as f32 * cfg.recency_step;
        if bonus > cfg.recency_floor {
            activation.insert(memory.id, bonus);
        }
    }

    trace!(activated = activation.len(), tokens = tokens.len(), "activation scored");
    activation
}

fn query_score(
    memory: &MemoryRecord,
    tokens: &[String],
    token_set: &BTreeSet<&str>,
    cfg: &ActivationConfig,
) -> f32 {
    let keyword_hits = memory
        .normalized_keywords()
        .iter()
        .filter(|kw| token_set.contains(kw.as_str()))
        .count();
    let content = memory.content.to_lowercase();
    let content_hits = tokens.iter().filter(|t| content.contains(t.as_str())).count();
    #[allow(clippy::cast_precision_loss)]
    let score =
        keyword_hits as f32 * cfg.keyword_weight + content_hits as f32 * cfg.content_weight;
    clamp_unit(score)
}

/// Lowercased, de-duplicated query tokens that survive the length and
/// stopword filters.
fn query_tokens(query: &str, cfg: &ActivationConfig) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for raw in query.split(|c: char| !c.is_alphanumeric()) {
        let token = raw.to_lowercase();
        if token.chars().count() >= cfg.min_token_len
            && !cfg.stopwords.iter().any(|s| *s == token)
            && !tokens.contains(&token)
        {
            tokens.push(token);
        }
    }
    tokens
}
