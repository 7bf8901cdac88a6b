//! Memory records — the raw input the graph is distilled from.
//!
//! A record is owned by the memory store; the graph only references it by
//! [`MemoryId`]. Apart from `importance`, `keywords` and the `active` flag,
//! records are immutable once written.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AgentId, MemoryId};

/// Default metadata key carrying the conversation-thread id.
pub const THREAD_KEY: &str = "conversation_id";

/// The fixed set of memory kinds. Each owns one 90° quadrant of the polar layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// A stated fact about the user or the world.
    Fact,
    /// Something that happened.
    Experience,
    /// A feeling that was expressed.
    Emotion,
    /// A fragment of a conversation.
    Conversation,
}

impl MemoryType {
    /// All memory types in quadrant order.
    pub const ALL: [Self; 4] = [
        Self::Fact,
        Self::Experience,
        Self::Emotion,
        Self::Conversation,
    ];

    /// Start angle of this type's quadrant, in degrees.
    #[must_use]
    pub fn quadrant_start_degrees(self) -> f32 {
        match self {
            Self::Fact => 0.0,
            Self::Experience => 90.0,
            Self::Emotion => 180.0,
            Self::Conversation => 270.0,
        }
    }

    /// Lowercase label used in graph payloads.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Experience => "experience",
            Self::Emotion => "emotion",
            Self::Conversation => "conversation",
        }
    }
}

/// A stored unit of an agent's experience.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique identifier.
    pub id: MemoryId,
    /// Owning agent.
    pub agent_id: AgentId,
    /// Kind of memory.
    pub memory_type: MemoryType,
    /// Free-text body.
    pub content: String,
    /// Optional short summary.
    #[serde(default)]
    pub summary: String,
    /// Keywords attached at ingest.
    #[serde(default)]
    keywords: Vec<String>,
    /// Importance on a 1–10 scale.
    #[serde(deserialize_with = "deserialize_importance")]
    importance: u8,
    /// Optional free-text context (where, with whom).
    #[serde(default)]
    pub context: String,
    /// When the memory was recorded. `None` marks a malformed record.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Arbitrary metadata (thread id lives here).
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Soft-delete flag.
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

/// Stored importance is clamped to 1–10 like [`MemoryRecord::set_importance`].
fn deserialize_importance<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = i64::deserialize(deserializer)?;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(raw.clamp(1, 10) as u8)
}

impl MemoryRecord {
    /// Create an active memory with no keywords or metadata.
    #[must_use]
    pub fn new(
        agent_id: AgentId,
        memory_type: MemoryType,
        content: impl Into<String>,
        importance: u8,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MemoryId::new(),
            agent_id,
            memory_type,
            content: content.into(),
            summary: String::new(),
            keywords: Vec::new(),
            importance: importance.clamp(1, 10),
            context: String::new(),
            created_at: Some(created_at),
            metadata: BTreeMap::new(),
            active: true,
        }
    }

    /// Attach keywords.
    #[must_use]
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Tag the memory with a conversation-thread id under [`THREAD_KEY`].
    #[must_use]
    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.metadata.insert(
            THREAD_KEY.to_string(),
            serde_json::Value::String(thread_id.into()),
        );
        self
    }

    /// Attach a summary.
    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Keywords as stored.
    #[must_use]
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Keywords trimmed, lowercased and de-duplicated, in first-seen order.
    #[must_use]
    pub fn normalized_keywords(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(self.keywords.len());
        for kw in &self.keywords {
            let kw = kw.trim().to_lowercase();
            if !kw.is_empty() && !out.contains(&kw) {
                out.push(kw);
            }
        }
        out
    }

    /// Replace the keyword list.
    pub fn set_keywords(&mut self, keywords: Vec<String>) {
        self.keywords = keywords;
    }

    /// Importance on a 1–10 scale.
    #[must_use]
    pub fn importance(&self) -> u8 {
        self.importance
    }

    /// Update importance, clamped to 1–10.
    pub fn set_importance(&mut self, importance: u8) {
        self.importance = importance.clamp(1, 10);
    }

    /// Whether the record is live (not soft-deleted).
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Soft-delete the record.
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// Conversation-thread id stored under `key`, if present and a string.
    #[must_use]
    pub fn thread_id_by(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(serde_json::Value::as_str)
    }

    /// Conversation-thread id under the default [`THREAD_KEY`].
    #[must_use]
    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id_by(THREAD_KEY)
    }

    /// Absolute time between two records, in seconds. `None` if either
    /// timestamp is missing.
    #[must_use]
    pub fn seconds_apart(&self, other: &Self) -> Option<u64> {
        let (a, b) = (self.created_at?, other.created_at?);
        Some((a - b).num_seconds().unsigned_abs())
    }
}
