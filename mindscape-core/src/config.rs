//! Configuration for the mindscape graph engine.
//!
//! Maps directly to `mindscape.toml`. Every scoring heuristic (lexicons,
//! thresholds, weights, layout bounds, stage timings) is a named field here
//! so the algorithms can be tuned and tested independently of their shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level mindscape configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MindConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Concept extraction lexicons and limits.
    #[serde(default)]
    pub extraction: ExtractionConfig,
    /// Concept merge and relationship discovery.
    #[serde(default)]
    pub merge: MergeConfig,
    /// Link scoring weights and thresholds.
    #[serde(default)]
    pub linking: LinkingConfig,
    /// Graph statistics settings.
    #[serde(default)]
    pub stats: StatsConfig,
    /// Deterministic polar layout bounds.
    #[serde(default)]
    pub polar: PolarConfig,
    /// Force-directed simulation parameters.
    #[serde(default)]
    pub force: ForceConfig,
    /// Activation scoring weights.
    #[serde(default)]
    pub activation: ActivationConfig,
    /// Processing-stage timer durations.
    #[serde(default)]
    pub stages: StageConfig,
    /// Persistence settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl MindConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `MindError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::MindError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Whether graph construction runs on new memories.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Lexicons and limits for the concept extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Candidate names shorter than this are skipped.
    #[serde(default = "default_2_usize")]
    pub min_name_len: usize,
    /// Hard cap on candidates produced per memory.
    #[serde(default = "default_32_usize")]
    pub max_candidates: usize,
    /// Emotion words and their valence in `[-1, 1]`.
    #[serde(default = "default_emotion_lexicon")]
    pub emotion_lexicon: BTreeMap<String, f32>,
    /// Words that mark an event.
    #[serde(default = "default_event_words")]
    pub event_words: Vec<String>,
    /// Words that name a relationship to another person.
    #[serde(default = "default_relation_words")]
    pub relation_words: Vec<String>,
    /// Words never turned into concepts.
    #[serde(default = "default_stopwords")]
    pub stopwords: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_name_len: 2,
            max_candidates: 32,
            emotion_lexicon: default_emotion_lexicon(),
            event_words: default_event_words(),
            relation_words: default_relation_words(),
            stopwords: default_stopwords(),
        }
    }
}

/// Concept merge and relationship discovery tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Minimum weight of the newest observation in the valence blend.
    #[serde(default = "default_0_3")]
    pub valence_recency_weight: f32,
    /// Importance added on every reoccurrence.
    #[serde(default = "default_0_05")]
    pub importance_bump: f32,
    /// Scale applied to name-token similarity.
    #[serde(default = "default_0_5")]
    pub similarity_weight: f32,
    /// Relationships weaker than this are not recorded.
    #[serde(default = "default_0_1")]
    pub min_relation_strength: f32,
    /// Maximum related-concept entries kept per concept.
    #[serde(default = "default_10_usize")]
    pub max_related: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            valence_recency_weight: 0.3,
            importance_bump: 0.05,
            similarity_weight: 0.5,
            min_relation_strength: 0.1,
            max_related: 10,
        }
    }
}

/// Link scoring weights.
///
/// ```text
/// strength = min(shared × per_shared_concept, concept_cap)
///          + thread_bonus                      (same conversation thread)
///          + temporal_weight × (1 − Δt/window)  (Δt < window)
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkingConfig {
    /// Minimum total score for a link to be emitted.
    #[serde(default = "default_0_3")]
    pub threshold: f32,
    /// Score added per shared concept.
    #[serde(default = "default_0_1")]
    pub per_shared_concept: f32,
    /// Saturation cap of the concept-overlap term.
    #[serde(default = "default_0_3")]
    pub concept_cap: f32,
    /// Flat bonus when both memories carry the same thread id.
    #[serde(default = "default_0_3")]
    pub thread_bonus: f32,
    /// Weight of the temporal-proximity term.
    #[serde(default = "default_0_2")]
    pub temporal_weight: f32,
    /// Temporal window in seconds.
    #[serde(default = "default_3600")]
    pub temporal_window_secs: u64,
    /// Strength of the synthetic core connection for activated memories.
    #[serde(default = "default_0_9")]
    pub core_strength: f32,
    /// Metadata key holding the conversation-thread id.
    #[serde(default = "default_thread_key")]
    pub thread_key: String,
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            per_shared_concept: 0.1,
            concept_cap: 0.3,
            thread_bonus: 0.3,
            temporal_weight: 0.2,
            temporal_window_secs: 3600,
            core_strength: 0.9,
            thread_key: "conversation_id".to_string(),
        }
    }
}

/// Graph statistics settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Mutual relation strength at which two concepts share a cluster.
    #[serde(default = "default_0_5")]
    pub cluster_strength: f32,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            cluster_strength: 0.5,
        }
    }
}

/// Deterministic polar layout bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolarConfig {
    /// Radius of importance-10 memories.
    #[serde(default = "default_2_0")]
    pub min_radius: f32,
    /// Radius of importance-1 memories.
    #[serde(default = "default_10_0")]
    pub max_radius: f32,
    /// Fraction of each quadrant left empty on either side.
    #[serde(default = "default_0_1")]
    pub padding_fraction: f32,
    /// Age (days) beyond which memories all sit at the bottom of the band.
    #[serde(default = "default_30_0")]
    pub horizon_days: f32,
    /// Lower edge of the vertical band (oldest).
    #[serde(default = "default_neg_3_0")]
    pub y_min: f32,
    /// Upper edge of the vertical band (newest).
    #[serde(default = "default_3_0")]
    pub y_max: f32,
    /// Amplitude of the depth jitter applied to activated memories.
    #[serde(default = "default_0_3")]
    pub jitter_amplitude: f32,
    /// Angular frequency of the depth jitter per ordinal index.
    #[serde(default = "default_0_7")]
    pub jitter_frequency: f32,
}

impl Default for PolarConfig {
    fn default() -> Self {
        Self {
            min_radius: 2.0,
            max_radius: 10.0,
            padding_fraction: 0.1,
            horizon_days: 30.0,
            y_min: -3.0,
            y_max: 3.0,
            jitter_amplitude: 0.3,
            jitter_frequency: 0.7,
        }
    }
}

/// Force-directed simulation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForceConfig {
    /// Canvas width.
    #[serde(default = "default_800_0")]
    pub width: f32,
    /// Canvas height.
    #[serde(default = "default_600_0")]
    pub height: f32,
    /// Margin kept free along every canvas edge.
    #[serde(default = "default_20_0")]
    pub padding: f32,
    /// Inverse-square repulsion constant.
    #[serde(default = "default_5000_0")]
    pub repulsion: f32,
    /// Spring coefficient, scaled by edge strength.
    #[serde(default = "default_0_01")]
    pub attraction: f32,
    /// Pull toward the canvas midpoint.
    #[serde(default = "default_0_01")]
    pub centering: f32,
    /// Velocity damping factor per step.
    #[serde(default = "default_0_85")]
    pub damping: f32,
    /// Fixed iteration budget.
    #[serde(default = "default_300_usize")]
    pub iterations: usize,
    /// Distance floor for the repulsion term.
    #[serde(default = "default_1_0")]
    pub min_distance: f32,
    /// Seed for the initial placement. `None` seeds from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for ForceConfig {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
            padding: 20.0,
            repulsion: 5000.0,
            attraction: 0.01,
            centering: 0.01,
            damping: 0.85,
            iterations: 300,
            min_distance: 1.0,
            seed: None,
        }
    }
}

/// Activation scoring weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationConfig {
    /// Strength of the first forced id.
    #[serde(default = "default_1_0")]
    pub forced_base: f32,
    /// Fractional decay applied per forced rank.
    #[serde(default = "default_0_1")]
    pub forced_decay_rate: f32,
    /// Score per memory keyword found in the query.
    #[serde(default = "default_0_3")]
    pub keyword_weight: f32,
    /// Score per query token found in the memory content.
    #[serde(default = "default_0_1")]
    pub content_weight: f32,
    /// Query-derived scores must exceed this to activate.
    #[serde(default = "default_0_2")]
    pub activation_threshold: f32,
    /// Query tokens shorter than this are ignored.
    #[serde(default = "default_3_usize")]
    pub min_token_len: usize,
    /// Number of most-recent memories eligible for the recency bonus.
    #[serde(default = "default_5_usize")]
    pub recency_count: usize,
    /// Recency bonus of the newest memory.
    #[serde(default = "default_0_15")]
    pub recency_base: f32,
    /// Bonus reduction per recency rank.
    #[serde(default = "default_0_03")]
    pub recency_step: f32,
    /// Bonuses at or below this are dropped.
    #[serde(default = "default_0_05")]
    pub recency_floor: f32,
    /// Query words ignored during matching.
    #[serde(default = "default_stopwords")]
    pub stopwords: Vec<String>,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            forced_base: 1.0,
            forced_decay_rate: 0.1,
            keyword_weight: 0.3,
            content_weight: 0.1,
            activation_threshold: 0.2,
            min_token_len: 3,
            recency_count: 5,
            recency_base: 0.15,
            recency_step: 0.03,
            recency_floor: 0.05,
            stopwords: default_stopwords(),
        }
    }
}

/// Processing-stage timer durations (milliseconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Delay before `Receiving` auto-advances to `Retrieving`.
    #[serde(default = "default_800_u64")]
    pub receive_delay_ms: u64,
    /// Delay before `Responding` returns to `Idle`.
    #[serde(default = "default_1500_u64")]
    pub respond_delay_ms: u64,
    /// Delay after `Idle` before activation flags clear.
    #[serde(default = "default_3000_u64")]
    pub grace_period_ms: u64,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            receive_delay_ms: 800,
            respond_delay_ms: 1500,
            grace_period_ms: 3000,
        }
    }
}

/// Encoding used for graph snapshots in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotFormat {
    /// JSON text (readable, default).
    #[default]
    Json,
    /// MessagePack (compact).
    MessagePack,
}

/// Persistence / save configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Detect snapshot corruption via checksums.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
    /// Snapshot encoding.
    #[serde(default)]
    pub format: SnapshotFormat,
    /// Number of rotating database backups to keep.
    #[serde(default = "default_3")]
    pub backup_count: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            wal_mode: true,
            checksum_enabled: true,
            format: SnapshotFormat::Json,
            backup_count: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Lexicon defaults
// ---------------------------------------------------------------------------

fn default_emotion_lexicon() -> BTreeMap<String, f32> {
    [
        ("love", 0.9),
        ("happy", 0.8),
        ("joy", 0.8),
        ("excited", 0.7),
        ("grateful", 0.7),
        ("proud", 0.6),
        ("fun", 0.6),
        ("enjoy", 0.6),
        ("hope", 0.5),
        ("relaxed", 0.5),
        ("calm", 0.4),
        ("curious", 0.3),
        ("tired", -0.3),
        ("bored", -0.3),
        ("nervous", -0.4),
        ("worried", -0.5),
        ("stressed", -0.5),
        ("disappointed", -0.5),
        ("anxious", -0.6),
        ("lonely", -0.6),
        ("upset", -0.6),
        ("frustrated", -0.6),
        ("sad", -0.7),
        ("afraid", -0.7),
        ("scared", -0.7),
        ("fear", -0.7),
        ("angry", -0.8),
        ("hate", -0.9),
    ]
    .into_iter()
    .map(|(word, valence)| (word.to_string(), valence))
    .collect()
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| (*w).to_string()).collect()
}

fn default_event_words() -> Vec<String> {
    words(&[
        "trip", "travel", "vacation", "holiday", "party", "wedding", "birthday", "meeting",
        "visit", "concert", "graduation", "interview", "festival", "dinner", "funeral",
        "journey", "match", "appointment", "moved", "anniversary",
    ])
}

fn default_relation_words() -> Vec<String> {
    words(&[
        "mother", "father", "mom", "dad", "sister", "brother", "friend", "wife", "husband",
        "partner", "boyfriend", "girlfriend", "son", "daughter", "boss", "colleague",
        "coworker", "neighbor", "teacher", "family", "grandmother", "grandfather", "cousin",
        "aunt", "uncle",
    ])
}

fn default_stopwords() -> Vec<String> {
    words(&[
        "the", "a", "an", "and", "or", "but", "is", "are", "was", "were", "to", "of", "in",
        "on", "at", "for", "with", "about", "my", "me", "you", "your", "it", "this", "that",
        "i", "we", "they", "he", "she", "had", "have", "has", "be", "been", "do", "did", "so",
        "very", "just", "really", "from", "as", "by", "not", "no", "yes", "our", "their",
        "his", "her", "its", "there", "then", "than", "when", "what", "who", "how", "will",
        "would", "can", "could", "should", "went", "go", "get", "got", "am", "im",
    ])
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_thread_key() -> String { "conversation_id".to_string() }
fn default_0_01() -> f32 { 0.01 }
fn default_0_03() -> f32 { 0.03 }
fn default_0_05() -> f32 { 0.05 }
fn default_0_1() -> f32 { 0.1 }
fn default_0_15() -> f32 { 0.15 }
fn default_0_2() -> f32 { 0.2 }
fn default_0_3() -> f32 { 0.3 }
fn default_0_5() -> f32 { 0.5 }
fn default_0_7() -> f32 { 0.7 }
fn default_0_85() -> f32 { 0.85 }
fn default_0_9() -> f32 { 0.9 }
fn default_1_0() -> f32 { 1.0 }
fn default_2_0() -> f32 { 2.0 }
fn default_3_0() -> f32 { 3.0 }
fn default_neg_3_0() -> f32 { -3.0 }
fn default_10_0() -> f32 { 10.0 }
fn default_20_0() -> f32 { 20.0 }
fn default_30_0() -> f32 { 30.0 }
fn default_600_0() -> f32 { 600.0 }
fn default_800_0() -> f32 { 800.0 }
fn default_5000_0() -> f32 { 5000.0 }
fn default_2_usize() -> usize { 2 }
fn default_3_usize() -> usize { 3 }
fn default_5_usize() -> usize { 5 }
fn default_10_usize() -> usize { 10 }
fn default_32_usize() -> usize { 32 }
fn default_300_usize() -> usize { 300 }
fn default_3() -> u32 { 3 }
fn default_3600() -> u64 { 3600 }
fn default_800_u64() -> u64 { 800 }
fn default_1500_u64() -> u64 { 1500 }
fn default_3000_u64() -> u64 { 3000 }
