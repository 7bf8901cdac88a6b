//! Concept extraction — lexical heuristics over a single memory.
//!
//! Pure and infallible: malformed names are skipped one at a time and the
//! batch always completes. Lexicons come from [`ExtractionConfig`] so they
//! can be swapped per deployment.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::ConceptCategory;
use crate::config::ExtractionConfig;
use crate::memory::MemoryRecord;

/// A tentative concept produced by the extractor, not yet merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptCandidate {
    /// Normalized name.
    pub name: String,
    /// Semantic category.
    pub category: ConceptCategory,
    /// Tentative valence in `[-1, 1]`.
    pub valence: f32,
    /// Tentative importance in `[0, 1]`, from the memory's importance.
    pub importance: f32,
}

/// Extract concept candidates from a memory's keywords and content.
///
/// Keywords become `Emotion`, `Event` or `Relation` concepts when they hit
/// a lexicon and `Topic` concepts otherwise. Content contributes lexicon
/// hits, capitalized words that do not open a sentence (`Entity`) and
/// "favorite X" / "I am X" / "I'm X" phrases (`Attribute`).
#[must_use]
pub fn extract_concepts(memory: &MemoryRecord, cfg: &ExtractionConfig) -> Vec<ConceptCandidate> {
    let lexicon = Lexicon::new(cfg);
    let keywords = memory.normalized_keywords();
    let words = tokenize(&memory.content);

    let mean_valence = lexicon.mean_valence(
        keywords
            .iter()
            .map(String::as_str)
            .chain(words.iter().map(Word::key)),
    );
    let mut out = Candidates {
        cfg,
        lexicon: &lexicon,
        importance: f32::from(memory.importance()) / 10.0,
        mean_valence,
        items: Vec::new(),
    };

    for keyword in &keywords {
        let category = lexicon.categorize(keyword).unwrap_or(ConceptCategory::Topic);
        out.push(keyword, category);
    }

    let mut entity: Vec<&str> = Vec::new();
    for (i, word) in words.iter().enumerate() {
        let key = word.key();

        if lexicon.is_entity_word(word) {
            entity.push(key);
            if word.ends_sentence {
                out.push(&entity.join(" "), ConceptCategory::Entity);
                entity.clear();
            }
            continue;
        }
        if !entity.is_empty() {
            out.push(&entity.join(" "), ConceptCategory::Entity);
            entity.clear();
        }

        if let Some(category) = lexicon.categorize(key) {
            out.push(key, category);
        }

        if word.ends_sentence {
            continue;
        }
        match key {
            "favorite" | "favourite" => {
                if let Some(target) = lexicon.attribute_after(&words, i + 1) {
                    out.push(&format!("favorite {target}"), ConceptCategory::Attribute);
                }
            }
            "i'm" => {
                if let Some(target) = lexicon.attribute_after(&words, i + 1) {
                    out.push(target, ConceptCategory::Attribute);
                }
            }
            "i" if words.get(i + 1).is_some_and(|w| w.key() == "am" && !w.ends_sentence) => {
                if let Some(target) = lexicon.attribute_after(&words, i + 2) {
                    out.push(target, ConceptCategory::Attribute);
                }
            }
            _ => {}
        }
    }
    if !entity.is_empty() {
        out.push(&entity.join(" "), ConceptCategory::Entity);
    }

    trace!(
        memory_id = %memory.id,
        candidates = out.items.len(),
        "concepts extracted"
    );
    out.items
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Word {
    raw: String,
    lower: String,
    sentence_start: bool,
    ends_sentence: bool,
}

impl Word {
    /// Lowercased form with a trailing possessive removed.
    fn key(&self) -> &str {
        self.lower.strip_suffix("'s").unwrap_or(&self.lower)
    }

    fn is_capitalized(&self) -> bool {
        self.raw.chars().next().is_some_and(char::is_uppercase)
    }
}

fn tokenize(text: &str) -> Vec<Word> {
    let mut words = Vec::new();
    let mut sentence_start = true;
    for chunk in text.split_whitespace() {
        let ends_sentence = chunk.ends_with(['.', '!', '?']);
        let raw = chunk
            .trim_matches(|c: char| !c.is_alphanumeric())
            .replace('\u{2019}', "'");
        if raw.is_empty() {
            sentence_start = sentence_start || ends_sentence;
            continue;
        }
        words.push(Word {
            lower: raw.to_lowercase(),
            raw,
            sentence_start,
            ends_sentence,
        });
        sentence_start = ends_sentence;
    }
    words
}

// ---------------------------------------------------------------------------
// Lexicon
// ---------------------------------------------------------------------------

struct Lexicon {
    emotions: HashMap<String, f32>,
    events: HashSet<String>,
    relations: HashSet<String>,
    stopwords: HashSet<String>,
}

impl Lexicon {
    fn new(cfg: &ExtractionConfig) -> Self {
        let lower = |list: &[String]| -> HashSet<String> {
            list.iter().map(|w| w.to_lowercase()).collect()
        };
        Self {
            emotions: cfg
                .emotion_lexicon
                .iter()
                .map(|(w, v)| (w.to_lowercase(), *v))
                .collect(),
            events: lower(&cfg.event_words),
            relations: lower(&cfg.relation_words),
            stopwords: lower(&cfg.stopwords),
        }
    }

    /// Lexicon category of a word; emotion wins over event over relation.
    fn categorize(&self, word: &str) -> Option<ConceptCategory> {
        if self.emotions.contains_key(word) {
            Some(ConceptCategory::Emotion)
        } else if self.events.contains(word) {
            Some(ConceptCategory::Event)
        } else if self.relations.contains(word) {
            Some(ConceptCategory::Relation)
        } else {
            None
        }
    }

    fn is_stopword(&self, word: &str) -> bool {
        self.stopwords.contains(word)
    }

    fn is_entity_word(&self, word: &Word) -> bool {
        let key = word.key();
        word.is_capitalized()
            && !word.sentence_start
            && key != "i"
            && key != "i'm"
            && !self.is_stopword(key)
            && self.categorize(key).is_none()
    }

    fn mean_valence<'a>(&self, words: impl Iterator<Item = &'a str>) -> f32 {
        let (sum, count) = words
            .filter_map(|w| self.emotions.get(w))
            .fold((0.0_f32, 0_u16), |(s, n), v| (s + v, n.saturating_add(1)));
        if count == 0 { 0.0 } else { sum / f32::from(count) }
    }

    /// First non-stopword at or after `from` within the same sentence,
    /// unless it is an emotion word (those are captured as emotions).
    fn attribute_after<'w>(&self, words: &'w [Word], from: usize) -> Option<&'w str> {
        for word in words.get(from..)? {
            let key = word.key();
            if !self.is_stopword(key) {
                return (!self.emotions.contains_key(key)).then_some(key);
            }
            if word.ends_sentence {
                return None;
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Candidate collection
// ---------------------------------------------------------------------------

struct Candidates<'a> {
    cfg: &'a ExtractionConfig,
    lexicon: &'a Lexicon,
    importance: f32,
    mean_valence: f32,
    items: Vec<ConceptCandidate>,
}

impl Candidates<'_> {
    fn push(&mut self, name: &str, category: ConceptCategory) {
        if self.items.len() >= self.cfg.max_candidates {
            return;
        }
        let name = name.trim().to_lowercase();
        if name.chars().count() < self.cfg.min_name_len
            || !name.chars().any(char::is_alphanumeric)
            || self.lexicon.is_stopword(&name)
        {
            trace!(name = %name, "skipping malformed concept name");
            return;
        }
        if self
            .items
            .iter()
            .any(|c| c.category == category && c.name == name)
        {
            return;
        }
        let valence = match category {
            ConceptCategory::Emotion => self
                .lexicon
                .emotions
                .get(&name)
                .copied()
                .unwrap_or(self.mean_valence),
            _ => self.mean_valence,
        };
        self.items.push(ConceptCandidate {
            name,
            category,
            valence,
            importance: self.importance,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryType;
    use crate::types::AgentId;
    use chrono::Utc;

    fn memory(content: &str, keywords: &[&str]) -> MemoryRecord {
        MemoryRecord::new(AgentId::new(), MemoryType::Experience, content, 6, Utc::now())
            .with_keywords(keywords.iter().copied())
    }

    fn has(cands: &[ConceptCandidate], name: &str, category: ConceptCategory) -> bool {
        cands.iter().any(|c| c.name == name && c.category == category)
    }

    #[test]
    fn keywords_are_categorized_by_lexicon() {
        let cfg = ExtractionConfig::default();
        let cands = extract_concepts(&memory("", &["Ocean", "travel", "happy", "sister"]), &cfg);
        assert!(has(&cands, "ocean", ConceptCategory::Topic));
        assert!(has(&cands, "travel", ConceptCategory::Event));
        assert!(has(&cands, "happy", ConceptCategory::Emotion));
        assert!(has(&cands, "sister", ConceptCategory::Relation));
    }

    #[test]
    fn mid_sentence_capitals_become_entities() {
        let cfg = ExtractionConfig::default();
        let cands = extract_concepts(
            &memory("Yesterday we flew to New York with Maria. Then it rained.", &[]),
            &cfg,
        );
        assert!(has(&cands, "new york", ConceptCategory::Entity));
        assert!(has(&cands, "maria", ConceptCategory::Entity));
        assert!(!has(&cands, "yesterday", ConceptCategory::Entity));
        assert!(!has(&cands, "then", ConceptCategory::Entity));
    }

    #[test]
    fn attribute_patterns_are_detected() {
        let cfg = ExtractionConfig::default();
        let cands = extract_concepts(
            &memory("My favorite color is blue and I am a nurse. I'm vegetarian", &[]),
            &cfg,
        );
        assert!(has(&cands, "favorite color", ConceptCategory::Attribute));
        assert!(has(&cands, "nurse", ConceptCategory::Attribute));
        assert!(has(&cands, "vegetarian", ConceptCategory::Attribute));
    }

    #[test]
    fn emotion_valence_comes_from_lexicon_and_others_inherit_mean() {
        let cfg = ExtractionConfig::default();
        let cands = extract_concepts(&memory("I was sad about the trip", &["trip"]), &cfg);
        let sad = cands
            .iter()
            .find(|c| c.name == "sad")
            .expect("sad extracted");
        let trip = cands
            .iter()
            .find(|c| c.name == "trip")
            .expect("trip extracted");
        assert!((sad.valence - cfg.emotion_lexicon["sad"]).abs() < f32::EPSILON);
        assert!((trip.valence - cfg.emotion_lexicon["sad"]).abs() < f32::EPSILON);
        assert!((trip.importance - 0.6).abs() < 1e-6);
    }

    #[test]
    fn malformed_names_are_skipped_and_duplicates_collapsed() {
        let cfg = ExtractionConfig::default();
        let cands = extract_concepts(&memory("", &["", "x", "the", "!!!", "Beach", "beach"]), &cfg);
        assert_eq!(cands.len(), 1);
        assert_eq!(cands[0].name, "beach");
    }

    #[test]
    fn candidate_count_is_capped() {
        let cfg = ExtractionConfig {
            max_candidates: 2,
            ..ExtractionConfig::default()
        };
        let cands = extract_concepts(&memory("", &["alpha", "beta", "gamma"]), &cfg);
        assert_eq!(cands.len(), 2);
    }

    #[test]
    fn empty_memory_yields_nothing() {
        let cands = extract_concepts(&memory("   ", &[]), &ExtractionConfig::default());
        assert!(cands.is_empty());
    }
}
