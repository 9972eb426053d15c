//! Content-term extraction for the weight store
//!
//! Two paths: a pluggable part-of-speech tagger that keeps nouns and
//! foreign words, and a regex fallback for when no tagger is wired in (or
//! the tagger fails, or returns nothing). Mixed CJK/Latin text is the
//! normal case, not the exception.
//!
//! This extractor selects *content words* for the synapse store. The
//! inverted index has its own extractor with different rules (per-ideograph
//! keys); the two are intentionally separate and must not be unified.

use std::collections::HashSet;

use regex::Regex;
use tracing::debug;

use crate::config::KeywordConfig;

/// A term with the tag assigned by an external tagger
#[derive(Debug, Clone)]
pub struct TaggedTerm {
    pub term: String,
    pub tag: String,
}

/// Pluggable part-of-speech tagger capability
///
/// Implementations may call out to any NLP backend. A tagger error is
/// never surfaced: extraction silently degrades to the regex fallback.
pub trait PosTagger: Send + Sync {
    fn tag(&self, text: &str) -> anyhow::Result<Vec<TaggedTerm>>;
}

/// English function words dropped by the fallback path
const ENGLISH_STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "is", "are", "was", "were", "be", "been", "being",
    "to", "of", "in", "on", "at", "for", "with", "by", "from", "as", "this", "that", "these",
    "those", "it", "its", "has", "have", "had", "do", "does", "did", "will", "would", "can",
    "could", "should", "not", "no", "so", "if", "then", "than", "too", "very", "just", "about",
    "into", "over", "after", "before", "when", "what", "which", "who", "how", "all", "any",
    "each", "more", "most", "some", "such", "only", "own", "same", "there", "here", "they",
    "them", "their", "you", "your", "we", "our", "he", "she", "his", "her", "my", "me", "up",
    "out", "down", "off", "again", "also",
];

/// CJK function words dropped by the fallback path
///
/// Only multi-character entries matter: the fallback never emits single
/// ideographs.
const CJK_STOP_WORDS: &[&str] = &[
    "我们", "你们", "他们", "她们", "这个", "那个", "这些", "那些", "什么", "怎么", "为什么",
    "因为", "所以", "但是", "如果", "就是", "还是", "或者", "可以", "没有", "一个", "一些",
    "这样", "那样", "已经", "现在", "时候", "可能", "应该", "不是", "不会", "不要", "自己",
    "大家", "觉得", "知道", "然后", "于是", "虽然", "即使", "并且", "而且", "只是", "真的",
];

/// Content-term extractor (C1)
pub struct Tokenizer {
    tagger: Option<Box<dyn PosTagger>>,
    min_word_length: usize,
    valid_tags: HashSet<String>,
    fallback_pattern: Regex,
    english_stops: HashSet<&'static str>,
    cjk_stops: HashSet<&'static str>,
}

impl Tokenizer {
    pub fn new(config: &KeywordConfig) -> Self {
        Self::with_tagger(config, None)
    }

    pub fn with_tagger(config: &KeywordConfig, tagger: Option<Box<dyn PosTagger>>) -> Self {
        Self {
            tagger,
            min_word_length: config.min_word_length,
            valid_tags: config.valid_pos_tags.iter().cloned().collect(),
            // CJK ideograph runs or ASCII letter runs, both >= 2 chars
            fallback_pattern: Regex::new(r"[\u{4e00}-\u{9fa5}]{2,}|[A-Za-z]{2,}")
                .expect("fallback token pattern is valid"),
            english_stops: ENGLISH_STOP_WORDS.iter().copied().collect(),
            cjk_stops: CJK_STOP_WORDS.iter().copied().collect(),
        }
    }

    /// Extract content terms from raw text.
    ///
    /// Deterministic for identical input and tagger state; never fails.
    /// Output is lowercased and order-stable deduplicated.
    pub fn extract(&self, text: &str) -> Vec<String> {
        if let Some(tagger) = &self.tagger {
            match tagger.tag(text) {
                Ok(tagged) if !tagged.is_empty() => {
                    let terms = self.filter_tagged(tagged);
                    if !terms.is_empty() {
                        return terms;
                    }
                    // Tagger produced nothing usable; fall through
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("tagger failed, using fallback extraction: {e}");
                }
            }
        }
        self.extract_fallback(text)
    }

    fn filter_tagged(&self, tagged: Vec<TaggedTerm>) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut terms = Vec::new();
        for t in tagged {
            if !self.valid_tags.contains(&t.tag) {
                continue;
            }
            if t.term.chars().count() < self.min_word_length {
                continue;
            }
            let term = t.term.to_lowercase();
            if seen.insert(term.clone()) {
                terms.push(term);
            }
        }
        terms
    }

    fn extract_fallback(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut terms = Vec::new();
        for m in self.fallback_pattern.find_iter(text) {
            let term = m.as_str().to_lowercase();
            if term.chars().count() < self.min_word_length {
                continue;
            }
            if self.english_stops.contains(term.as_str()) || self.cjk_stops.contains(term.as_str())
            {
                continue;
            }
            if seen.insert(term.clone()) {
                terms.push(term);
            }
        }
        terms
    }
}
