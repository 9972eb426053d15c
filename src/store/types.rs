//! Record types for the hot and latent stores
//!
//! One struct with optional fields rather than a sum type: the persisted
//! JSON stays flat, and pinned/revival metadata is simply absent on
//! organic records.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current wall clock in epoch milliseconds, the timestamp unit of every
/// persisted record.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// A weighted concept in the hot store
///
/// `first_seen` is immutable once written: it anchors lifespan
/// calculations and is never reset by reinforcement or revival.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Synapse {
    /// Reinforcement and decay target; never negative
    pub weight: f64,

    /// Total occurrences seen during distillation
    #[serde(default)]
    pub count: u64,

    /// Times surfaced by recall since the last distillation
    #[serde(default)]
    pub recall_count: u64,

    pub first_seen: i64,
    #[serde(default)]
    pub last_seen: i64,
    #[serde(default)]
    pub last_access: i64,

    /// Source log filenames, ordered, unique
    #[serde(default)]
    pub refs: Vec<String>,

    /// Co-occurrence strength per partner concept; mirrored in the partner
    #[serde(default)]
    pub synapses: BTreeMap<String, u32>,

    // === Pinned / instinct fields ===
    #[serde(default, skip_serializing_if = "is_false")]
    pub pinned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Vec<String>>,

    // === Revival / memorize stamps ===
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revived_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revived_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memorized_at: Option<i64>,
}

impl Synapse {
    /// A fresh organic record, all timestamps at now
    pub fn organic(weight: f64, now: i64) -> Self {
        Self {
            weight,
            count: 0,
            recall_count: 0,
            first_seen: now,
            last_seen: now,
            last_access: now,
            refs: Vec::new(),
            synapses: BTreeMap::new(),
            pinned: false,
            rule: None,
            domain: None,
            source: None,
            trigger: None,
            confidence: None,
            evidence: None,
            revived_from: None,
            revived_at: None,
            memorized_at: None,
        }
    }

    /// Add a source log reference, preserving order and uniqueness
    pub fn add_ref(&mut self, source_file: &str) {
        if !self.refs.iter().any(|r| r == source_file) {
            self.refs.push(source_file.to_string());
        }
    }
}

/// A demoted concept in the latent store
///
/// Identical to the hot record plus the demotion stamp and the weight it
/// carried at that moment (the deep-recall ranking key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatentSynapse {
    #[serde(flatten)]
    pub record: Synapse,
    pub archived_at: i64,
    pub original_weight: f64,
}

/// An instinct promoted by the Observer: pinned, non-decaying
#[derive(Debug, Clone)]
pub struct Instinct {
    pub id: String,
    pub trigger: String,
    pub action: String,
    pub domain: String,
    pub confidence: f64,
    pub evidence: Vec<String>,
}

/// A pinned rule surfaced in recall responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinnedRule {
    pub keyword: String,
    pub rule: String,
}

/// One entry of `get-top-concepts`
#[derive(Debug, Clone, Serialize)]
pub struct TopConcept {
    pub concept: String,
    pub weight: f64,
    pub count: u64,
}

/// Aggregates over the latent store (`latent-stats`)
#[derive(Debug, Clone, Serialize)]
pub struct LatentStats {
    pub total_latent: usize,
    pub oldest_archive: Option<String>,
    pub newest_archive: Option<String>,
    pub average_age_days: f64,
}

/// Context lines pulled from one archive file during deep recall
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveContext {
    pub file: String,
    pub lines: Vec<String>,
}

/// Result of a deep recall pass
#[derive(Debug, Clone, Serialize)]
pub struct DeepRecallResult {
    pub source: String,
    pub query: String,
    pub revived_count: usize,
    pub revived_memories: Vec<String>,
    pub archive_context: Vec<ArchiveContext>,
    pub remaining_latent: usize,
}
