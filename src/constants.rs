//! Documented constants for the synapse engine
//!
//! All tunable parameters in one place with justification for their values.
//! Centralizing constants prevents magic numbers and makes tuning easier.
//! Runtime overrides live in [`crate::config`]; the values here are the
//! defaults that config falls back to.

// =============================================================================
// SYNAPSE WEIGHT LIFECYCLE
// A concept is born at INITIAL_WEIGHT, climbs through reinforcement, and is
// demoted to the latent store once multiplicative decay pushes it below
// FORGET_THRESHOLD.
// =============================================================================

/// Weight assigned to a concept on first observation.
///
/// Justification:
/// - 1.0 gives a new concept roughly 16 unreinforced distillations of life
///   at the default decay rate (0.9^16 ≈ 0.185 < 0.2)
/// - Anything seen once and never again should fade within ~2 weeks of
///   daily distills
pub const INITIAL_WEIGHT: f64 = 1.0;

/// Weight assigned to a concept created as a side effect of Hebbian linkage.
///
/// A term can enter the store through co-occurrence before it is ever
/// reinforced directly. Half the organic initial weight keeps these
/// second-hand concepts on a shorter leash.
pub const HEBBIAN_SEED_WEIGHT: f64 = 0.5;

/// Extra weight for special-concept lines (IMPORTANT / DECISION / ...).
///
/// Lines the author explicitly flagged deserve a head start over words
/// that merely co-occur with them.
pub const SPECIAL_LINE_BOOST: f64 = 0.5;

/// LTP boost applied each time a concept surfaces during recall.
///
/// Justification:
/// - 0.1 means ten recalls between distills roughly double a concept
/// - Small enough that recall alone cannot outrun decay forever; the
///   predictive-LTD penalty reclaims concepts that are recalled but never
///   re-observed
pub const RECALL_LTP_BOOST: f64 = 0.1;

/// Multiplicative LTD decay applied to every non-pinned concept per distill.
pub const LTD_DECAY_RATE: f64 = 0.90;

/// Weight below which a concept is demoted to the latent store.
pub const FORGET_THRESHOLD: f64 = 0.2;

/// Weight a latent concept re-enters the hot store with on deep recall.
///
/// 0.5 is deliberately above FORGET_THRESHOLD but below INITIAL_WEIGHT:
/// a revived memory gets a second chance, not a clean slate.
pub const REVIVED_WEIGHT: f64 = 0.5;

/// Initial weight for explicit `memorize` entries.
///
/// Source modules disagree (2.5 vs 5.0); we default to 2.5 to preserve the
/// "pinned but replaceable" semantics and expose it in config.
pub const MEMORIZE_WEIGHT: f64 = 2.5;

/// Minimum weight for a pinned rule; `pin` takes max(existing, this).
pub const PIN_FLOOR_WEIGHT: f64 = 1.0;

// =============================================================================
// PREDICTIVE LTD
// A concept recalled often but never consolidated by new observations is
// being surfaced on reputation alone, and gets penalised for it.
// =============================================================================

/// Minimum recall_count before predictive LTD considers a concept.
pub const PREDICTIVE_LTD_MIN_RECALLS: u64 = 3;

/// A concept must have count ≥ this fraction of its recall_count to escape
/// the penalty.
pub const PREDICTIVE_LTD_CONSOLIDATION_RATIO: f64 = 0.5;

/// Penalty per recall: weight -= rate × recall_count.
pub const PREDICTIVE_LTD_PENALTY_RATE: f64 = 0.1;

// =============================================================================
// ACTIVATION AND RECALL
// =============================================================================

/// Number of Hebbian partners used to expand a recall query.
pub const SPREADING_TOP_N: usize = 3;

/// Maximum concepts returned by direct activation.
pub const DIRECT_ACTIVATION_LIMIT: usize = 5;

/// Default number of latent concepts revived per deep recall.
pub const DEEP_RECALL_LIMIT: usize = 5;

/// Archive files scanned for context during deep recall.
pub const ARCHIVE_SCAN_FILES: usize = 10;

/// Matching lines returned per archive file during deep recall.
pub const ARCHIVE_CONTEXT_LINES: usize = 3;

/// Ceiling for the dynamic re-ranking weight.
///
/// min(1 + ln(count+1) / (1 + 0.1 * days_idle), 2.0). The cap stops a
/// single very frequent term from drowning the similarity signal.
pub const MAX_WEIGHT_MULTIPLIER: f64 = 2.0;

/// Recency damping factor in the dynamic weight denominator.
pub const KEYWORD_DECAY_FACTOR: f64 = 0.1;

/// Neutral similarity for results that carry none (local keyword hits).
pub const NEUTRAL_SIMILARITY: f64 = 0.5;

// =============================================================================
// TOKENIZATION AND SPECIAL LINES
// =============================================================================

/// Minimum character length for a content term.
pub const MIN_WORD_LENGTH: usize = 2;

/// POS tags accepted from a pluggable tagger (nouns + foreign words).
pub const VALID_POS_TAGS: &[&str] = &[
    "n", "nr", "nz", "eng", "noun", "NN", "NNS", "NNP", "NNPS", "FW",
];

/// Keyword pattern marking a special-concept line.
///
/// Case-insensitive; matched per line during distillation. The matching
/// line itself (stripped, truncated) becomes a concept key.
pub const SPECIAL_CONCEPT_PATTERN: &str =
    r"(?i)IMPORTANT|TODO|DECISION|LESSON|REMEMBER|重要|决策|教训|记住";

/// Characters of a special line kept as the concept key.
pub const SPECIAL_LINE_MAX_CHARS: usize = 50;

// =============================================================================
// RETRIEVAL BUDGETS
// The recall hot path is bounded: the local index gets 100 ms, the vector
// race 3 s. Expiry returns empty results, never an error.
// =============================================================================

/// Execution budget for one local index search.
pub const LOCAL_SEARCH_BUDGET_MS: u64 = 100;

/// Deadline for the vector half of the recall race.
pub const VECTOR_RACE_TIMEOUT_MS: u64 = 3_000;

/// HTTP timeout for a single embedding API call.
pub const VECTOR_API_TIMEOUT_MS: u64 = 5_000;

/// Maximum results from either retrieval path.
pub const SEARCH_MAX_RESULTS: usize = 5;

/// Soft character limit for one embedding chunk (paragraph-grouped).
pub const CHUNK_SIZE: usize = 1_000;

/// Preview prefix length used to deduplicate chunks per file.
pub const CHUNK_DEDUPE_PREFIX: usize = 200;

// =============================================================================
// OBSERVER
// =============================================================================

/// Minimum total observations before batch analysis runs at all.
pub const MIN_OBSERVATIONS_FOR_INSTINCT: usize = 5;

/// Minimum group size for a recurring pattern to become an instinct.
pub const INSTINCT_MIN_GROUP: usize = 3;

/// Random suffix length of an observation id (`obs_<millis>_<suffix>`).
pub const OBSERVATION_ID_SUFFIX_LEN: usize = 9;

/// Confidence buckets by evidence count: ≤2, ≤5, ≤10, more.
pub const CONFIDENCE_BUCKETS: [(usize, f64); 3] = [(2, 0.3), (5, 0.5), (10, 0.7)];

/// Confidence above the last bucket boundary.
pub const CONFIDENCE_MAX: f64 = 0.85;

// =============================================================================
// CROSS-PROCESS LOCKING
// =============================================================================

/// Attempts to create the sentinel lock file before abandoning a mutation.
pub const LOCK_RETRY_ATTEMPTS: u32 = 5;

/// Sleep between lock attempts.
pub const LOCK_RETRY_DELAY_MS: u64 = 50;
