//! Configuration management for the synapse engine
//!
//! All configurable parameters in one place with environment variable
//! overrides. Follows the principle: sensible defaults, configurable in
//! production. The CLI constructs exactly one `EngineConfig` per
//! invocation and threads it by reference.

use std::env;
use std::path::PathBuf;
use tracing::info;

use crate::constants::*;

/// LTP/LTD weight lifecycle parameters
#[derive(Debug, Clone)]
pub struct LtdConfig {
    /// Multiplicative decay per distillation (default: 0.90)
    pub decay_rate: f64,
    /// Demotion threshold to the latent store (default: 0.2)
    pub forget_threshold: f64,
    /// Weight restored on deep-recall revival (default: 0.5)
    pub revived_weight: f64,
    /// Weight of a freshly observed concept (default: 1.0)
    pub initial_weight: f64,
    /// Weight of an explicit `memorize` entry (default: 2.5)
    pub memorize_weight: f64,
}

impl Default for LtdConfig {
    fn default() -> Self {
        Self {
            decay_rate: LTD_DECAY_RATE,
            forget_threshold: FORGET_THRESHOLD,
            revived_weight: REVIVED_WEIGHT,
            initial_weight: INITIAL_WEIGHT,
            memorize_weight: MEMORIZE_WEIGHT,
        }
    }
}

/// Observer batch-promotion parameters
#[derive(Debug, Clone)]
pub struct ObserverConfig {
    /// Total observations required before batch analysis runs (default: 5)
    pub min_observations_for_instinct: usize,
    /// Confidence curve: base / per-confirmation increment / contradiction
    /// decrement / weekly decay. The batch path uses bucketed confidence;
    /// these govern later adjustment of a live instinct.
    pub confidence_base: f64,
    pub confidence_increment: f64,
    pub confidence_decrement: f64,
    pub confidence_decay_weekly: f64,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            min_observations_for_instinct: MIN_OBSERVATIONS_FOR_INSTINCT,
            confidence_base: 0.3,
            confidence_increment: 0.05,
            confidence_decrement: 0.1,
            confidence_decay_weekly: 0.02,
        }
    }
}

/// Keyword extraction parameters
#[derive(Debug, Clone)]
pub struct KeywordConfig {
    /// Minimum term length (default: 2)
    pub min_word_length: usize,
    /// Ceiling for the dynamic re-ranking multiplier (default: 2.0)
    pub max_weight_multiplier: f64,
    /// Recency damping in the dynamic weight (default: 0.1)
    pub decay_factor: f64,
    /// POS tags accepted from a pluggable tagger
    pub valid_pos_tags: Vec<String>,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            min_word_length: MIN_WORD_LENGTH,
            max_weight_multiplier: MAX_WEIGHT_MULTIPLIER,
            decay_factor: KEYWORD_DECAY_FACTOR,
            valid_pos_tags: VALID_POS_TAGS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// Local inverted-index budget
#[derive(Debug, Clone)]
pub struct LocalSearchConfig {
    /// Hard execution budget for one search (default: 100 ms)
    pub max_execution_time_ms: u64,
}

impl Default for LocalSearchConfig {
    fn default() -> Self {
        Self {
            max_execution_time_ms: LOCAL_SEARCH_BUDGET_MS,
        }
    }
}

/// Embedding API parameters
#[derive(Debug, Clone)]
pub struct VectorApiConfig {
    /// HTTP timeout per embedding call (default: 5000 ms)
    pub timeout_ms: u64,
    /// Deadline for the recall-time vector race (default: 3000 ms)
    pub race_timeout_ms: u64,
    /// Results returned per vector search (default: 5)
    pub max_results: usize,
    /// Soft chunk size for incremental indexing (default: 1000 chars)
    pub chunk_size: usize,
}

impl Default for VectorApiConfig {
    fn default() -> Self {
        Self {
            timeout_ms: VECTOR_API_TIMEOUT_MS,
            race_timeout_ms: VECTOR_RACE_TIMEOUT_MS,
            max_results: SEARCH_MAX_RESULTS,
            chunk_size: CHUNK_SIZE,
        }
    }
}

/// Feature switches
#[derive(Debug, Clone)]
pub struct FeatureFlags {
    pub enable_vector_search: bool,
    pub enable_observer: bool,
    pub enable_auto_distill: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_vector_search: true,
            enable_observer: true,
            enable_auto_distill: false,
        }
    }
}

/// Engine configuration loaded from environment with defaults
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Engine state directory: weight stores, caches, observation log
    pub engine_dir: PathBuf,
    /// Active daily logs (`YYYY-MM-DD.md`)
    pub memory_dir: PathBuf,
    /// Archived daily logs
    pub archive_dir: PathBuf,

    pub ltd: LtdConfig,
    pub observer: ObserverConfig,
    pub keywords: KeywordConfig,
    pub local_search: LocalSearchConfig,
    pub vector_api: VectorApiConfig,
    pub features: FeatureFlags,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let engine_dir = PathBuf::from("./.synapse");
        let memory_dir = engine_dir.join("../workspace/memory");
        let archive_dir = memory_dir.join("archive");
        Self {
            engine_dir,
            memory_dir,
            archive_dir,
            ltd: LtdConfig::default(),
            observer: ObserverConfig::default(),
            keywords: KeywordConfig::default(),
            local_search: LocalSearchConfig::default(),
            vector_api: VectorApiConfig::default(),
            features: FeatureFlags::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, target: &mut T) {
    if let Ok(val) = env::var(key) {
        if let Ok(parsed) = val.parse() {
            *target = parsed;
        }
    }
}

fn env_bool(key: &str, target: &mut bool) {
    if let Ok(val) = env::var(key) {
        let val = val.to_lowercase();
        *target = val == "true" || val == "1" || val == "yes";
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(home) = env::var("SYNAPSE_HOME") {
            config.engine_dir = PathBuf::from(home);
            config.memory_dir = config.engine_dir.join("../workspace/memory");
            config.archive_dir = config.memory_dir.join("archive");
        }
        if let Ok(dir) = env::var("SYNAPSE_MEMORY_DIR") {
            config.memory_dir = PathBuf::from(dir);
            config.archive_dir = config.memory_dir.join("archive");
        }

        env_parse("SYNAPSE_DECAY_RATE", &mut config.ltd.decay_rate);
        env_parse("SYNAPSE_FORGET_THRESHOLD", &mut config.ltd.forget_threshold);
        env_parse("SYNAPSE_REVIVED_WEIGHT", &mut config.ltd.revived_weight);
        env_parse("SYNAPSE_INITIAL_WEIGHT", &mut config.ltd.initial_weight);
        env_parse("SYNAPSE_MEMORIZE_WEIGHT", &mut config.ltd.memorize_weight);

        env_parse(
            "SYNAPSE_MIN_OBSERVATIONS",
            &mut config.observer.min_observations_for_instinct,
        );

        env_parse("SYNAPSE_MIN_WORD_LENGTH", &mut config.keywords.min_word_length);
        env_parse(
            "SYNAPSE_LOCAL_SEARCH_BUDGET_MS",
            &mut config.local_search.max_execution_time_ms,
        );
        env_parse("SYNAPSE_VECTOR_TIMEOUT_MS", &mut config.vector_api.timeout_ms);
        env_parse(
            "SYNAPSE_VECTOR_RACE_TIMEOUT_MS",
            &mut config.vector_api.race_timeout_ms,
        );
        env_parse("SYNAPSE_VECTOR_MAX_RESULTS", &mut config.vector_api.max_results);
        env_parse("SYNAPSE_CHUNK_SIZE", &mut config.vector_api.chunk_size);

        env_bool(
            "SYNAPSE_ENABLE_VECTOR_SEARCH",
            &mut config.features.enable_vector_search,
        );
        env_bool("SYNAPSE_ENABLE_OBSERVER", &mut config.features.enable_observer);
        env_bool(
            "SYNAPSE_ENABLE_AUTO_DISTILL",
            &mut config.features.enable_auto_distill,
        );

        // Decay must stay multiplicative-contractive or LTD never forgets
        config.ltd.decay_rate = config.ltd.decay_rate.clamp(0.1, 0.999);

        config
    }

    // === Filesystem layout (relative to engine_dir) ===

    pub fn hot_weights_path(&self) -> PathBuf {
        self.engine_dir.join("synapse_weights.json")
    }

    pub fn latent_weights_path(&self) -> PathBuf {
        self.engine_dir.join("latent_weights.json")
    }

    pub fn observations_path(&self) -> PathBuf {
        self.engine_dir.join("observations.jsonl")
    }

    pub fn index_cache_path(&self) -> PathBuf {
        self.engine_dir.join("local_index_cache.json")
    }

    pub fn vector_cache_path(&self) -> PathBuf {
        self.engine_dir.join("vector_cache.json")
    }

    pub fn vector_meta_path(&self) -> PathBuf {
        self.engine_dir.join("vector_meta.json")
    }

    pub fn instincts_dir(&self) -> PathBuf {
        self.engine_dir.join("instincts")
    }

    /// Log the current configuration
    pub fn log(&self) {
        info!("Configuration:");
        info!("   Engine dir: {:?}", self.engine_dir);
        info!("   Memory dir: {:?}", self.memory_dir);
        info!(
            "   LTD: decay {:.2}, forget < {:.2}, revive at {:.2}",
            self.ltd.decay_rate, self.ltd.forget_threshold, self.ltd.revived_weight
        );
        info!(
            "   Budgets: local {} ms, vector race {} ms",
            self.local_search.max_execution_time_ms, self.vector_api.race_timeout_ms
        );
        info!(
            "   Features: vector={} observer={} auto-distill={}",
            self.features.enable_vector_search,
            self.features.enable_observer,
            self.features.enable_auto_distill
        );
    }
}
