//! Recall pipeline: activation, retrieval race, re-ranking
//!
//! The hot path. Direct activation and the LTP commit happen *before* the
//! external search launches, so recall counts reflect the attempt even if
//! every search times out. Retrieval is a race: the local inverted index
//! under its own 100 ms budget against the vector path under a 3 s
//! deadline. The vector result wins only when it arrives in time,
//! succeeds, and is non-empty; everything else falls back to local
//! results with dynamic keyword re-ranking.
//!
//! Recall never fails wholesale. Empty results are a valid response.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::constants::{KEYWORD_DECAY_FACTOR, NEUTRAL_SIMILARITY, SPREADING_TOP_N};
use crate::embeddings::{VectorIndex, VectorSearchOutcome};
use crate::local_index::{LocalHit, LocalIndex};
use crate::observer::{ObservationType, Observer};
use crate::store::{now_ms, DeepRecallResult, PinnedRule, SynapseStore};

/// How the vector half of the race ended
enum VectorRace {
    Disabled,
    TimedOut,
    Done(VectorSearchOutcome),
}

/// Options for one recall invocation
#[derive(Debug, Clone)]
pub struct RecallOptions {
    pub deep: bool,
    pub revive_limit: usize,
}

impl Default for RecallOptions {
    fn default() -> Self {
        Self {
            deep: false,
            revive_limit: crate::constants::DEEP_RECALL_LIMIT,
        }
    }
}

/// One entry of the merged result list. Local hits carry `score` and
/// `content`; vector hits carry `similarity` and `preview`.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    #[serde(rename = "finalScore", skip_serializing_if = "Option::is_none")]
    pub final_score: Option<f64>,
}

/// Stable recall response shape
#[derive(Debug, Serialize)]
pub struct RecallResponse {
    pub source: String,
    pub activated_concepts: Vec<String>,
    pub pinned_rules: Vec<PinnedRule>,
    pub search_results: Vec<SearchResult>,
    pub weights_snapshot: Vec<serde_json::Value>,
    pub scoring_mode: String,
    pub is_fast_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deep_recall: Option<DeepRecallResult>,
}

/// Run one recall.
pub async fn recall(
    config: &EngineConfig,
    store: &mut SynapseStore,
    index: &Arc<LocalIndex>,
    vector: Option<&VectorIndex>,
    observer: &Observer,
    query: &str,
    options: RecallOptions,
) -> RecallResponse {
    // Direct activation + LTP
    let activated = store.direct_activation(query);
    for concept in &activated {
        store.reinforce_on_recall(concept);
    }

    // Hebbian expansion
    let hebbian_terms = store.spreading_activation(query, SPREADING_TOP_N);
    let mut expanded: Vec<String> = vec![query.to_string()];
    expanded.extend(hebbian_terms);

    // Commit LTP before any external search begins
    if let Err(e) = store.persist() {
        warn!("LTP commit failed: {e}; recall continues on prior state");
    }

    // The race: bounded local search vs deadline-bounded vector search
    let race_deadline = Duration::from_millis(config.vector_api.race_timeout_ms);
    let local_fut = Arc::clone(index).search_bounded(expanded.clone(), query.to_string());
    let vector_fut = async {
        match vector {
            Some(v) if config.features.enable_vector_search => {
                match timeout(race_deadline, v.search(query)).await {
                    Ok(outcome) => VectorRace::Done(outcome),
                    Err(_) => {
                        debug!("vector search missed the {race_deadline:?} deadline");
                        VectorRace::TimedOut
                    }
                }
            }
            _ => VectorRace::Disabled,
        }
    };
    let (local_outcome, vector_race) = tokio::join!(local_fut, vector_fut);

    // Merge: vector wins only when timely, successful, and non-empty
    let (mut source, scoring_mode, is_fast_mode, search_results) = match vector_race {
        VectorRace::Done(outcome) if outcome.ok && !outcome.results.is_empty() => {
            let results = outcome
                .results
                .into_iter()
                .map(|hit| SearchResult {
                    file: hit.file,
                    score: None,
                    similarity: Some(hit.similarity),
                    content: None,
                    preview: Some(hit.preview),
                    final_score: None,
                })
                .collect();
            (
                "silicon-embed".to_string(),
                "similarity".to_string(),
                false,
                results,
            )
        }
        other => {
            let timed_out = matches!(other, VectorRace::TimedOut) || local_outcome.timed_out;
            let results = rerank_local(store, &expanded, &local_outcome.results, config);
            (
                "local-file-search".to_string(),
                "dynamic_rerank".to_string(),
                timed_out,
                results,
            )
        }
    };

    // Deep recall revives latent concepts into the hot store
    let deep_recall_result = if options.deep {
        let result = store.deep_recall(&expanded, options.revive_limit);
        if let Err(e) = store.persist() {
            warn!("persist after deep recall failed: {e}");
        }
        source = format!("{source} + deep_recall");
        Some(result)
    } else {
        None
    };

    // Pinned rules with substring overlap, plus any instincts serialised
    // to the instincts directory by external tooling
    let mut pinned_rules = store.matching_pinned_rules(query);
    for rule in load_instinct_context(config, query) {
        if !pinned_rules.iter().any(|p| p.keyword == rule.keyword) {
            pinned_rules.push(rule);
        }
    }

    // Weights snapshot of whatever activated
    let weights_snapshot = activated
        .iter()
        .filter_map(|concept| {
            store.get(concept).map(|record| {
                let mut entry = serde_json::Map::new();
                entry.insert(concept.clone(), json!(record.weight));
                serde_json::Value::Object(entry)
            })
        })
        .collect();

    // Fire-and-forget workflow observation
    if config.features.enable_observer {
        let observer = observer.clone();
        let context = query.to_string();
        tokio::spawn(async move {
            observer.record(ObservationType::Workflow, json!({ "context": context }));
        });
    }

    RecallResponse {
        source,
        activated_concepts: activated,
        pinned_rules,
        search_results,
        weights_snapshot,
        scoring_mode,
        is_fast_mode,
        deep_recall: deep_recall_result,
    }
}

/// Opportunistic context from the instincts directory: one JSON file per
/// instinct (`{id, trigger, action, ...}`). A missing or unreadable
/// directory is simply no context.
fn load_instinct_context(config: &EngineConfig, query: &str) -> Vec<PinnedRule> {
    let q = query.to_lowercase();
    if q.is_empty() {
        return Vec::new();
    }
    let Ok(entries) = std::fs::read_dir(config.instincts_dir()) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
        .filter_map(|e| std::fs::read_to_string(e.path()).ok())
        .filter_map(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
        .filter_map(|value| {
            let id = value.get("id")?.as_str()?.to_string();
            let action = value.get("action")?.as_str()?.to_string();
            Some(PinnedRule {
                keyword: id,
                rule: action,
            })
        })
        .filter(|rule| {
            let k = rule.keyword.to_lowercase();
            k.contains(&q) || q.contains(&k)
        })
        .collect()
}

/// Dynamic keyword re-ranking for local result sets.
///
/// Each result takes the maximum dynamic weight over the query-derived
/// terms that occur in its content or filename:
/// `min(1 + ln(count+1) / (1 + 0.1 × days_idle), 2.0)`, scaled by the
/// neutral similarity local hits carry.
fn rerank_local(
    store: &SynapseStore,
    terms: &[String],
    hits: &[LocalHit],
    config: &EngineConfig,
) -> Vec<SearchResult> {
    let now = now_ms();
    let cap = config.keywords.max_weight_multiplier.max(1.0);

    let mut results: Vec<SearchResult> = hits
        .iter()
        .map(|hit| {
            let haystack = format!(
                "{}\n{}",
                hit.file.to_lowercase(),
                hit.snippet.to_lowercase()
            );
            let dynamic_weight = terms
                .iter()
                .filter(|t| !t.is_empty() && haystack.contains(&t.to_lowercase()))
                .filter_map(|t| store.get(t))
                .map(|record| {
                    let days_idle = ((now - record.last_seen).max(0)) as f64 / 86_400_000.0;
                    let raw = 1.0
                        + ((record.count + 1) as f64).ln()
                            / (1.0 + KEYWORD_DECAY_FACTOR * days_idle);
                    raw.min(cap)
                })
                .fold(1.0f64, f64::max);

            SearchResult {
                file: hit.file.clone(),
                score: Some(hit.score),
                similarity: None,
                content: Some(hit.snippet.clone()),
                preview: None,
                final_score: Some(NEUTRAL_SIMILARITY * dynamic_weight),
            }
        })
        .collect();

    results.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results
}
