//! Distillation pipeline: daily logs → weighted concepts
//!
//! The batch pass. Consumes un-distilled daily logs, reinforces every
//! extracted term, wires co-occurrence links, applies the decay passes,
//! archives the consumed logs, and hands today's file to the vector
//! indexer. Step order is a contract and is never re-ordered:
//! reinforcement → predictive LTD → link construction → LTD decay →
//! persistence.
//!
//! Every step is lenient: a log that cannot be read is skipped, a rename
//! that fails leaves the log in place, a missing embedder skips indexing.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;

use chrono::Local;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::constants::{SPECIAL_CONCEPT_PATTERN, SPECIAL_LINE_MAX_CHARS};
use crate::embeddings::VectorIndex;
use crate::observer::Observer;
use crate::store::SynapseStore;
use crate::tokenizer::Tokenizer;

/// Human-readable distillation outcome
#[derive(Debug, Default)]
pub struct DistillSummary {
    pub logs_processed: usize,
    pub terms_seen: usize,
    pub active_concepts: usize,
    pub instincts_created: usize,
}

impl fmt::Display for DistillSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "distilled {} logs, {} term observations, {} active concepts",
            self.logs_processed, self.terms_seen, self.active_concepts
        )?;
        if self.instincts_created > 0 {
            write!(f, ", {} new instincts", self.instincts_created)?;
        }
        Ok(())
    }
}

/// Strip list markers and take the head of a special-concept line as a
/// concept key.
fn special_line_key(line: &str) -> String {
    line.trim_start_matches(['-', '*', '#', ' ', '\t'])
        .trim_end()
        .chars()
        .take(SPECIAL_LINE_MAX_CHARS)
        .collect::<String>()
        .to_lowercase()
}

/// Run one distillation pass.
///
/// Normal mode skips today's log (it is still being written); force mode
/// includes it.
pub async fn distill(
    config: &EngineConfig,
    store: &mut SynapseStore,
    observer: &Observer,
    tokenizer: &Tokenizer,
    vector: Option<&VectorIndex>,
    force: bool,
) -> DistillSummary {
    let mut summary = DistillSummary::default();

    // 1. Observer batch promotion; never fatal
    if config.features.enable_observer {
        let outcome = observer.batch_analyze(store);
        summary.instincts_created = outcome.instincts_created;
    }

    // 2. Enumerate un-distilled daily logs
    let daily_pattern = Regex::new(r"^\d{4}-\d{2}-\d{2}\.md$").expect("daily pattern is valid");
    let today_name = format!("{}.md", Local::now().format("%Y-%m-%d"));

    let mut logs: Vec<String> = match fs::read_dir(&config.memory_dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| daily_pattern.is_match(name))
            .filter(|name| force || *name != today_name)
            .collect(),
        Err(e) => {
            debug!("memory dir unreadable ({e}); nothing to distill");
            Vec::new()
        }
    };
    logs.sort();

    // 3. Term extraction and reinforcement
    let special_pattern =
        Regex::new(SPECIAL_CONCEPT_PATTERN).expect("special concept pattern is valid");
    let mut file_terms: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut touched: BTreeSet<String> = BTreeSet::new();
    let mut processed: Vec<String> = Vec::new();

    for name in &logs {
        let path = config.memory_dir.join(name);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                warn!("cannot read {name}: {e}; skipping");
                continue;
            }
        };

        let terms = tokenizer.extract(&content);
        let mut concepts = terms.clone();
        for term in &terms {
            store.reinforce_on_observation(term, name, false);
            touched.insert(term.clone());
            summary.terms_seen += 1;
        }
        for line in content.lines() {
            if special_pattern.is_match(line) {
                let key = special_line_key(line);
                if !key.is_empty() {
                    store.reinforce_on_observation(&key, name, true);
                    touched.insert(key.clone());
                    concepts.push(key);
                    summary.terms_seen += 1;
                }
            }
        }

        file_terms.insert(name.clone(), concepts);
        processed.push(name.clone());
    }
    summary.logs_processed = processed.len();

    // 4. Archive the consumed logs; a failed rename leaves the log live
    if !processed.is_empty() {
        if let Err(e) = fs::create_dir_all(&config.archive_dir) {
            warn!("cannot create archive dir: {e}");
        }
        for name in &processed {
            let from = config.memory_dir.join(name);
            let to = config.archive_dir.join(name);
            if let Err(e) = fs::rename(&from, &to) {
                warn!("archive of {name} failed: {e}; leaving in place");
            }
        }
    }

    // 5–7. Decay passes around link construction, in contract order
    store.predictive_ltd();
    store.build_hebbian_links(&file_terms);
    store.apply_ltd_sparing(&touched);

    // 8. Persist; lock contention drops the write and keeps prior state
    if let Err(e) = store.persist() {
        warn!("persist after distill failed: {e}");
    }
    summary.active_concepts = store.hot_len();

    // 9. Incremental vector indexing of today's live log
    if config.features.enable_vector_search {
        if let Some(vector) = vector {
            let today_path = config.memory_dir.join(&today_name);
            if today_path.exists() {
                if let Err(e) = vector.incremental_index(&today_path).await {
                    warn!("vector indexing of {today_name} failed: {e}");
                }
            }
        }
    }

    info!("{summary}");
    summary
}
