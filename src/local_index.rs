//! Local inverted index over the daily logs
//!
//! An incremental, mtime-keyed word→file index with a strict execution
//! budget. The cache file survives across invocations; only files whose
//! mtime changed are re-extracted. Queries run under a hard deadline
//! (default 100 ms): on expiry the caller gets an empty result set plus
//! the elapsed time, and the engine stays alive.
//!
//! Word extraction here is for *retrieval keys*, not content words: CJK
//! runs are indexed both whole and per-ideograph so short CJK queries can
//! score per character. The tokenizer (weight store) has different rules;
//! the two are intentionally separate.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::constants::SEARCH_MAX_RESULTS;

/// Per-file cache entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedFile {
    pub mtime: i64,
    pub path: String,
    pub words: Vec<String>,
}

/// On-disk cache shape (`local_index_cache.json`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexCache {
    #[serde(rename = "lastBuildTime", default)]
    pub last_build_time: i64,
    #[serde(default)]
    pub files: BTreeMap<String, CachedFile>,
}

/// One ranked match
#[derive(Debug, Clone, Serialize)]
pub struct LocalHit {
    pub file: String,
    pub score: i64,
    pub snippet: String,
}

/// Search outcome, including budget accounting
#[derive(Debug, Clone, Default)]
pub struct LocalSearchOutcome {
    pub results: Vec<LocalHit>,
    pub elapsed_ms: u64,
    pub timed_out: bool,
}

struct IndexState {
    cache: IndexCache,
    inverted: HashMap<String, BTreeSet<String>>,
}

/// Incremental inverted index (C2)
pub struct LocalIndex {
    cache_path: PathBuf,
    memory_dir: PathBuf,
    archive_dir: PathBuf,
    budget_ms: u64,
    alpha_pattern: Regex,
    alnum_pattern: Regex,
    cjk_pattern: Regex,
    state: RwLock<Option<IndexState>>,
}

fn mtime_ms(path: &Path) -> Option<i64> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    let since_epoch = modified.duration_since(std::time::UNIX_EPOCH).ok()?;
    Some(since_epoch.as_millis() as i64)
}

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fa5}').contains(&c)
}

impl LocalIndex {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            cache_path: config.index_cache_path(),
            memory_dir: config.memory_dir.clone(),
            archive_dir: config.archive_dir.clone(),
            budget_ms: config.local_search.max_execution_time_ms,
            // Letter runs and alphanumeric runs are scanned separately:
            // "cache2" must yield both "cache" and "cache2"
            alpha_pattern: Regex::new(r"[A-Za-z]{2,}").expect("alpha pattern is valid"),
            alnum_pattern: Regex::new(r"[A-Za-z0-9]{2,}").expect("alnum pattern is valid"),
            cjk_pattern: Regex::new(r"[\u{4e00}-\u{9fa5}]{2,}").expect("cjk pattern is valid"),
            state: RwLock::new(None),
        }
    }

    /// Extract retrieval keys from file content: whole runs plus every
    /// single ideograph inside CJK runs, lowercased.
    pub fn extract_index_words(&self, content: &str) -> BTreeSet<String> {
        let mut words = BTreeSet::new();
        for pattern in [&self.alpha_pattern, &self.alnum_pattern] {
            for m in pattern.find_iter(content) {
                words.insert(m.as_str().to_lowercase());
            }
        }
        for m in self.cjk_pattern.find_iter(content) {
            words.insert(m.as_str().to_string());
            for c in m.as_str().chars() {
                words.insert(c.to_string());
            }
        }
        words
    }

    /// Run one bounded search: CPU and I/O happen on a blocking thread,
    /// raced against the configured budget.
    pub async fn search_bounded(
        self: Arc<Self>,
        queries: Vec<String>,
        original_query: String,
    ) -> LocalSearchOutcome {
        let started = Instant::now();
        let this = Arc::clone(&self);
        let work =
            tokio::task::spawn_blocking(move || this.search_sync(&queries, &original_query));

        match tokio::time::timeout(Duration::from_millis(self.budget_ms), work).await {
            Ok(Ok(results)) => LocalSearchOutcome {
                results,
                elapsed_ms: started.elapsed().as_millis() as u64,
                timed_out: false,
            },
            Ok(Err(e)) => {
                warn!("local search task failed: {e}");
                LocalSearchOutcome {
                    results: Vec::new(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    timed_out: false,
                }
            }
            Err(_) => {
                debug!("local search exceeded {} ms budget", self.budget_ms);
                LocalSearchOutcome {
                    results: Vec::new(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    timed_out: true,
                }
            }
        }
    }

    /// Synchronous search over the expanded query set.
    ///
    /// Scores are aggregated per query; across expansions the first query
    /// to surface a file wins (spreading terms refine, never override).
    pub fn search_sync(&self, queries: &[String], original_query: &str) -> Vec<LocalHit> {
        self.ensure_fresh();

        let state = self.state.read();
        let Some(state) = state.as_ref() else {
            return Vec::new();
        };

        let mut merged: HashMap<String, i64> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for query in queries {
            for (file, score) in self.score_one_query(state, query) {
                if !merged.contains_key(&file) {
                    merged.insert(file.clone(), score);
                    order.push(file);
                }
            }
        }

        let mut ranked: Vec<(String, i64)> = order
            .into_iter()
            .map(|f| {
                let score = merged[&f];
                (f, score)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(SEARCH_MAX_RESULTS);

        ranked
            .into_iter()
            .map(|(path, score)| LocalHit {
                snippet: self.extract_snippet(&path, original_query),
                file: self.relative_display(&path),
                score,
            })
            .collect()
    }

    fn score_one_query(&self, state: &IndexState, query: &str) -> Vec<(String, i64)> {
        let q = query.to_lowercase();
        if q.is_empty() {
            return Vec::new();
        }
        let mut scores: HashMap<String, i64> = HashMap::new();

        if q.chars().any(is_cjk) {
            // Exact query as an index key is a strong signal
            if let Some(files) = state.inverted.get(&q) {
                for f in files {
                    *scores.entry(f.clone()).or_insert(0) += 10;
                }
            }
            // Per-ideograph scoring covers partial CJK matches
            for c in q.chars().filter(|c| is_cjk(*c)) {
                if let Some(files) = state.inverted.get(&c.to_string()) {
                    for f in files {
                        *scores.entry(f.clone()).or_insert(0) += 1;
                    }
                }
            }
        } else {
            for token in q.split(|c: char| !c.is_alphanumeric()) {
                if token.len() <= 2 {
                    continue;
                }
                if let Some(files) = state.inverted.get(token) {
                    for f in files {
                        *scores.entry(f.clone()).or_insert(0) += 1;
                    }
                }
            }
        }

        let mut ranked: Vec<(String, i64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }

    /// The line of the first match plus its neighbours; the head of the
    /// file when only spreading terms hit; an in-band note on failure.
    fn extract_snippet(&self, path: &str, original_query: &str) -> String {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => return format!("snippet unavailable: {e}"),
        };
        let lines: Vec<&str> = content.lines().collect();
        let needle = original_query.to_lowercase();

        let hit = if needle.is_empty() {
            None
        } else {
            lines.iter().position(|l| l.to_lowercase().contains(&needle))
        };

        match hit {
            Some(i) => {
                let start = i.saturating_sub(1);
                let end = (i + 2).min(lines.len());
                lines[start..end].join("\n")
            }
            None => lines.iter().take(3).cloned().collect::<Vec<_>>().join("\n"),
        }
    }

    fn relative_display(&self, path: &str) -> String {
        let p = Path::new(path);
        self.memory_dir
            .parent()
            .and_then(|workspace| p.strip_prefix(workspace).ok())
            .map(|rel| rel.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string())
    }

    // =========================================================================
    // INCREMENTAL BUILD
    // =========================================================================

    /// Load the cache, re-extract changed files, rebuild the in-memory
    /// inverted index. Cheap when nothing changed.
    pub fn ensure_fresh(&self) {
        let mut state = self.state.write();

        let mut cache: IndexCache = match state.take() {
            Some(s) => s.cache,
            None => self.load_cache(),
        };

        let mut dirty = false;
        let mut live_names: BTreeSet<String> = BTreeSet::new();

        for dir in [&self.memory_dir, &self.archive_dir] {
            let Ok(entries) = fs::read_dir(dir) else {
                continue;
            };
            for entry in entries.filter_map(|e| e.ok()) {
                let path = entry.path();
                if path.extension().map(|e| e != "md").unwrap_or(true) {
                    continue;
                }
                let name = match path.file_name() {
                    Some(n) => n.to_string_lossy().into_owned(),
                    None => continue,
                };
                // Archive and live dirs may briefly hold the same name
                // mid-promotion; key archive entries distinctly.
                let key = if dir == &self.archive_dir {
                    format!("archive/{name}")
                } else {
                    name
                };
                live_names.insert(key.clone());

                let mtime = mtime_ms(&path).unwrap_or(0);
                let needs_rebuild = cache
                    .files
                    .get(&key)
                    .map(|c| c.mtime != mtime)
                    .unwrap_or(true);
                if needs_rebuild {
                    match fs::read_to_string(&path) {
                        Ok(content) => {
                            let words = self.extract_index_words(&content);
                            cache.files.insert(
                                key,
                                CachedFile {
                                    mtime,
                                    path: path.to_string_lossy().into_owned(),
                                    words: words.into_iter().collect(),
                                },
                            );
                            dirty = true;
                        }
                        Err(e) => {
                            warn!("cannot index {}: {e}", path.display());
                        }
                    }
                }
            }
        }

        let removed: Vec<String> = cache
            .files
            .keys()
            .filter(|k| !live_names.contains(*k))
            .cloned()
            .collect();
        for key in removed {
            cache.files.remove(&key);
            dirty = true;
        }

        if dirty {
            cache.last_build_time = crate::store::now_ms();
            self.save_cache(&cache);
        }

        let mut inverted: HashMap<String, BTreeSet<String>> = HashMap::new();
        for cached in cache.files.values() {
            for word in &cached.words {
                inverted
                    .entry(word.clone())
                    .or_default()
                    .insert(cached.path.clone());
            }
        }

        *state = Some(IndexState { cache, inverted });
    }

    fn load_cache(&self) -> IndexCache {
        match fs::read_to_string(&self.cache_path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("corrupt index cache: {e}; rebuilding from scratch");
                IndexCache::default()
            }),
            Err(_) => IndexCache::default(),
        }
    }

    fn save_cache(&self, cache: &IndexCache) {
        if let Some(parent) = self.cache_path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(cache) {
            Ok(json) => {
                if let Err(e) = fs::write(&self.cache_path, json) {
                    warn!("cannot write index cache: {e}");
                }
            }
            Err(e) => warn!("cannot serialize index cache: {e}"),
        }
    }
}
