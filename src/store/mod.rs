//! Synapse store: hot and latent weight maps
//!
//! Owns every mutation of concept weights. Concepts are reinforced during
//! distillation (observation) and recall (LTP), linked by co-occurrence
//! (Hebbian), decayed each distillation (LTD), demoted to the latent store
//! when they fall below the forget threshold, and revived by deep recall.
//!
//! Persistence is two pretty-printed JSON files guarded by the
//! cross-process sentinel lock. A corrupt file is treated as empty on load
//! and repaired by the next successful write; the store never refuses to
//! start.

pub mod lock;
pub mod types;

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, LtdConfig};
use crate::constants::*;

pub use types::{
    now_ms, ArchiveContext, DeepRecallResult, Instinct, LatentStats, LatentSynapse, PinnedRule,
    Synapse, TopConcept,
};

/// The owned store value: hot map, latent map, layout, tunables.
///
/// The CLI constructs exactly one per invocation and passes it by
/// reference; there is no shared global state.
pub struct SynapseStore {
    engine_dir: PathBuf,
    archive_dir: PathBuf,
    ltd: LtdConfig,
    hot: BTreeMap<String, Synapse>,
    cold: BTreeMap<String, LatentSynapse>,
}

fn load_leniently<T: DeserializeOwned + Default>(path: &PathBuf) -> T {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            warn!("cannot read {}: {e}; starting empty", path.display());
            return T::default();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(
                "corrupt state in {}: {e}; starting empty, next write repairs it",
                path.display()
            );
            T::default()
        }
    }
}

fn write_pretty<T: Serialize>(path: &PathBuf, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

impl SynapseStore {
    /// Load both stores from the engine directory. Never fails: missing or
    /// corrupt files come up empty.
    pub fn open(config: &EngineConfig) -> Self {
        let hot = load_leniently(&config.hot_weights_path());
        let cold = load_leniently(&config.latent_weights_path());
        Self {
            engine_dir: config.engine_dir.clone(),
            archive_dir: config.archive_dir.clone(),
            ltd: config.ltd.clone(),
            hot,
            cold,
        }
    }

    /// Write both stores under the advisory lock.
    ///
    /// Lock contention drops the write (the prior persisted state stands)
    /// and surfaces as an error for the caller to log.
    pub fn persist(&self) -> Result<()> {
        fs::create_dir_all(&self.engine_dir)
            .with_context(|| format!("creating {}", self.engine_dir.display()))?;
        let _guard = lock::acquire(&self.engine_dir)?;
        write_pretty(&self.engine_dir.join("synapse_weights.json"), &self.hot)?;
        write_pretty(&self.engine_dir.join("latent_weights.json"), &self.cold)?;
        debug!(
            "persisted {} hot / {} latent concepts",
            self.hot.len(),
            self.cold.len()
        );
        Ok(())
    }

    // =========================================================================
    // REINFORCEMENT (LTP)
    // =========================================================================

    /// Distill-time reinforcement: create or update the hot record for a
    /// term observed in `source_file`. Special-concept lines get an extra
    /// weight boost on top of their base.
    pub fn reinforce_on_observation(&mut self, term: &str, source_file: &str, special: bool) {
        let now = now_ms();
        let key = term.to_lowercase();

        // Disjointness: a concept re-observed while latent comes back hot.
        if let Some(latent) = self.cold.remove(&key) {
            let mut record = latent.record;
            record.weight = self.ltd.initial_weight;
            self.hot.insert(key.clone(), record);
        }

        let initial = self.ltd.initial_weight;
        let entry = self
            .hot
            .entry(key)
            .or_insert_with(|| Synapse::organic(initial, now));
        entry.count += 1;
        entry.last_seen = now;
        entry.last_access = now;
        entry.add_ref(source_file);
        if special {
            entry.weight += SPECIAL_LINE_BOOST;
        }
    }

    /// Recall-time LTP: surfacing a concept strengthens it and bumps its
    /// recall counter. `first_seen` is never touched.
    pub fn reinforce_on_recall(&mut self, term: &str) {
        if let Some(record) = self.hot.get_mut(&term.to_lowercase()) {
            record.last_access = now_ms();
            record.weight += RECALL_LTP_BOOST;
            record.recall_count += 1;
        }
    }

    // =========================================================================
    // HEBBIAN LINKAGE
    // =========================================================================

    /// Wire every unordered pair of terms co-occurring in a file, mirrored
    /// in both records. Terms missing from the hot store are seeded at the
    /// Hebbian seed weight with empty linkage.
    pub fn build_hebbian_links(&mut self, file_terms: &BTreeMap<String, Vec<String>>) {
        let now = now_ms();
        for terms in file_terms.values() {
            for i in 0..terms.len() {
                for j in (i + 1)..terms.len() {
                    let a = terms[i].to_lowercase();
                    let b = terms[j].to_lowercase();
                    if a == b {
                        continue;
                    }
                    self.link_pair(&a, &b, now);
                }
            }
        }
    }

    fn link_pair(&mut self, a: &str, b: &str, now: i64) {
        for key in [a, b] {
            self.hot
                .entry(key.to_string())
                .or_insert_with(|| Synapse::organic(HEBBIAN_SEED_WEIGHT, now));
        }
        if let Some(rec) = self.hot.get_mut(a) {
            *rec.synapses.entry(b.to_string()).or_insert(0) += 1;
        }
        if let Some(rec) = self.hot.get_mut(b) {
            *rec.synapses.entry(a.to_string()).or_insert(0) += 1;
        }
    }

    // =========================================================================
    // ACTIVATION
    // =========================================================================

    /// The strongest Hebbian partners of a term, for query expansion.
    /// Empty when the term is unknown.
    pub fn spreading_activation(&self, term: &str, top_n: usize) -> Vec<String> {
        let Some(record) = self.hot.get(&term.to_lowercase()) else {
            return Vec::new();
        };
        let mut partners: Vec<(&String, &u32)> = record.synapses.iter().collect();
        partners.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        partners
            .into_iter()
            .take(top_n)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Hot keys matching the query by substring in either direction,
    /// strongest first, capped at the activation limit.
    pub fn direct_activation(&self, query: &str) -> Vec<String> {
        let q = query.to_lowercase();
        if q.is_empty() {
            return Vec::new();
        }
        let mut matches: Vec<(&String, f64)> = self
            .hot
            .iter()
            .filter(|(k, _)| k.contains(&q) || q.contains(k.as_str()))
            .map(|(k, v)| (k, v.weight))
            .collect();
        matches.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        matches
            .into_iter()
            .take(DIRECT_ACTIVATION_LIMIT)
            .map(|(k, _)| k.clone())
            .collect()
    }

    // =========================================================================
    // DECAY (LTD)
    // =========================================================================

    /// Penalise concepts that recall keeps surfacing but observation never
    /// consolidates, then reset every recall counter for the next window.
    pub fn predictive_ltd(&mut self) {
        let mut penalised = 0usize;
        for record in self.hot.values_mut() {
            if !record.pinned
                && record.recall_count >= PREDICTIVE_LTD_MIN_RECALLS
                && (record.count as f64)
                    < PREDICTIVE_LTD_CONSOLIDATION_RATIO * record.recall_count as f64
            {
                record.weight =
                    (record.weight - PREDICTIVE_LTD_PENALTY_RATE * record.recall_count as f64)
                        .max(0.0);
                penalised += 1;
            }
            record.recall_count = 0;
        }
        if penalised > 0 {
            debug!("predictive LTD penalised {penalised} concepts");
        }
    }

    /// Multiplicative decay over every non-pinned record; anything below
    /// the forget threshold moves to the latent store with its post-decay
    /// weight preserved as `original_weight`.
    pub fn apply_ltd(&mut self) -> usize {
        self.apply_ltd_sparing(&std::collections::BTreeSet::new())
    }

    /// LTD variant that spares concepts reinforced in the current
    /// distillation pass. Decay targets neglect; a concept observed
    /// minutes ago was not neglected.
    pub fn apply_ltd_sparing(&mut self, freshly_reinforced: &std::collections::BTreeSet<String>) -> usize {
        let now = now_ms();
        let mut demoted = Vec::new();
        for (key, record) in self.hot.iter_mut() {
            if record.pinned || freshly_reinforced.contains(key) {
                continue;
            }
            record.weight *= self.ltd.decay_rate;
            if record.weight < self.ltd.forget_threshold {
                demoted.push(key.clone());
            }
        }
        for key in &demoted {
            if let Some(record) = self.hot.remove(key) {
                let original_weight = record.weight;
                self.cold.insert(
                    key.clone(),
                    LatentSynapse {
                        record,
                        archived_at: now,
                        original_weight,
                    },
                );
            }
        }
        if !demoted.is_empty() {
            info!("LTD demoted {} concepts to the latent store", demoted.len());
        }
        demoted.len()
    }

    // =========================================================================
    // DEEP RECALL
    // =========================================================================

    /// Search the latent store, revive the strongest matches into the hot
    /// store, and pull context lines from the newest archive files.
    pub fn deep_recall(&mut self, queries: &[String], limit: usize) -> DeepRecallResult {
        let original_query = queries.first().cloned().unwrap_or_default();

        let mut matched: Vec<(String, f64)> = self
            .cold
            .iter()
            .filter(|(key, _)| {
                queries.iter().any(|q| {
                    let q = q.to_lowercase();
                    !q.is_empty() && (key.contains(&q) || q.contains(key.as_str()))
                })
            })
            .map(|(key, latent)| (key.clone(), latent.original_weight))
            .collect();
        matched.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let now = now_ms();
        let mut revived = Vec::new();
        for (key, _) in matched.into_iter().take(limit) {
            if let Some(latent) = self.cold.remove(&key) {
                let mut record = latent.record;
                record.weight = self.ltd.revived_weight;
                record.last_access = now;
                record.revived_from = Some("latent".to_string());
                record.revived_at = Some(now);
                self.hot.insert(key.clone(), record);
                revived.push(key);
            }
        }

        let archive_context = self.scan_archive(&original_query);

        DeepRecallResult {
            source: "latent_archive".to_string(),
            query: original_query,
            revived_count: revived.len(),
            revived_memories: revived,
            archive_context,
            remaining_latent: self.cold.len(),
        }
    }

    /// Scan the first few archive files for lines containing the query.
    /// Any read failure skips the file; deep recall never raises.
    fn scan_archive(&self, query: &str) -> Vec<ArchiveContext> {
        let needle = query.to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        let mut names: Vec<PathBuf> = match fs::read_dir(&self.archive_dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "md"))
                .collect(),
            Err(_) => return Vec::new(),
        };
        names.sort();

        let mut context = Vec::new();
        for path in names.into_iter().take(ARCHIVE_SCAN_FILES) {
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            let lines: Vec<String> = content
                .lines()
                .filter(|line| line.to_lowercase().contains(&needle))
                .take(ARCHIVE_CONTEXT_LINES)
                .map(|line| line.trim().to_string())
                .collect();
            if !lines.is_empty() {
                let file = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                context.push(ArchiveContext { file, lines });
            }
        }
        context
    }

    // =========================================================================
    // PINNED RECORDS
    // =========================================================================

    /// Upsert a pinned rule. Pinned records never decay and never demote;
    /// pinning an existing concept keeps whatever weight it already earned.
    pub fn pin(&mut self, term: &str, rule: &str) {
        let now = now_ms();
        let key = term.to_lowercase();
        self.cold.remove(&key);
        let entry = self
            .hot
            .entry(key)
            .or_insert_with(|| Synapse::organic(PIN_FLOOR_WEIGHT, now));
        entry.pinned = true;
        entry.rule = Some(rule.to_string());
        entry.weight = entry.weight.max(PIN_FLOOR_WEIGHT);
        entry.last_access = now;
    }

    /// Explicit memory: bypasses extraction, inserts a pinned record at the
    /// configured memorize weight.
    pub fn memorize(&mut self, concept: &str, content: &str) {
        let now = now_ms();
        let key = concept.to_lowercase();
        self.cold.remove(&key);
        let weight = self.ltd.memorize_weight;
        let entry = self
            .hot
            .entry(key)
            .or_insert_with(|| Synapse::organic(weight, now));
        entry.pinned = true;
        entry.rule = Some(content.to_string());
        entry.source = Some("explicit_memorize".to_string());
        entry.weight = entry.weight.max(weight);
        entry.memorized_at = Some(now);
        entry.last_access = now;
    }

    /// Observer promotion: upsert an instinct as a pinned record keyed by
    /// its template id.
    pub fn promote_instinct(&mut self, instinct: Instinct) {
        let now = now_ms();
        let evidence_count = instinct.evidence.len() as u64;
        self.cold.remove(&instinct.id);
        let entry = self
            .hot
            .entry(instinct.id)
            .or_insert_with(|| Synapse::organic(PIN_FLOOR_WEIGHT, now));
        entry.pinned = true;
        entry.rule = Some(instinct.action);
        entry.trigger = Some(instinct.trigger);
        entry.domain = Some(instinct.domain);
        entry.source = Some("observer".to_string());
        entry.confidence = Some(instinct.confidence);
        entry.evidence = Some(instinct.evidence);
        entry.count = entry.count.max(evidence_count);
        entry.weight = entry.weight.max(PIN_FLOOR_WEIGHT);
        entry.last_access = now;
    }

    /// Pinned rules whose key overlaps the query by substring either way.
    pub fn matching_pinned_rules(&self, query: &str) -> Vec<PinnedRule> {
        let q = query.to_lowercase();
        self.hot
            .iter()
            .filter(|(_, v)| v.pinned)
            .filter(|(k, _)| !q.is_empty() && (k.contains(&q) || q.contains(k.as_str())))
            .filter_map(|(k, v)| {
                v.rule.as_ref().map(|rule| PinnedRule {
                    keyword: k.clone(),
                    rule: rule.clone(),
                })
            })
            .collect()
    }

    /// All pinned entries with their weights.
    pub fn pinned(&self) -> Vec<(String, String, f64)> {
        self.hot
            .iter()
            .filter(|(_, v)| v.pinned)
            .map(|(k, v)| (k.clone(), v.rule.clone().unwrap_or_default(), v.weight))
            .collect()
    }

    // =========================================================================
    // AGGREGATES
    // =========================================================================

    /// Top-N hot concepts by weight.
    pub fn top_concepts(&self, n: usize) -> Vec<TopConcept> {
        let mut all: Vec<TopConcept> = self
            .hot
            .iter()
            .map(|(k, v)| TopConcept {
                concept: k.clone(),
                weight: v.weight,
                count: v.count,
            })
            .collect();
        all.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));
        all.truncate(n);
        all
    }

    /// Aggregates over the latent store.
    pub fn latent_stats(&self) -> LatentStats {
        let now = now_ms();
        let mut oldest: Option<i64> = None;
        let mut newest: Option<i64> = None;
        let mut age_sum_days = 0.0;
        for latent in self.cold.values() {
            oldest = Some(oldest.map_or(latent.archived_at, |o: i64| o.min(latent.archived_at)));
            newest = Some(newest.map_or(latent.archived_at, |n: i64| n.max(latent.archived_at)));
            age_sum_days += (now - latent.archived_at) as f64 / 86_400_000.0;
        }
        let total = self.cold.len();
        let to_rfc3339 = |ms: i64| {
            chrono::DateTime::from_timestamp_millis(ms)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_default()
        };
        LatentStats {
            total_latent: total,
            oldest_archive: oldest.map(to_rfc3339),
            newest_archive: newest.map(to_rfc3339),
            average_age_days: if total > 0 {
                age_sum_days / total as f64
            } else {
                0.0
            },
        }
    }

    // === Read access for pipelines and tests ===

    pub fn get(&self, key: &str) -> Option<&Synapse> {
        self.hot.get(&key.to_lowercase())
    }

    pub fn get_latent(&self, key: &str) -> Option<&LatentSynapse> {
        self.cold.get(&key.to_lowercase())
    }

    pub fn hot_len(&self) -> usize {
        self.hot.len()
    }

    pub fn latent_len(&self) -> usize {
        self.cold.len()
    }

    pub fn hot_keys(&self) -> impl Iterator<Item = &String> {
        self.hot.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (SynapseStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut config = EngineConfig::default();
        config.engine_dir = dir.path().join("engine");
        config.memory_dir = dir.path().join("memory");
        config.archive_dir = config.memory_dir.join("archive");
        (SynapseStore::open(&config), dir)
    }

    #[test]
    fn test_first_observation_uses_initial_weight() {
        let (mut s, _dir) = store();
        s.reinforce_on_observation("database", "2025-01-01.md", false);
        let rec = s.get("database").unwrap();
        assert_eq!(rec.weight, 1.0);
        assert_eq!(rec.count, 1);
        assert_eq!(rec.refs, vec!["2025-01-01.md"]);
    }

    #[test]
    fn test_special_line_boost() {
        let (mut s, _dir) = store();
        s.reinforce_on_observation("important: retry on 429", "2025-01-01.md", true);
        assert_eq!(s.get("important: retry on 429").unwrap().weight, 1.5);
    }

    #[test]
    fn test_reinforce_preserves_first_seen() {
        let (mut s, _dir) = store();
        s.reinforce_on_observation("cache", "a.md", false);
        let first_seen = s.get("cache").unwrap().first_seen;
        s.reinforce_on_observation("cache", "b.md", false);
        s.reinforce_on_recall("cache");
        let rec = s.get("cache").unwrap();
        assert_eq!(rec.first_seen, first_seen);
        assert!(rec.first_seen <= rec.last_seen);
        assert!(rec.last_seen <= rec.last_access);
    }

    #[test]
    fn test_recall_ltp() {
        let (mut s, _dir) = store();
        s.reinforce_on_observation("redis", "a.md", false);
        s.reinforce_on_recall("redis");
        let rec = s.get("redis").unwrap();
        assert!((rec.weight - 1.1).abs() < 1e-9);
        assert_eq!(rec.recall_count, 1);
    }

    #[test]
    fn test_hebbian_links_are_symmetric() {
        let (mut s, _dir) = store();
        let mut file_terms = BTreeMap::new();
        file_terms.insert(
            "a.md".to_string(),
            vec!["memory".to_string(), "system".to_string(), "cache".to_string()],
        );
        s.build_hebbian_links(&file_terms);

        for (a, b) in [("memory", "system"), ("memory", "cache"), ("system", "cache")] {
            assert_eq!(s.get(a).unwrap().synapses.get(b), Some(&1));
            assert_eq!(s.get(b).unwrap().synapses.get(a), Some(&1));
        }
    }

    #[test]
    fn test_hebbian_seeds_missing_records_at_half_weight() {
        let (mut s, _dir) = store();
        let mut file_terms = BTreeMap::new();
        file_terms.insert("a.md".to_string(), vec!["left".to_string(), "right".to_string()]);
        s.build_hebbian_links(&file_terms);
        assert_eq!(s.get("left").unwrap().weight, 0.5);
    }

    #[test]
    fn test_spreading_activation_ranks_by_strength() {
        let (mut s, _dir) = store();
        let mut file_terms = BTreeMap::new();
        file_terms.insert("a.md".to_string(), vec!["hub".to_string(), "strong".to_string()]);
        file_terms.insert("b.md".to_string(), vec!["hub".to_string(), "strong".to_string()]);
        file_terms.insert("c.md".to_string(), vec!["hub".to_string(), "weak".to_string()]);
        s.build_hebbian_links(&file_terms);

        let partners = s.spreading_activation("hub", 3);
        assert_eq!(partners[0], "strong");
        assert!(partners.contains(&"weak".to_string()));
    }

    #[test]
    fn test_spreading_activation_unknown_term_is_empty() {
        let (s, _dir) = store();
        assert!(s.spreading_activation("ghost", 3).is_empty());
    }

    #[test]
    fn test_direct_activation_substring_both_ways() {
        let (mut s, _dir) = store();
        s.reinforce_on_observation("database", "a.md", false);
        s.reinforce_on_observation("data", "a.md", false);

        // key ⊆ query
        assert!(s.direct_activation("database migration").contains(&"database".to_string()));
        // query ⊆ key
        assert!(s.direct_activation("base").contains(&"database".to_string()));
    }

    #[test]
    fn test_predictive_ltd_penalises_unconsolidated() {
        let (mut s, _dir) = store();
        s.reinforce_on_observation("hype", "a.md", false); // count = 1
        for _ in 0..4 {
            s.reinforce_on_recall("hype"); // recall_count = 4
        }
        let before = s.get("hype").unwrap().weight;
        s.predictive_ltd();
        let rec = s.get("hype").unwrap();
        // count 1 < 0.5 * 4 → penalty 0.1 * 4
        assert!((rec.weight - (before - 0.4)).abs() < 1e-9);
        assert_eq!(rec.recall_count, 0);
    }

    #[test]
    fn test_predictive_ltd_spares_consolidated() {
        let (mut s, _dir) = store();
        for _ in 0..3 {
            s.reinforce_on_observation("solid", "a.md", false); // count = 3
        }
        for _ in 0..4 {
            s.reinforce_on_recall("solid");
        }
        let before = s.get("solid").unwrap().weight;
        s.predictive_ltd();
        let rec = s.get("solid").unwrap();
        assert_eq!(rec.weight, before);
        assert_eq!(rec.recall_count, 0);
    }

    #[test]
    fn test_predictive_ltd_never_goes_negative() {
        let (mut s, _dir) = store();
        s.reinforce_on_observation("tiny", "a.md", false);
        if let Some(rec) = s.hot.get_mut("tiny") {
            rec.weight = 0.1;
            rec.recall_count = 10;
            rec.count = 1;
        }
        s.predictive_ltd();
        assert_eq!(s.get("tiny").unwrap().weight, 0.0);
    }

    #[test]
    fn test_apply_ltd_demotes_below_threshold() {
        let (mut s, _dir) = store();
        s.reinforce_on_observation("fading", "a.md", false);
        if let Some(rec) = s.hot.get_mut("fading") {
            rec.weight = 0.5;
        }
        s.ltd.decay_rate = 0.5;
        s.ltd.forget_threshold = 0.3;
        let demoted = s.apply_ltd();
        assert_eq!(demoted, 1);
        assert!(s.get("fading").is_none());
        let latent = s.get_latent("fading").unwrap();
        assert!((latent.original_weight - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_pinned_exempt_from_ltd() {
        let (mut s, _dir) = store();
        s.pin("always", "never forget this");
        s.predictive_ltd();
        s.apply_ltd();
        let rec = s.get("always").unwrap();
        assert!(rec.pinned);
        assert!(rec.weight >= 1.0);
    }

    #[test]
    fn test_deep_recall_revives_strongest_first() {
        let (mut s, _dir) = store();
        for (key, ow) in [("quant-strategy", 0.1), ("quant-old", 0.05)] {
            let now = now_ms();
            s.cold.insert(
                key.to_string(),
                LatentSynapse {
                    record: Synapse::organic(ow, now),
                    archived_at: now,
                    original_weight: ow,
                },
            );
        }

        let result = s.deep_recall(&["quant".to_string()], 1);
        assert_eq!(result.revived_memories, vec!["quant-strategy"]);
        assert_eq!(result.remaining_latent, 1);

        let revived = s.get("quant-strategy").unwrap();
        assert_eq!(revived.weight, 0.5);
        assert_eq!(revived.revived_from.as_deref(), Some("latent"));
        assert!(s.get_latent("quant-strategy").is_none());
    }

    #[test]
    fn test_revival_preserves_first_seen_and_refs() {
        let (mut s, _dir) = store();
        s.reinforce_on_observation("keeper", "2025-01-01.md", false);
        if let Some(rec) = s.hot.get_mut("keeper") {
            rec.weight = 0.1;
        }
        let first_seen = s.get("keeper").unwrap().first_seen;
        s.apply_ltd();
        assert!(s.get("keeper").is_none());

        s.deep_recall(&["keeper".to_string()], 5);
        let rec = s.get("keeper").unwrap();
        assert_eq!(rec.first_seen, first_seen);
        assert_eq!(rec.refs, vec!["2025-01-01.md"]);
    }

    #[test]
    fn test_memorize_is_pinned_at_configured_weight() {
        let (mut s, _dir) = store();
        s.memorize("api-key-rotation", "rotate keys quarterly");
        let rec = s.get("api-key-rotation").unwrap();
        assert!(rec.pinned);
        assert_eq!(rec.weight, 2.5);
        assert_eq!(rec.source.as_deref(), Some("explicit_memorize"));
        assert!(rec.memorized_at.is_some());
    }

    #[test]
    fn test_pin_keeps_earned_weight() {
        let (mut s, _dir) = store();
        s.memorize("valued", "x");
        s.pin("valued", "updated rule");
        let rec = s.get("valued").unwrap();
        assert_eq!(rec.weight, 2.5, "pin must not shrink an earned weight");
        assert_eq!(rec.rule.as_deref(), Some("updated rule"));
    }

    #[test]
    fn test_matching_pinned_rules_by_overlap() {
        let (mut s, _dir) = store();
        s.pin("deploy", "always run smoke tests");
        s.pin("unrelated", "other rule");
        let rules = s.matching_pinned_rules("how do I deploy this");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].keyword, "deploy");
    }

    #[test]
    fn test_persist_and_reopen_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut config = EngineConfig::default();
        config.engine_dir = dir.path().join("engine");
        config.archive_dir = dir.path().join("memory/archive");

        let mut s = SynapseStore::open(&config);
        s.reinforce_on_observation("durable", "a.md", false);
        s.persist().unwrap();

        let reopened = SynapseStore::open(&config);
        assert_eq!(reopened.get("durable").unwrap().count, 1);
    }

    #[test]
    fn test_corrupt_hot_file_comes_up_empty() {
        let dir = TempDir::new().unwrap();
        let mut config = EngineConfig::default();
        config.engine_dir = dir.path().to_path_buf();
        config.archive_dir = dir.path().join("archive");
        fs::write(config.hot_weights_path(), "{ not json").unwrap();

        let s = SynapseStore::open(&config);
        assert_eq!(s.hot_len(), 0);
    }

    #[test]
    fn test_latent_stats() {
        let (mut s, _dir) = store();
        assert_eq!(s.latent_stats().total_latent, 0);

        let now = now_ms();
        s.cold.insert(
            "old".to_string(),
            LatentSynapse {
                record: Synapse::organic(0.1, now),
                archived_at: now - 86_400_000,
                original_weight: 0.1,
            },
        );
        let stats = s.latent_stats();
        assert_eq!(stats.total_latent, 1);
        assert!(stats.oldest_archive.is_some());
        assert!(stats.average_age_days > 0.9 && stats.average_age_days < 1.1);
    }
}
