//! Behavioural observer: append-only log, batch instinct promotion
//!
//! The write path is deliberately dumb and fast: one JSON line appended
//! per observation, errors swallowed. Intelligence lives in the batch
//! path, run at distill time: recurring patterns in the log are promoted
//! to pinned, non-decaying instincts in the synapse store, and the log is
//! truncated once promotion succeeds.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::constants::{
    CONFIDENCE_BUCKETS, CONFIDENCE_MAX, INSTINCT_MIN_GROUP, OBSERVATION_ID_SUFFIX_LEN,
};
use crate::store::{now_ms, Instinct, SynapseStore};

/// Observation categories recognised by the batch analyser
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationType {
    UserCorrection,
    ErrorResolution,
    Workflow,
    ToolPreference,
}

/// One record of the append-only observation log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub id: String,
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: ObservationType,
    #[serde(default)]
    pub data: Value,
}

/// Outcome of one batch analysis pass
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub observations_seen: usize,
    pub instincts_created: usize,
}

/// Observer handle (C5). Cheap to clone; the log file is the only state.
#[derive(Clone)]
pub struct Observer {
    log_path: PathBuf,
    min_observations: usize,
}

fn observation_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(OBSERVATION_ID_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("obs_{}_{}", now_ms(), suffix.to_lowercase())
}

/// Non-word runs collapse to single hyphens; instinct ids stay filesystem-
/// and shell-friendly.
fn sanitize_key(key: &str) -> String {
    let pattern = Regex::new(r"\W+").expect("sanitize pattern is valid");
    pattern
        .replace_all(key, "-")
        .trim_matches('-')
        .to_lowercase()
}

fn confidence_for(evidence_count: usize) -> f64 {
    for (limit, confidence) in CONFIDENCE_BUCKETS {
        if evidence_count <= limit {
            return confidence;
        }
    }
    CONFIDENCE_MAX
}

/// The grouping key of an observation: the first recognised discriminator
/// in its data payload. camelCase and snake_case are both accepted.
fn group_key(data: &Value) -> String {
    for field in [
        "pattern",
        "errorType",
        "error_type",
        "workflowHash",
        "workflow_hash",
        "taskType",
        "task_type",
    ] {
        if let Some(v) = data.get(field).and_then(|v| v.as_str()) {
            return v.to_string();
        }
    }
    "default".to_string()
}

impl Observer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            log_path: config.observations_path(),
            min_observations: config.observer.min_observations_for_instinct,
        }
    }

    // =========================================================================
    // WRITE PATH
    // =========================================================================

    /// Append one observation. Synchronous, best-effort: any failure is
    /// logged and swallowed; the caller's hot path never pays for it.
    pub fn record(&self, kind: ObservationType, data: Value) {
        let observation = Observation {
            id: observation_id(),
            timestamp: now_ms(),
            kind,
            data,
        };
        self.append(&observation);
    }

    /// Append an externally supplied observation (the `observe` command),
    /// stamping id and timestamp when absent.
    pub fn import(&self, mut observation: Observation) {
        if observation.id.is_empty() {
            observation.id = observation_id();
        }
        if observation.timestamp == 0 {
            observation.timestamp = now_ms();
        }
        self.append(&observation);
    }

    fn append(&self, observation: &Observation) {
        let line = match serde_json::to_string(observation) {
            Ok(line) => line,
            Err(e) => {
                warn!("observation not serializable: {e}");
                return;
            }
        };
        if let Some(parent) = self.log_path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .and_then(|mut f| writeln!(f, "{line}"));
        if let Err(e) = result {
            warn!("observation append failed: {e}");
        }
    }

    // =========================================================================
    // BATCH PATH
    // =========================================================================

    /// Promote recurring observation patterns into pinned instincts.
    ///
    /// No-op below the minimum observation count. Groups of
    /// `INSTINCT_MIN_GROUP` or more with the same `(type, key)` become one
    /// instinct each. The log is truncated only after at least one
    /// promotion succeeded, so sparse patterns keep accumulating.
    pub fn batch_analyze(&self, store: &mut SynapseStore) -> BatchOutcome {
        let observations = self.read_log();
        let mut outcome = BatchOutcome {
            observations_seen: observations.len(),
            ..Default::default()
        };
        if observations.len() < self.min_observations {
            debug!(
                "observer: {} observations < {} minimum; skipping analysis",
                observations.len(),
                self.min_observations
            );
            return outcome;
        }

        let mut groups: BTreeMap<(ObservationType, String), Vec<&Observation>> = BTreeMap::new();
        for obs in &observations {
            groups
                .entry((obs.kind, group_key(&obs.data)))
                .or_default()
                .push(obs);
        }

        for ((kind, key), members) in groups {
            if members.len() < INSTINCT_MIN_GROUP {
                continue;
            }
            let instinct = build_instinct(kind, &key, &members);
            info!(
                "observer: promoting instinct {} ({} observations)",
                instinct.id,
                members.len()
            );
            store.promote_instinct(instinct);
            outcome.instincts_created += 1;
        }

        if outcome.instincts_created > 0 {
            if let Err(e) = fs::write(&self.log_path, "") {
                warn!("observation log truncate failed: {e}");
            }
        }
        outcome
    }

    fn read_log(&self) -> Vec<Observation> {
        let raw = match fs::read_to_string(&self.log_path) {
            Ok(raw) => raw,
            Err(_) => return Vec::new(),
        };
        raw.lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(obs) => Some(obs),
                Err(e) => {
                    warn!("skipping malformed observation line: {e}");
                    None
                }
            })
            .collect()
    }
}

fn build_instinct(kind: ObservationType, key: &str, members: &[&Observation]) -> Instinct {
    let sanitized = sanitize_key(key);
    let (id, trigger, action, domain) = match kind {
        ObservationType::UserCorrection => (
            format!("user-correct-{sanitized}"),
            format!("user correction pattern: {key}"),
            format!("auto-correct: {key}"),
            "user_preference",
        ),
        ObservationType::ErrorResolution => (
            format!("error-resolve-{sanitized}"),
            format!("error: {key}"),
            format!("auto-resolve: {key}"),
            "error_handling",
        ),
        ObservationType::Workflow => (
            format!("workflow-{sanitized}"),
            format!("workflow: {key}"),
            format!("auto-execute: {key}"),
            "workflow",
        ),
        ObservationType::ToolPreference => (
            format!("tool-pref-{sanitized}"),
            format!("task: {key}"),
            format!("use preferred tool for: {key}"),
            "tool_usage",
        ),
    };
    Instinct {
        id,
        trigger,
        action,
        domain: domain.to_string(),
        confidence: confidence_for(members.len()),
        evidence: members.iter().map(|o| o.id.clone()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (Observer, SynapseStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut config = EngineConfig::default();
        config.engine_dir = dir.path().to_path_buf();
        config.archive_dir = dir.path().join("archive");
        (
            Observer::new(&config),
            SynapseStore::open(&config),
            dir,
        )
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("ETIMEDOUT"), "etimedout");
        assert_eq!(sanitize_key("npm run build!!"), "npm-run-build");
        assert_eq!(sanitize_key("  spaced  out  "), "spaced-out");
    }

    #[test]
    fn test_confidence_buckets() {
        assert_eq!(confidence_for(2), 0.3);
        assert_eq!(confidence_for(5), 0.5);
        assert_eq!(confidence_for(10), 0.7);
        assert_eq!(confidence_for(11), 0.85);
    }

    #[test]
    fn test_record_appends_one_line_each() {
        let (observer, _store, dir) = setup();
        observer.record(ObservationType::Workflow, json!({"context": "a"}));
        observer.record(ObservationType::Workflow, json!({"context": "b"}));

        let raw = fs::read_to_string(dir.path().join("observations.jsonl")).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Observation = serde_json::from_str(lines[0]).unwrap();
        assert!(first.id.starts_with("obs_"));
        assert!(first.timestamp > 0);
    }

    #[test]
    fn test_batch_below_minimum_is_noop() {
        let (observer, mut store, _dir) = setup();
        for _ in 0..4 {
            observer.record(
                ObservationType::ErrorResolution,
                json!({"errorType": "ETIMEDOUT"}),
            );
        }
        let outcome = observer.batch_analyze(&mut store);
        assert_eq!(outcome.instincts_created, 0);
        assert_eq!(store.hot_len(), 0);
    }

    #[test]
    fn test_error_resolution_promotion_and_truncate() {
        let (observer, mut store, dir) = setup();
        for _ in 0..5 {
            observer.record(
                ObservationType::ErrorResolution,
                json!({"errorType": "ETIMEDOUT", "context": "api call"}),
            );
        }

        let outcome = observer.batch_analyze(&mut store);
        assert_eq!(outcome.instincts_created, 1);

        let record = store.get("error-resolve-etimedout").unwrap();
        assert!(record.pinned);
        assert_eq!(record.trigger.as_deref(), Some("error: ETIMEDOUT"));
        assert_eq!(record.rule.as_deref(), Some("auto-resolve: ETIMEDOUT"));
        assert_eq!(record.domain.as_deref(), Some("error_handling"));
        assert_eq!(record.confidence, Some(0.5));
        assert_eq!(record.evidence.as_ref().unwrap().len(), 5);

        let raw = fs::read_to_string(dir.path().join("observations.jsonl")).unwrap();
        assert!(raw.is_empty(), "log must be truncated after promotion");
    }

    #[test]
    fn test_small_groups_do_not_promote() {
        let (observer, mut store, _dir) = setup();
        // 6 observations total, but split 2/2/2 across keys
        for key in ["a", "b", "c"] {
            for _ in 0..2 {
                observer.record(ObservationType::Workflow, json!({"workflowHash": key}));
            }
        }
        let outcome = observer.batch_analyze(&mut store);
        assert_eq!(outcome.instincts_created, 0);
    }

    #[test]
    fn test_snake_case_data_keys_accepted() {
        let (observer, mut store, _dir) = setup();
        for _ in 0..5 {
            observer.record(
                ObservationType::ToolPreference,
                json!({"task_type": "code review"}),
            );
        }
        observer.batch_analyze(&mut store);
        let record = store.get("tool-pref-code-review").unwrap();
        assert_eq!(record.trigger.as_deref(), Some("task: code review"));
        assert_eq!(record.domain.as_deref(), Some("tool_usage"));
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let (observer, mut store, dir) = setup();
        for _ in 0..5 {
            observer.record(
                ObservationType::UserCorrection,
                json!({"pattern": "tabs not spaces"}),
            );
        }
        // Inject garbage between valid lines
        let path = dir.path().join("observations.jsonl");
        let mut raw = fs::read_to_string(&path).unwrap();
        raw.push_str("{ not json\n");
        fs::write(&path, raw).unwrap();

        let outcome = observer.batch_analyze(&mut store);
        assert_eq!(outcome.instincts_created, 1);
        assert!(store.get("user-correct-tabs-not-spaces").is_some());
    }
}
