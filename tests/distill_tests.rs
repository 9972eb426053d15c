//! Distillation pipeline scenarios
//!
//! End-to-end passes over real temp directories: cold-start ingest,
//! special-line boosts, archive promotion, decay ordering, idempotence.

use std::fs;

use brain_synapse::config::EngineConfig;
use brain_synapse::distill::distill;
use brain_synapse::observer::{ObservationType, Observer};
use brain_synapse::store::SynapseStore;
use brain_synapse::tokenizer::Tokenizer;
use serde_json::json;
use tempfile::TempDir;

fn setup() -> (EngineConfig, TempDir) {
    let dir = TempDir::new().unwrap();
    let mut config = EngineConfig::default();
    config.engine_dir = dir.path().join("engine");
    config.memory_dir = dir.path().join("workspace/memory");
    config.archive_dir = config.memory_dir.join("archive");
    fs::create_dir_all(&config.memory_dir).unwrap();
    fs::create_dir_all(&config.engine_dir).unwrap();
    (config, dir)
}

async fn run_distill(config: &EngineConfig, store: &mut SynapseStore, force: bool) {
    let observer = Observer::new(config);
    let tokenizer = Tokenizer::new(&config.keywords);
    distill(config, store, &observer, &tokenizer, None, force).await;
}

// =============================================================================
// COLD START INGEST
// =============================================================================

#[tokio::test]
async fn cold_start_ingest() {
    let (config, _dir) = setup();
    fs::write(
        config.memory_dir.join("2025-01-01.md"),
        "memory system database cache",
    )
    .unwrap();

    let mut store = SynapseStore::open(&config);
    run_distill(&config, &mut store, true).await;

    for key in ["memory", "system", "database", "cache"] {
        let record = store.get(key).unwrap_or_else(|| panic!("{key} missing"));
        assert_eq!(record.weight, 1.0, "{key} must keep its initial weight");
        assert_eq!(record.count, 1);
        assert_eq!(record.refs, vec!["2025-01-01.md"]);
    }

    // Pairwise Hebbian links all exist with strength 1, mirrored
    for (a, b) in [
        ("memory", "system"),
        ("memory", "database"),
        ("memory", "cache"),
        ("system", "database"),
        ("system", "cache"),
        ("database", "cache"),
    ] {
        assert_eq!(store.get(a).unwrap().synapses.get(b), Some(&1));
        assert_eq!(store.get(b).unwrap().synapses.get(a), Some(&1));
    }

    // The log moved to the archive
    assert!(!config.memory_dir.join("2025-01-01.md").exists());
    assert!(config.archive_dir.join("2025-01-01.md").exists());
}

#[tokio::test]
async fn special_line_contributes_boosted_concept() {
    let (config, _dir) = setup();
    fs::write(
        config.memory_dir.join("2025-01-02.md"),
        "- IMPORTANT: retry on 429\nplain context here",
    )
    .unwrap();

    let mut store = SynapseStore::open(&config);
    run_distill(&config, &mut store, true).await;

    let record = store
        .get("important: retry on 429")
        .expect("special line becomes a concept key");
    assert_eq!(record.weight, 1.5, "base 1.0 plus the 0.5 special boost");
}

#[tokio::test]
async fn special_line_key_is_truncated_to_fifty_chars() {
    let (config, _dir) = setup();
    let long_tail = "x".repeat(80);
    fs::write(
        config.memory_dir.join("2025-01-03.md"),
        format!("- DECISION: {long_tail}"),
    )
    .unwrap();

    let mut store = SynapseStore::open(&config);
    run_distill(&config, &mut store, true).await;

    let key_exists = store.hot_keys().any(|k| k.starts_with("decision: ") && k.chars().count() == 50);
    assert!(key_exists, "special key must be cut at 50 chars");
}

// =============================================================================
// MODE AND ORDERING
// =============================================================================

#[tokio::test]
async fn normal_mode_skips_todays_log() {
    let (config, _dir) = setup();
    let today = format!("{}.md", chrono::Local::now().format("%Y-%m-%d"));
    fs::write(config.memory_dir.join(&today), "fresh unprocessed words").unwrap();
    fs::write(config.memory_dir.join("2025-01-01.md"), "historic entry words").unwrap();

    let mut store = SynapseStore::open(&config);
    run_distill(&config, &mut store, false).await;

    assert!(store.get("historic").is_some());
    assert!(store.get("fresh").is_none(), "today's log must wait");
    assert!(config.memory_dir.join(&today).exists());
}

#[tokio::test]
async fn force_mode_includes_todays_log() {
    let (config, _dir) = setup();
    let today = format!("{}.md", chrono::Local::now().format("%Y-%m-%d"));
    fs::write(config.memory_dir.join(&today), "urgent findings").unwrap();

    let mut store = SynapseStore::open(&config);
    run_distill(&config, &mut store, true).await;

    assert!(store.get("urgent").is_some());
    assert!(config.archive_dir.join(&today).exists());
}

#[tokio::test]
async fn non_daily_files_are_ignored() {
    let (config, _dir) = setup();
    fs::write(config.memory_dir.join("notes.md"), "stray notefile").unwrap();
    fs::write(config.memory_dir.join("2025-1-1.md"), "malformed datename").unwrap();

    let mut store = SynapseStore::open(&config);
    run_distill(&config, &mut store, true).await;

    assert_eq!(store.hot_len(), 0);
    assert!(config.memory_dir.join("notes.md").exists());
}

#[tokio::test]
async fn untouched_concepts_decay_while_fresh_ones_do_not() {
    let (config, _dir) = setup();
    fs::write(config.memory_dir.join("2025-01-01.md"), "stale topic").unwrap();

    let mut store = SynapseStore::open(&config);
    run_distill(&config, &mut store, true).await;
    assert_eq!(store.get("stale").unwrap().weight, 1.0);

    // Second pass: a new log that does not mention the old concepts
    fs::write(config.memory_dir.join("2025-01-02.md"), "different matter").unwrap();
    run_distill(&config, &mut store, true).await;

    let stale = store.get("stale").unwrap().weight;
    assert!((stale - 0.9).abs() < 1e-9, "neglected concept decays once");
    assert_eq!(store.get("different").unwrap().weight, 1.0);
}

#[tokio::test]
async fn empty_active_directory_converges() {
    let (config, _dir) = setup();
    fs::write(config.memory_dir.join("2025-01-01.md"), "seed concept").unwrap();

    let mut store = SynapseStore::open(&config);
    run_distill(&config, &mut store, true).await;
    let after_first = store.hot_len();

    // Repeated distills on an empty directory only apply decay; concepts
    // drain to latent and the system converges instead of churning
    for _ in 0..20 {
        run_distill(&config, &mut store, true).await;
    }
    assert!(store.hot_len() <= after_first);
    assert_eq!(store.hot_len() + store.latent_len(), after_first);
}

// =============================================================================
// OBSERVER INTEGRATION
// =============================================================================

#[tokio::test]
async fn distill_promotes_recurring_errors_to_instincts() {
    let (config, _dir) = setup();
    let observer = Observer::new(&config);
    for _ in 0..5 {
        observer.record(
            ObservationType::ErrorResolution,
            json!({"errorType": "ETIMEDOUT", "context": "upstream api"}),
        );
    }

    let mut store = SynapseStore::open(&config);
    run_distill(&config, &mut store, true).await;

    let instinct = store.get("error-resolve-etimedout").expect("instinct promoted");
    assert!(instinct.pinned);
    assert_eq!(instinct.trigger.as_deref(), Some("error: ETIMEDOUT"));
    assert_eq!(instinct.confidence, Some(0.5));
    assert_eq!(instinct.evidence.as_ref().unwrap().len(), 5);

    let log = fs::read_to_string(config.observations_path()).unwrap();
    assert!(log.is_empty(), "observation log truncated after promotion");
}

#[tokio::test]
async fn instincts_survive_repeated_distills() {
    let (config, _dir) = setup();
    let observer = Observer::new(&config);
    for _ in 0..5 {
        observer.record(ObservationType::Workflow, json!({"workflowHash": "deploy-seq"}));
    }

    let mut store = SynapseStore::open(&config);
    run_distill(&config, &mut store, true).await;
    let initial_weight = store.get("workflow-deploy-seq").unwrap().weight;

    for _ in 0..10 {
        run_distill(&config, &mut store, true).await;
    }
    let record = store.get("workflow-deploy-seq").unwrap();
    assert!(record.pinned);
    assert!(record.weight >= initial_weight, "pinned weight never decays");
}

// =============================================================================
// PERSISTENCE
// =============================================================================

#[tokio::test]
async fn distill_persists_across_reopen() {
    let (config, _dir) = setup();
    fs::write(config.memory_dir.join("2025-01-01.md"), "durable knowledge").unwrap();

    let mut store = SynapseStore::open(&config);
    run_distill(&config, &mut store, true).await;
    drop(store);

    let reopened = SynapseStore::open(&config);
    assert!(reopened.get("durable").is_some());
    assert!(config.hot_weights_path().exists());
}
