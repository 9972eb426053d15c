//! Synapse CLI - command surface over the memory engine
//!
//! Thin dispatch layer: every subcommand maps onto one pipeline or store
//! operation. The CLI is the only strict error surface; malformed user
//! input exits non-zero, everything below absorbs and logs.

use std::io::Read;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::warn;

use brain_synapse::config::EngineConfig;
use brain_synapse::distill;
use brain_synapse::embeddings::{HttpEmbedder, VectorIndex};
use brain_synapse::errors::EngineError;
use brain_synapse::local_index::LocalIndex;
use brain_synapse::observer::{Observation, ObservationType, Observer};
use brain_synapse::recall::{self, RecallOptions};
use brain_synapse::store::SynapseStore;
use brain_synapse::tokenizer::Tokenizer;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

#[derive(Parser)]
#[command(name = "synapse")]
#[command(about = "Brain Synapse - agent-local associative memory engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume un-distilled daily logs into the synapse store
    Distill {
        /// Include today's still-live log
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Associative recall; emits the JSON recall response
    Recall {
        query: String,
        /// Also search the latent store and revive matches
        #[arg(long, short = 'd')]
        deep: bool,
    },

    /// Standalone deep recall over the latent store and archive
    DeepRecall { query: String },

    /// Aggregates over the latent store
    LatentStats,

    /// Apply LTD decay immediately and persist
    Forget,

    /// Pin a rule: <keyword>:<rule>
    PinExp { entry: String },

    /// Insert an explicit pinned memory: <concept>:<content> or <concept> <content>
    Memorize { args: Vec<String> },

    /// List all pinned rules
    GetPinned,

    /// Top concepts by weight
    GetTopConcepts {
        #[arg(default_value_t = 5)]
        n: usize,
    },

    /// Run observer batch promotion over an external session trace
    Observe { file: Option<String> },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "brain_synapse=info");
    }
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env();

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, config: EngineConfig) -> Result<(), EngineError> {
    let mut store = SynapseStore::open(&config);
    let observer = Observer::new(&config);

    match command {
        Commands::Distill { force } => {
            let tokenizer = Tokenizer::new(&config.keywords);
            let vector = build_vector_index(&config);
            let summary = distill::distill(
                &config,
                &mut store,
                &observer,
                &tokenizer,
                vector.as_ref(),
                force,
            )
            .await;
            println!("{summary}");
        }

        Commands::Recall { query, deep } => {
            let index = Arc::new(LocalIndex::new(&config));
            let vector = build_vector_index(&config);
            let response = recall::recall(
                &config,
                &mut store,
                &index,
                vector.as_ref(),
                &observer,
                &query,
                RecallOptions {
                    deep,
                    ..Default::default()
                },
            )
            .await;
            print_json(&response);
        }

        Commands::DeepRecall { query } => {
            let result = store.deep_recall(&[query], brain_synapse::constants::DEEP_RECALL_LIMIT);
            persist_lenient(&store);
            print_json(&result);
        }

        Commands::LatentStats => {
            print_json(&store.latent_stats());
        }

        Commands::Forget => {
            let demoted = store.apply_ltd();
            persist_lenient(&store);
            println!("{demoted} concepts demoted to the latent store");
        }

        Commands::PinExp { entry } => {
            let (keyword, rule) = split_colon_pair("pin-exp", &entry)?;
            store.pin(&keyword, &rule);
            persist_lenient(&store);
            println!("pinned '{keyword}'");
        }

        Commands::Memorize { args } => {
            let (concept, content) = parse_memorize_args(&args)?;
            store.memorize(&concept, &content);
            persist_lenient(&store);
            println!("memorized '{concept}'");
        }

        Commands::GetPinned => {
            let pinned: Vec<_> = store
                .pinned()
                .into_iter()
                .map(|(keyword, rule, weight)| json!({
                    "keyword": keyword,
                    "rule": rule,
                    "weight": weight,
                }))
                .collect();
            print_json(&pinned);
        }

        Commands::GetTopConcepts { n } => {
            print_json(&store.top_concepts(n));
        }

        Commands::Observe { file } => {
            let raw = read_trace("observe", file.as_deref())?;
            let mut imported = 0usize;
            for line in raw.lines().filter(|l| !l.trim().is_empty()) {
                match parse_trace_line(line) {
                    Some(obs) => {
                        observer.import(obs);
                        imported += 1;
                    }
                    None => warn!("skipping unparseable trace line"),
                }
            }
            let outcome = observer.batch_analyze(&mut store);
            persist_lenient(&store);
            println!(
                "imported {imported} observations, created {} instincts",
                outcome.instincts_created
            );
        }
    }

    Ok(())
}

fn build_vector_index(config: &EngineConfig) -> Option<VectorIndex> {
    if !config.features.enable_vector_search {
        return None;
    }
    HttpEmbedder::from_env(config).map(|e| VectorIndex::new(config, Arc::new(e)))
}

fn persist_lenient(store: &SynapseStore) {
    if let Err(e) = store.persist() {
        warn!("persist failed: {e}");
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => warn!("response not serializable: {e}"),
    }
}

// =============================================================================
// ARGUMENT PARSING
// =============================================================================

fn split_colon_pair(command: &'static str, entry: &str) -> Result<(String, String), EngineError> {
    match entry.split_once(':') {
        Some((left, right)) if !left.trim().is_empty() && !right.trim().is_empty() => {
            Ok((left.trim().to_string(), right.trim().to_string()))
        }
        _ => Err(EngineError::InvalidArgument {
            command,
            reason: format!("expected <keyword>:<rule>, got '{entry}'"),
        }),
    }
}

fn parse_memorize_args(args: &[String]) -> Result<(String, String), EngineError> {
    match args {
        [] => Err(EngineError::InvalidArgument {
            command: "memorize",
            reason: "expected <concept>:<content> or <concept> <content>".to_string(),
        }),
        [single] => split_colon_pair("memorize", single),
        [concept, rest @ ..] => {
            let content = rest.join(" ");
            if concept.trim().is_empty() || content.trim().is_empty() {
                return Err(EngineError::InvalidArgument {
                    command: "memorize",
                    reason: "concept and content must be non-empty".to_string(),
                });
            }
            Ok((concept.trim().to_string(), content.trim().to_string()))
        }
    }
}

fn read_trace(command: &'static str, file: Option<&str>) -> Result<String, EngineError> {
    match file {
        Some(path) => std::fs::read_to_string(path).map_err(|e| EngineError::InvalidArgument {
            command,
            reason: format!("cannot read {path}: {e}"),
        }),
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| EngineError::InvalidArgument {
                    command,
                    reason: format!("cannot read stdin: {e}"),
                })?;
            Ok(buffer)
        }
    }
}

/// Parse one line of an external session trace. Records may omit id and
/// timestamp; the observer stamps them on import.
fn parse_trace_line(line: &str) -> Option<Observation> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    let kind: ObservationType = serde_json::from_value(value.get("type")?.clone()).ok()?;
    Some(Observation {
        id: value
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        timestamp: value.get("timestamp").and_then(|v| v.as_i64()).unwrap_or(0),
        kind,
        data: value.get("data").cloned().unwrap_or(serde_json::Value::Null),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_colon_pair() {
        let (k, r) = split_colon_pair("pin-exp", "deploy:always run smoke tests").unwrap();
        assert_eq!(k, "deploy");
        assert_eq!(r, "always run smoke tests");
    }

    #[test]
    fn test_split_colon_pair_rejects_missing_colon() {
        assert!(split_colon_pair("pin-exp", "no separator here").is_err());
        assert!(split_colon_pair("pin-exp", ":empty keyword").is_err());
        assert!(split_colon_pair("pin-exp", "empty rule:").is_err());
    }

    #[test]
    fn test_memorize_colon_form() {
        let args = vec!["api:rotate keys quarterly".to_string()];
        let (c, content) = parse_memorize_args(&args).unwrap();
        assert_eq!(c, "api");
        assert_eq!(content, "rotate keys quarterly");
    }

    #[test]
    fn test_memorize_space_form() {
        let args = vec!["api".to_string(), "rotate".to_string(), "keys".to_string()];
        let (c, content) = parse_memorize_args(&args).unwrap();
        assert_eq!(c, "api");
        assert_eq!(content, "rotate keys");
    }

    #[test]
    fn test_memorize_empty_is_error() {
        assert!(parse_memorize_args(&[]).is_err());
    }

    #[test]
    fn test_parse_trace_line_minimal() {
        let obs = parse_trace_line(r#"{"type":"workflow","data":{"workflowHash":"abc"}}"#).unwrap();
        assert_eq!(obs.kind, ObservationType::Workflow);
        assert!(obs.id.is_empty());
    }

    #[test]
    fn test_parse_trace_line_garbage_is_none() {
        assert!(parse_trace_line("not json").is_none());
        assert!(parse_trace_line(r#"{"no":"type"}"#).is_none());
    }
}
