//! Embedding capability and vector cache
//!
//! The engine depends on a pluggable [`Embedder`]: one text or a batch in,
//! fixed-dimension vectors out. The bundled implementation talks to an
//! OpenAI-compatible embeddings endpoint; the credential is sourced from
//! the environment and its *absence is not an error*: recall simply runs
//! local-only.
//!
//! Similarity is computed locally: `incremental_index` embeds new chunks
//! of a log file into `vector_cache.json`, and `search` embeds only the
//! query, ranking by cosine against the persisted vectors.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::constants::CHUNK_DEDUPE_PREFIX;
use crate::similarity::top_k_similar;
use crate::store::now_ms;

/// Embedding capability: text in, fixed-dimension vector out
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Order-preserving batch variant
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

// =============================================================================
// HTTP CLIENT
// =============================================================================

/// Supported embedding providers, probed in order
const PROVIDERS: &[(&str, &str, &str)] = &[
    (
        "SILICONFLOW_API_KEY",
        "https://api.siliconflow.cn/v1/embeddings",
        "BAAI/bge-m3",
    ),
    (
        "VOYAGE_API_KEY",
        "https://api.voyageai.com/v1/embeddings",
        "voyage-3-lite",
    ),
    (
        "HF_TOKEN",
        "https://router.huggingface.co/v1/embeddings",
        "BAAI/bge-m3",
    ),
];

/// Embedder backed by an OpenAI-compatible embeddings endpoint
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpEmbedder {
    /// Build from environment credentials; `None` when no provider key is
    /// set (vector search disabled, not an error).
    pub fn from_env(config: &EngineConfig) -> Option<Self> {
        for (env_key, endpoint, model) in PROVIDERS {
            if let Ok(api_key) = std::env::var(env_key) {
                if api_key.trim().is_empty() {
                    continue;
                }
                info!("embedding provider: {model} via {env_key}");
                return Some(Self {
                    client: reqwest::Client::builder()
                        .timeout(Duration::from_millis(config.vector_api.timeout_ms))
                        .build()
                        .unwrap_or_default(),
                    endpoint: endpoint.to_string(),
                    api_key,
                    model: model.to_string(),
                });
            }
        }
        debug!("no embedding credential configured; vector search disabled");
        None
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedding API returned no vectors"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await
            .context("embedding API request failed")?
            .error_for_status()
            .context("embedding API returned an error status")?;

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .context("embedding API response did not parse")?;

        if parsed.data.len() != texts.len() {
            anyhow::bail!(
                "embedding API returned {} vectors for {} inputs",
                parsed.data.len(),
                texts.len()
            );
        }
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

// =============================================================================
// VECTOR CACHE
// =============================================================================

/// One embedded chunk of a source file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedChunk {
    pub file: String,
    pub preview: String,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct VectorCache {
    #[serde(default)]
    chunks: Vec<CachedChunk>,
}

/// One vector search result
#[derive(Debug, Clone, Serialize)]
pub struct VectorHit {
    pub file: String,
    pub preview: String,
    pub similarity: f64,
}

/// Search outcome; `ok == false` means the vector path was unavailable or
/// failed, and the caller should fall back to local results.
#[derive(Debug, Clone, Default)]
pub struct VectorSearchOutcome {
    pub ok: bool,
    pub results: Vec<VectorHit>,
}

/// Vector index owning the persisted chunk cache (C3 surface)
pub struct VectorIndex {
    cache_path: PathBuf,
    meta_path: PathBuf,
    chunk_size: usize,
    max_results: usize,
    embedder: Arc<dyn Embedder>,
}

/// Group paragraphs into chunks up to a soft character limit.
fn chunk_paragraphs(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        if !current.is_empty() && current.chars().count() + paragraph.chars().count() > limit {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
        // An oversized single paragraph still becomes one chunk
        if current.chars().count() >= limit {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn dedupe_key(file: &str, preview: &str) -> (String, String) {
    (
        file.to_string(),
        preview.chars().take(CHUNK_DEDUPE_PREFIX).collect(),
    )
}

impl VectorIndex {
    pub fn new(config: &EngineConfig, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            cache_path: config.vector_cache_path(),
            meta_path: config.vector_meta_path(),
            chunk_size: config.vector_api.chunk_size,
            max_results: config.vector_api.max_results,
            embedder,
        }
    }

    fn load_cache(&self) -> VectorCache {
        match fs::read_to_string(&self.cache_path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("corrupt vector cache: {e}; starting empty");
                VectorCache::default()
            }),
            Err(_) => VectorCache::default(),
        }
    }

    fn save(&self, cache: &VectorCache) -> Result<()> {
        if let Some(parent) = self.cache_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.cache_path, serde_json::to_string_pretty(cache)?)
            .with_context(|| format!("writing {}", self.cache_path.display()))?;
        let meta = json!({
            "chunks": cache.chunks.len(),
            "dimension": cache.chunks.first().map(|c| c.vector.len()).unwrap_or(0),
            "lastIndexed": now_ms(),
        });
        fs::write(&self.meta_path, serde_json::to_string_pretty(&meta)?)?;
        Ok(())
    }

    /// Index one log file incrementally. Chunks already present (same file
    /// and preview prefix) are skipped, so re-running is idempotent.
    pub async fn incremental_index(&self, file: &Path) -> Result<usize> {
        let content =
            fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut cache = self.load_cache();
        let existing: HashSet<(String, String)> = cache
            .chunks
            .iter()
            .map(|c| dedupe_key(&c.file, &c.preview))
            .collect();

        let fresh: Vec<String> = chunk_paragraphs(&content, self.chunk_size)
            .into_iter()
            .filter(|chunk| !existing.contains(&dedupe_key(&file_name, chunk)))
            .collect();
        if fresh.is_empty() {
            debug!("{file_name}: nothing new to index");
            return Ok(0);
        }

        let vectors = self.embedder.embed_batch(&fresh).await?;
        let added = vectors.len();
        for (chunk, vector) in fresh.into_iter().zip(vectors) {
            cache.chunks.push(CachedChunk {
                file: file_name.clone(),
                preview: chunk,
                vector,
            });
        }
        self.save(&cache)?;
        info!("{file_name}: indexed {added} new chunks");
        Ok(added)
    }

    /// Embed the query and rank cached chunks by cosine similarity.
    /// Failures produce `ok == false`, never an error.
    pub async fn search(&self, query: &str) -> VectorSearchOutcome {
        let cache = self.load_cache();
        if cache.chunks.is_empty() {
            return VectorSearchOutcome {
                ok: true,
                results: Vec::new(),
            };
        }

        let query_vector = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!("query embedding failed: {e}");
                return VectorSearchOutcome::default();
            }
        };

        let candidates: Vec<(Vec<f32>, (String, String))> = cache
            .chunks
            .into_iter()
            .map(|c| (c.vector, (c.file, c.preview)))
            .collect();

        let results = top_k_similar(&query_vector, &candidates, self.max_results)
            .into_iter()
            .map(|(similarity, (file, preview))| VectorHit {
                file,
                preview,
                similarity: similarity as f64,
            })
            .collect();

        VectorSearchOutcome { ok: true, results }
    }
}
