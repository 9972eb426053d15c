//! Brain Synapse: agent-local associative memory engine
//!
//! Consumes append-only daily interaction logs and exposes bounded-latency
//! keyword-plus-semantic recall. Concepts are weighted synapses:
//! reinforced on use (LTP), decayed on neglect (LTD), linked by
//! co-occurrence (Hebbian), demoted to a latent store when they fade and
//! revived by deep recall. An observer distils behavioural regularities
//! into pinned, non-decaying instincts.
//!
//! # Pipelines
//! - [`distill::distill`] is the batch pass: term extraction, reinforcement,
//!   linkage, decay, archive promotion, incremental vector indexing
//! - [`recall::recall`] is the hot path: activation + LTP commit, then a
//!   local-vs-vector retrieval race under hard deadlines
//!
//! # Budget discipline
//! The local index answers inside ~100 ms or not at all; the vector path
//! gets 3 s. Expired work is discarded, never awaited.

pub mod config;
pub mod constants;
pub mod distill;
pub mod embeddings;
pub mod errors;
pub mod local_index;
pub mod observer;
pub mod recall;
pub mod similarity;
pub mod store;
pub mod tokenizer;

// Re-export so tests and downstream users share the same versions
pub use chrono;
pub use serde_json;
