//! 🕳️ Sinks — the places documents go when they grow up.
//!
//! A [`Sink`] is the ingestion target: it mints [`Batch`]es, and it exposes
//! the index-lifecycle switchboard (exists / create / delete / mapping /
//! replicas / read-only / block-write). Lifecycle operations are invoked
//! exactly once each, at prepare/finalize time, OUTSIDE the ingestion hot
//! loop. The hot loop only ever touches batches.
//!
//! # Contract 📜
//! - `new_batch` is cheap and infallible — it allocates an empty batch and
//!   stamps its build-start time. That timestamp matters: the equalizer
//!   subtracts build time from its pacing sleep, so don't hoard batches.
//! - A [`Batch`] is single-use. `send` consumes it. There is no "send again".
//!   Once it's gone, it's gone. Like a text you shouldn't have sent.
//! - `send` returns `(elapsed_millis, outcome)` — elapsed is whatever the
//!   sink considers its ingest time (Elasticsearch reports its own `took`).
//!   The pair is NOT a `Result` because the equalizer wants the latency
//!   measurement even when the outcome is an error.
//!
//! # Knowledge Graph 🧠
//! - Pattern: trait → concrete impls (ElasticsearchSink, InMemorySink),
//!   selected ONCE at composition time. No parallel per-version clients.
//! - Sink does lifecycle + batch minting. Batch does accumulation + one send.
//! - Ancient proverb: "He who retries inside the Sink, retries twice."

use anyhow::Result;
use async_trait::async_trait;

pub mod elasticsearch;
pub mod in_mem;

pub use elasticsearch::{ElasticsearchConfig, ElasticsearchSink};
pub use in_mem::InMemorySink;

/// 📦 A size-bounded, single-use accumulation of documents headed for the
/// sink in one round trip.
///
/// Workers append items until the estimated byte size crosses the live
/// budget, then hand the whole thing to the equalizer. Ownership of the
/// batch transfers with it — `send(self: Box<Self>)` is the point of no
/// return.
#[async_trait]
pub trait Batch: Send {
    /// ➕ Append one item: a type tag, an external id, and a JSON payload.
    fn add(&mut self, doc_type: &str, id: &str, source: &serde_json::Value);

    /// 📏 Estimated wire size of everything accumulated so far, in bytes.
    /// "Estimated" because sinks may add per-item envelope overhead.
    fn estimated_size_bytes(&self) -> u64;

    /// 🔢 Number of items accumulated so far.
    fn len(&self) -> usize;

    /// 🕳️ True when nothing has been added. An empty batch is never sent.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// ⏱️ Milliseconds since this batch was minted — i.e., how long the
    /// worker spent building it. The equalizer credits this against its
    /// pacing sleep.
    fn build_millis(&self) -> u64;

    /// 🚀 Ship it. Consumes the batch, returns the sink-reported ingest
    /// latency in milliseconds and the outcome. Both, always — a failed
    /// send with a measured latency still teaches the pacing layer something.
    async fn send(self: Box<Self>) -> (u64, Result<()>);
}

/// 🕳️ The ingestion target. Mints batches, flips index lifecycle switches.
///
/// Shared by every worker behind an `Arc`, so everything here takes `&self`.
/// Implementations own their own connection pooling (reqwest does it for
/// free; the in-memory sink owns a Vec and a dream).
#[async_trait]
pub trait Sink: Send + Sync {
    /// 🏭 Mint a fresh, empty batch targeting the given index.
    /// Stamps the batch's build-start time. Cheap. Infallible. Do it often.
    fn new_batch(&self, index: &str) -> Box<dyn Batch>;

    /// 🔍 Does the index exist?
    async fn index_exists(&self, index: &str) -> Result<bool>;

    /// 🏗️ Create the index with the given mapping body.
    async fn create_index(&self, index: &str, mapping: &str) -> Result<()>;

    /// 🗑️ Delete the index. All of it. This is the "clear existing" path.
    async fn delete_index(&self, index: &str) -> Result<()>;

    /// 🗺️ Update the mapping on an existing index.
    async fn put_mapping(&self, index: &str, doc_type: &str, mapping: &str) -> Result<()>;

    /// 🔄 Turn replication back on after the bulk load. Replicas during
    /// ingestion are pure overhead; replicas after ingestion are insurance.
    async fn enable_replicas(&self, index: &str, num_replicas: u32) -> Result<()>;

    /// 🔒 Flip the index's read-only block.
    async fn set_read_only(&self, index: &str, read_only: bool) -> Result<()>;

    /// 🔒 Flip the index's write block (reads stay open).
    async fn set_block_write(&self, index: &str, block_write: bool) -> Result<()>;
}
