//! 🌊 spillway — bulk ingestion for search indices, with a speed governor.
//!
//! 🎬 *[a million NDJSON lines wait in a directory. a cluster waits across]*
//! *[the network. between them: eight workers, a token pool, a circuit]*
//! *[breaker, and a hill climber with something to prove.]*
//!
//! The pipeline, in one breath: a [`Feed`](feeds::Feed) vends byte streams
//! to a fixed worker pool; each worker parses lines into items through a
//! [`Document`](documents::Document), packs them into size-bounded batches,
//! and pushes them through an admission-controlled equalizer into a
//! [`Sink`](sinks::Sink). A cumulative error-ratio breaker watches every
//! parse and every send; a background optimizer nudges the live batch size
//! toward maximum throughput while the whole thing runs.
//!
//! 🧠 Compose it yourself with [`ingestor::Ingestor`], or hand
//! [`run`] an [`app_config::AppConfig`] and let the one composition root
//! pick the feed, document format, and sink for you.

pub mod app_config;
pub mod documents;
pub mod feeds;
pub mod ingestor;
pub mod progress;
pub mod sinks;
pub mod threshold;

mod equalizer;
mod optimizer;
mod pool;

use std::sync::Arc;

use anyhow::Result;
use tracing::error;

use crate::app_config::{AppConfig, DocumentConfig, FeedConfig, SinkConfig};
use crate::documents::{Document, DocumentCtor, JsonLineDocument};
use crate::feeds::{Feed, FileFeed, InMemoryFeed};
use crate::ingestor::Ingestor;
use crate::sinks::{ElasticsearchSink, InMemorySink, Sink};

/// 🎯 How many recoverable errors the failure report quotes before
/// referring the reader to the full log.
const ERR_SAMPLE_SIZE: usize = 10;

/// 🚀 The composition root: pick the feed, the document format, and the
/// sink ONCE from the config, wire the ingestor, run it to the end.
///
/// On failure the terminal error comes back as the `Result`, and an evenly
/// strided sample of the recoverable-error log lands in the error log
/// output first — because "it failed" without "here's what the lines looked
/// like" is a 3am incident with extra steps.
pub async fn run(config: AppConfig) -> Result<()> {
    let feed: Box<dyn Feed> = match config.feed {
        FeedConfig::File(file_config) => Box::new(FileFeed::new(file_config)?),
        FeedConfig::InMemory { units } => Box::new(InMemoryFeed::from_strings(units)),
    };

    let document_ctor: DocumentCtor = match config.document {
        DocumentConfig::Json(json_config) => Arc::new(move || {
            Ok(Box::new(JsonLineDocument::new(json_config.clone())) as Box<dyn Document>)
        }),
    };

    let sink: Arc<dyn Sink> = match config.sink {
        SinkConfig::Elasticsearch(es_config) => Arc::new(ElasticsearchSink::new(es_config).await?),
        SinkConfig::InMemory => Arc::new(InMemorySink::new()),
    };

    let mut ingestor = Ingestor::new(config.ingest, feed, document_ctor, sink)?;
    let result = ingestor.ingest().await;

    if result.is_err() {
        let sample = ingestor.sample_doc_errs(ERR_SAMPLE_SIZE);
        if !sample.is_empty() {
            error!(
                "📜 {} recoverable error(s) were logged; a strided sample:",
                ingestor.doc_errs().len()
            );
            for entry in sample {
                error!("  ⚠️ {entry}");
            }
        }
    }
    result
}
