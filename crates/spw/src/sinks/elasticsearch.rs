//! # 📡 THE ELASTICSEARCH SINK
//!
//! *Previously, on Spillway...*
//!
//! 🎬 COLD OPEN — INT. SERVER ROOM — 3:47 AM
//!
//! Forty million documents wait in a directory. The cluster waits at the
//! other end of a wire. Between them: this module, a `_bulk` endpoint, and
//! an engineer who said "the ingest will be done by morning" to someone
//! they report to. The coffee is cold. The NDJSON is warm. We begin.
//!
//! 🚀 This module is the business end of the pipeline: it mints bulk
//! batches, renders them as NDJSON action/source pairs, POSTs them at
//! `_bulk`, and reads the response closely enough to surface the FIRST
//! per-item error — because "errors: true" with no detail is a horoscope,
//! not a diagnostic.
//!
//! It also carries the index-lifecycle switchboard: existence checks,
//! create/delete, mapping updates, replica counts, read-only and
//! block-write toggles. Each of those is called exactly once per run,
//! bracketing the ingest. The hot loop never touches them.
//!
//! 🦆 (mandatory duck, no context provided, none shall be requested)

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::sinks::{Batch, Sink};

/// 📡 Connection + auth settings for an Elasticsearch sink.
///
/// 🔧 Auth is tri-modal: username+password, api_key, or "I hope anonymous
/// works" (on a production cluster: it won't). When both are present,
/// api_key wins — this is not a democracy, it's a cluster.
#[derive(Debug, Deserialize, Clone)]
pub struct ElasticsearchConfig {
    /// 📡 The URL of the cluster. Include scheme + port. Yes, all of it.
    pub url: String,
    /// 🔒 Username for basic auth. Optional, like flossing.
    #[serde(default)]
    pub username: Option<String>,
    /// 🔒 Password. If this is plaintext in a checked-in file, we have
    /// already judged you. Silently. But thoroughly.
    #[serde(default)]
    pub password: Option<String>,
    /// 🔒 API key auth — the fancy way. Beats basic auth when both are set.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl ElasticsearchConfig {
    /// 🔧 Base URL with trailing-slash hygiene applied. Without it:
    /// `https://host//index`. One slash of difference. Infinite suffering.
    fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// 🔒 The auth dance, in priority order: api_key, then basic, then hope.
    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(ref api_key) = self.api_key {
            request.header("Authorization", format!("ApiKey {}", api_key))
        } else if let Some(ref username) = self.username {
            request.basic_auth(username, self.password.as_ref())
        } else {
            request
        }
    }
}

/// 📡 The Elasticsearch sink: mints [`EsBatch`]es and flips index switches.
///
/// Holds one `reqwest::Client`, reused across every request — spinning up a
/// new client per batch is the networking equivalent of buying a new car for
/// every grocery run. Workers share the sink behind an `Arc`; batches carry
/// their own clone of the client (clones share the connection pool).
#[derive(Debug)]
pub struct ElasticsearchSink {
    client: reqwest::Client,
    config: Arc<ElasticsearchConfig>,
}

impl ElasticsearchSink {
    /// 🚀 Stand up a sink: build the HTTP client with sane timeouts and ping
    /// the cluster root to confirm it's alive and talking to us.
    ///
    /// Failing here beats failing 50,000 documents deep. A handshake now is
    /// cheaper than a postmortem later.
    pub async fn new(config: ElasticsearchConfig) -> Result<Self> {
        // 🔧 10s to connect, 90s per request — bulk payloads are meaty and
        // a loaded cluster chews slowly. We wait. We are not monsters.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(90))
            .build()
            .context("💀 The HTTP client refused to be born. Probably a cursed TLS stack. The architect shrugged.")?;

        // 📡 Connectivity ping — "Hello? Is this thing on?" If the URL is
        // wrong or the auth is fiction, we find out here, loudly, alone.
        let config = Arc::new(config);
        config
            .apply_auth(client.get(config.base_url()))
            .send()
            .await
            .context("💀 Reached out to the cluster root and got ghosted. Check the URL, the network, and your feelings.")?;

        Ok(Self { client, config })
    }

    /// 🔧 `{base}/{index}` — the URL every lifecycle call hangs off of.
    fn index_url(&self, index: &str) -> String {
        format!("{}/{}", self.config.base_url(), index)
    }

    /// 🔧 PUT a JSON body at a lifecycle endpoint and insist on a 2xx.
    /// All the settings/mapping toggles are this exact shape, so they share it.
    async fn put_json(&self, url: &str, body: String, what: &str) -> Result<()> {
        let response = self
            .config
            .apply_auth(self.client.put(url))
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .with_context(|| format!("💀 The {what} request never reached the cluster"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "💀 The cluster received our {what} request and said '{}'. The response body read: '{}'. Dark poetry, as usual.",
                status,
                body
            );
        }
        Ok(())
    }
}

#[async_trait]
impl Sink for ElasticsearchSink {
    fn new_batch(&self, index: &str) -> Box<dyn Batch> {
        // 🏭 Fresh batch, build clock started. The clone of the client
        // shares the sink's connection pool — cheap by design.
        Box::new(EsBatch {
            client: self.client.clone(),
            config: Arc::clone(&self.config),
            index: index.to_string(),
            body: String::new(),
            len: 0,
            start: Instant::now(),
        })
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        // 🔍 HEAD the index. 200 = lives, 404 = doesn't. Anything else is
        // the cluster having a morning, and we refuse to guess.
        let response = self
            .config
            .apply_auth(self.client.head(self.index_url(index)))
            .send()
            .await
            .context("💀 Asked the cluster whether the index exists. The network declined to carry the question.")?;
        let status = response.status();
        if status.is_success() {
            Ok(true)
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Ok(false)
        } else {
            anyhow::bail!(
                "💀 Existence check for index '{}' came back '{}' — neither yes nor no. Schrödinger's index. We cannot proceed on a maybe.",
                index,
                status
            )
        }
    }

    async fn create_index(&self, index: &str, mapping: &str) -> Result<()> {
        debug!("🏗️ creating index `{index}`");
        self.put_json(&self.index_url(index), mapping.to_string(), "create-index")
            .await
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        debug!("🗑️ deleting existing index `{index}`");
        let response = self
            .config
            .apply_auth(self.client.delete(self.index_url(index)))
            .send()
            .await
            .context("💀 The delete-index request got lost on the way to the cluster")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "💀 Tried to delete index '{}' and the cluster said '{}': '{}'. The index clings to life.",
                index,
                status,
                body
            );
        }
        Ok(())
    }

    async fn put_mapping(&self, index: &str, doc_type: &str, mapping: &str) -> Result<()> {
        // 🗺️ Modern clusters dropped mapping types from the wire; the type
        // tag still rides along in the interface for sinks that want it.
        debug!("🗺️ putting mapping on `{index}` (type tag `{doc_type}`)");
        self.put_json(
            &format!("{}/_mapping", self.index_url(index)),
            mapping.to_string(),
            "put-mapping",
        )
        .await
    }

    async fn enable_replicas(&self, index: &str, num_replicas: u32) -> Result<()> {
        debug!("🔄 enabling {num_replicas} replica(s) for `{index}`");
        let body = serde_json::json!({ "index": { "number_of_replicas": num_replicas } });
        self.put_json(
            &format!("{}/_settings", self.index_url(index)),
            body.to_string(),
            "enable-replicas",
        )
        .await
    }

    async fn set_read_only(&self, index: &str, read_only: bool) -> Result<()> {
        debug!("🔒 setting read_only={read_only} on `{index}`");
        let body = serde_json::json!({ "index": { "blocks": { "read_only": read_only } } });
        self.put_json(
            &format!("{}/_settings", self.index_url(index)),
            body.to_string(),
            "set-read-only",
        )
        .await
    }

    async fn set_block_write(&self, index: &str, block_write: bool) -> Result<()> {
        debug!("🔒 setting blocks.write={block_write} on `{index}`");
        let body = serde_json::json!({ "index": { "blocks": { "write": block_write } } });
        self.put_json(
            &format!("{}/_settings", self.index_url(index)),
            body.to_string(),
            "set-block-write",
        )
        .await
    }
}

/// 📦 One bulk request in the making: an NDJSON body under construction,
/// an item count, and a build-start timestamp for the pacing layer.
///
/// Single-use by construction — `send` takes `Box<Self>` and the batch
/// ceases to exist. There is no flush-and-reuse. There is only the void.
struct EsBatch {
    client: reqwest::Client,
    config: Arc<ElasticsearchConfig>,
    index: String,
    /// 📜 The accumulating NDJSON: action line, newline, source line,
    /// newline, repeat. Rendered eagerly so size accounting is honest.
    body: String,
    len: usize,
    start: Instant,
}

/// 📦 What `_bulk` says back. We care about `took` (the pacing layer feeds
/// on it), `errors` (the tl;dr), and the first item that carries an `error`
/// object (the actual diagnostic).
#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    took: u64,
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<std::collections::HashMap<String, BulkItemStatus>>,
}

#[derive(Debug, Deserialize)]
struct BulkItemStatus {
    #[serde(default)]
    status: u16,
    error: Option<BulkItemError>,
}

#[derive(Debug, Deserialize)]
struct BulkItemError {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    reason: String,
}

impl BulkResponse {
    /// 🔍 Walk the items and surface the FIRST error as a real `anyhow`
    /// error. One is enough — if the mapping is wrong, it's wrong for
    /// everyone, and ten thousand copies of the same reason help nobody.
    fn first_error(&self) -> Option<anyhow::Error> {
        for item in &self.items {
            for status in item.values() {
                if let Some(ref err) = status.error {
                    return Some(anyhow::anyhow!(
                        "bulk item rejected ({}): {}: {}",
                        status.status,
                        err.kind,
                        err.reason
                    ));
                }
            }
        }
        None
    }
}

#[async_trait]
impl Batch for EsBatch {
    fn add(&mut self, _doc_type: &str, id: &str, source: &serde_json::Value) {
        // 📦 Action line first: `{"index":{"_index":...,"_id":...}}`.
        // "index" is the action name, not the index name. Elasticsearch
        // chose the same word for both. Naming things: still hard.
        let action = serde_json::json!({
            "index": { "_index": self.index, "_id": id }
        });
        self.body.push_str(&action.to_string());
        self.body.push('\n');
        // 📜 Source line second, raw. NDJSON: the format for people who
        // wanted JSON but also wanted to feel slightly superior about it.
        self.body.push_str(&source.to_string());
        self.body.push('\n');
        self.len += 1;
    }

    fn estimated_size_bytes(&self) -> u64 {
        // 📏 The body IS the wire payload, so the estimate is exact.
        // Best kind of estimate.
        self.body.len() as u64
    }

    fn len(&self) -> usize {
        self.len
    }

    fn build_millis(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    async fn send(self: Box<Self>) -> (u64, Result<()>) {
        // 📡 The `_bulk` endpoint: Elasticsearch's loading dock.
        let bulk_url = format!("{}/_bulk", self.config.base_url());
        trace!(
            "🚀 sending bulk request: {} docs, {} bytes",
            self.len,
            self.body.len()
        );
        let response = self
            .config
            .apply_auth(self.client.post(&bulk_url))
            // ⚠️ application/x-ndjson, NOT application/json. The cluster
            // returns a 406 or quietly misbehaves without it. The x- prefix
            // means "we made this up but we're committing to it".
            .header("Content-Type", "application/x-ndjson")
            .body(self.body)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            // 💀 Transport-level failure — the payload never arrived. No
            // latency to report; zero is the honest number.
            Err(err) => {
                return (
                    0,
                    Err(anyhow::Error::from(err).context(
                        "💀 The bulk request never made it to the cluster. The network was not vibing with it.",
                    )),
                );
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return (
                0,
                Err(anyhow::anyhow!(
                    "💀 The bulk request arrived, but the cluster looked at our documents and said '{}': '{}'",
                    status,
                    body
                )),
            );
        }

        // 📦 2xx at the HTTP layer still leaves room for per-item rejection.
        // Parse the body; the `took` value feeds the pacing layer either way.
        let parsed: std::result::Result<BulkResponse, _> = response.json().await;
        match parsed {
            Ok(bulk) => {
                if bulk.errors {
                    if let Some(err) = bulk.first_error() {
                        return (bulk.took, Err(err));
                    }
                }
                trace!("✅ bulk request landed in {}ms", bulk.took);
                (bulk.took, Ok(()))
            }
            Err(err) => (
                0,
                Err(anyhow::Error::from(err)
                    .context("💀 The cluster answered 2xx and then sent a body we could not parse. Trust: shaken.")),
            ),
        }
    }
}
