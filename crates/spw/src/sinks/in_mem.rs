//! # Previously, on Spillway...
//!
//! 🎬 The pipeline needed somewhere to pour documents that wasn't a real
//! cluster, because real clusters cost money and hold grudges. Someone had
//! to write a sink so simple it lives entirely in RAM, gone the moment you
//! blink. That someone was this module.
//!
//! `in_mem` provides an in-memory [`Sink`] for tests and local development.
//! It records every batch it receives behind an `Arc<Mutex<...>>` so tests
//! can inspect what arrived — great for assertions, great for trust issues,
//! great for both. It can also be told to FAIL the next k sends, which is
//! how the threshold breaker and the equalizer's drain path get exercised
//! without sacrificing a real index to science.
//!
//! 🦆
//!
//! ⚠️ This is NOT for production. If you're deploying this to prod, the
//! documents go to RAM and the RAM goes to the OS and the OS tells no one.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::sinks::{Batch, Sink};

/// 📦 One delivered batch, flattened to what tests actually assert on.
#[derive(Debug, Clone)]
pub struct ReceivedBatch {
    /// 🏷️ the index the batch targeted
    pub index: String,
    /// 🔢 how many documents rode in it
    pub doc_count: usize,
    /// 📏 the batch's estimated size at send time
    pub bytes: u64,
    /// 📜 the rendered payload lines, `(id, source)` per document
    pub docs: Vec<(String, String)>,
}

/// 📦 A sink that never forgets. Every batch it receives goes into a shared
/// Vec; every lifecycle call flips a little flag the tests can peek at.
///
/// 🔒 The `Arc<Mutex<Vec<...>>>` is an existential nesting doll: shared
/// ownership of a thing that must be touched one task at a time, and the
/// thing is a list of other things. Clone-able because tests need to keep a
/// handle after feeding `self` to the pipeline — every clone sees the same
/// Vec. Communal data, but in a good way.
#[derive(Debug, Default, Clone)]
pub struct InMemorySink {
    /// 🗄️ The evidence locker. The "I told you I received that batch" proof.
    pub received: Arc<Mutex<Vec<ReceivedBatch>>>,
    /// 🗂️ Indices that currently "exist". create adds, delete removes.
    pub indices: Arc<Mutex<HashSet<String>>>,
    /// 🔄 Replica count last set by `enable_replicas`, if any.
    pub replicas: Arc<Mutex<Option<u32>>>,
    /// 🔒 The last read_only / block_write values, for finalize assertions.
    pub read_only: Arc<Mutex<Option<bool>>>,
    pub block_write: Arc<Mutex<Option<bool>>>,
    /// 💣 Fail the next N sends with an injected error, then behave again.
    /// The chaos knob. Turn gently.
    fail_next: Arc<AtomicU32>,
    /// 🐢 Artificial per-send latency, for tests that need sends to overlap.
    latency: Arc<Mutex<Duration>>,
    /// 📊 Sends currently inside [`Batch::send`], plus the run's high-water
    /// mark — lets tests assert how many batches truly overlapped, measured
    /// at the sink instead of inferred from the outside.
    in_flight: Arc<AtomicU32>,
    send_high_water: Arc<AtomicU32>,
}

impl InMemorySink {
    /// 🚀 A fresh sink: empty locker, no indices, zero chaos.
    pub fn new() -> Self {
        Self::default()
    }

    /// 💣 Arm the chaos knob: the next `n` sends return an injected error.
    pub fn fail_next_sends(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// 🐢 Make every send take at least this long. For tests that need
    /// several batches in flight at once.
    pub async fn set_latency(&self, latency: Duration) {
        *self.latency.lock().await = latency;
    }

    /// 🔢 Total documents across every received batch.
    pub async fn total_docs(&self) -> usize {
        self.received.lock().await.iter().map(|b| b.doc_count).sum()
    }

    /// 📊 The most sends ever observed running at the same instant.
    pub fn max_concurrent_sends(&self) -> u32 {
        self.send_high_water.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sink for InMemorySink {
    fn new_batch(&self, index: &str) -> Box<dyn Batch> {
        Box::new(InMemoryBatch {
            sink: self.clone(),
            index: index.to_string(),
            docs: Vec::new(),
            size_bytes: 0,
            start: Instant::now(),
        })
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        Ok(self.indices.lock().await.contains(index))
    }

    async fn create_index(&self, index: &str, _mapping: &str) -> Result<()> {
        self.indices.lock().await.insert(index.to_string());
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        self.indices.lock().await.remove(index);
        Ok(())
    }

    async fn put_mapping(&self, _index: &str, _doc_type: &str, _mapping: &str) -> Result<()> {
        // 🗺️ RAM accepts all mappings. RAM is easygoing like that.
        Ok(())
    }

    async fn enable_replicas(&self, _index: &str, num_replicas: u32) -> Result<()> {
        *self.replicas.lock().await = Some(num_replicas);
        Ok(())
    }

    async fn set_read_only(&self, _index: &str, read_only: bool) -> Result<()> {
        *self.read_only.lock().await = Some(read_only);
        Ok(())
    }

    async fn set_block_write(&self, _index: &str, block_write: bool) -> Result<()> {
        *self.block_write.lock().await = Some(block_write);
        Ok(())
    }
}

/// 📦 The in-memory batch: documents, a byte count, and a build clock.
///
/// 📏 Size accounting is deliberately boring: the rendered source length,
/// nothing else. Tests that exercise the byte-budget boundary lean on this
/// being predictable, so keep it predictable.
struct InMemoryBatch {
    sink: InMemorySink,
    index: String,
    docs: Vec<(String, String)>,
    size_bytes: u64,
    start: Instant,
}

#[async_trait]
impl Batch for InMemoryBatch {
    fn add(&mut self, _doc_type: &str, id: &str, source: &serde_json::Value) {
        let rendered = source.to_string();
        self.size_bytes += rendered.len() as u64;
        self.docs.push((id.to_string(), rendered));
    }

    fn estimated_size_bytes(&self) -> u64 {
        self.size_bytes
    }

    fn len(&self) -> usize {
        self.docs.len()
    }

    fn build_millis(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    async fn send(self: Box<Self>) -> (u64, Result<()>) {
        let sink = self.sink.clone();
        let concurrent = sink.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        sink.send_high_water.fetch_max(concurrent, Ordering::SeqCst);

        let latency = *sink.latency.lock().await;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let took = latency.as_millis() as u64;

        // 💣 chaos knob check — decrement-if-armed, fail if we got a charge
        let armed = sink
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let outcome = if armed {
            Err(anyhow!("injected bulk failure (by request)"))
        } else {
            sink.received.lock().await.push(ReceivedBatch {
                index: self.index,
                doc_count: self.docs.len(),
                bytes: self.size_bytes,
                docs: self.docs,
            });
            Ok(())
        };

        sink.in_flight.fetch_sub(1, Ordering::SeqCst);
        (took, outcome)
    }
}
