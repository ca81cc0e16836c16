//! 🌊 The Ingestor — where every other module reports for duty.
//!
//! 🎬 *[a feed clears its throat. a sink checks its watch. eight workers]*
//! *[stretch. somewhere, a hill climber laces its boots.]*
//! *["In a world of individually indexed documents... one engine said 'bulk'."]*
//!
//! The run, start to finish:
//!
//! 1. Log the feed summary. Know what you're in for.
//! 2. Prepare the index: exists? → maybe delete → create with the document's
//!    mapping, or push a mapping update. All lifecycle calls happen HERE,
//!    once, before a single worker exists.
//! 3. Open the equalizer, start the progress display, maybe spawn the
//!    bulk-size climber.
//! 4. Run the pool: workers turn units into size-bounded batches and push
//!    them through the equalizer; the threshold breaker watches everything.
//! 5. Drain the equalizer (every in-flight send resolves; drain errors fold
//!    into the breaker like any other batch error), stop the show, and —
//!    on success — finalize: replicas back on, read-only / block-write
//!    flags as configured.
//!
//! 🧠 Knowledge graph:
//! - Collaborators are ARGUMENTS, not options. An ingestor without a feed
//!   is not a runtime error here; it does not compile. The config struct
//!   carries only values, and `validate()` rejects the nonsense ones before
//!   anything irreversible happens.
//! - Batches count toward progress only when their send completes OK. The
//!   optimizer scores delivered throughput, so this is load-bearing.
//! - The budget is snapshotted once per batch. A batch never changes its
//!   mind about its own size because the climber moved mid-build.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::documents::{Document, DocumentCtor};
use crate::equalizer::{Equalizer, SendCallback};
use crate::feeds::{ByteSource, Feed};
use crate::optimizer::{HillClimber, SharedBulkSize, ThroughputSolution};
use crate::pool::{UnitWorker, WorkerPool};
use crate::progress::{ProgressCounters, ProgressDisplay};
use crate::sinks::{Batch, Sink};
use crate::threshold::ThresholdTracker;

const MIB: i64 = 1024 * 1024;

fn default_clear_existing() -> bool {
    true
}
fn default_num_active_connections() -> usize {
    8
}
fn default_num_workers() -> usize {
    8
}
fn default_num_replicas() -> u32 {
    1
}
fn default_threshold() -> f64 {
    0.01
}
fn default_bulk_byte_size() -> i64 {
    20 * MIB
}
fn default_scan_buffer_size() -> usize {
    2 * 1024 * 1024
}

/// 🧗 Knobs for the background bulk-size search. The defaults climb in
/// 1 MiB strides between 1 MiB and 100 MiB and settle once the stride drops
/// under 64 KiB, scoring each candidate over a 30 second window.
#[derive(Debug, Clone, Deserialize)]
pub struct OptimizerConfig {
    #[serde(default = "OptimizerConfig::default_acceleration")]
    pub acceleration: f64,
    #[serde(default = "OptimizerConfig::default_step")]
    pub step: f64,
    #[serde(default = "OptimizerConfig::default_epsilon")]
    pub epsilon: f64,
    #[serde(default = "OptimizerConfig::default_min_value")]
    pub min_value: i64,
    #[serde(default = "OptimizerConfig::default_max_value")]
    pub max_value: i64,
    #[serde(default = "OptimizerConfig::default_number_of_runs")]
    pub number_of_runs: u32,
    #[serde(default = "OptimizerConfig::default_window_secs")]
    pub window_secs: u64,
}

impl OptimizerConfig {
    fn default_acceleration() -> f64 {
        2.0
    }
    fn default_step() -> f64 {
        MIB as f64
    }
    fn default_epsilon() -> f64 {
        64.0 * 1024.0
    }
    fn default_min_value() -> i64 {
        MIB
    }
    fn default_max_value() -> i64 {
        100 * MIB
    }
    fn default_number_of_runs() -> u32 {
        3
    }
    fn default_window_secs() -> u64 {
        30
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            acceleration: Self::default_acceleration(),
            step: Self::default_step(),
            epsilon: Self::default_epsilon(),
            min_value: Self::default_min_value(),
            max_value: Self::default_max_value(),
            number_of_runs: Self::default_number_of_runs(),
            window_secs: Self::default_window_secs(),
        }
    }
}

/// 🌊 The whole engine's configuration: one struct, built once, validated
/// once, immutable after. No option functions, no builders with amnesia.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestorConfig {
    /// 🏷️ target index name. The one value with no sane default.
    pub index: String,
    /// 🗑️ delete-and-recreate the index before ingesting
    #[serde(default = "default_clear_existing")]
    pub clear_existing: bool,
    /// 🎚️ max concurrent batch submissions (the equalizer's token count)
    #[serde(default = "default_num_active_connections")]
    pub num_active_connections: usize,
    /// 👷 pool headcount
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    /// 🔄 replicas enabled after the load (0 = leave replication alone)
    #[serde(default = "default_num_replicas")]
    pub num_replicas: u32,
    /// 🚦 maximum tolerable cumulative error ratio before abort
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// 📏 initial batch byte budget (the climber's starting point)
    #[serde(default = "default_bulk_byte_size")]
    pub bulk_byte_size: i64,
    /// 📖 per-worker line scan buffer capacity
    #[serde(default = "default_scan_buffer_size")]
    pub scan_buffer_size: usize,
    /// 🗺️ push the document's mapping onto a pre-existing, uncleared index
    #[serde(default)]
    pub update_mapping: bool,
    /// 🔒 flip the index read-only after a successful run
    #[serde(default)]
    pub read_only: bool,
    /// 🔒 block writes (reads stay open) after a successful run
    #[serde(default)]
    pub block_write: bool,
    /// 🧗 let the hill climber tune the batch size while ingesting
    #[serde(default)]
    pub optimize_bulk_size: bool,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
}

impl IngestorConfig {
    /// ⚖️ Reject nonsense before anything irreversible happens. These are
    /// configuration errors: fatal, pre-pool, and never fed to the breaker.
    pub fn validate(&self) -> Result<()> {
        if self.index.is_empty() {
            bail!("ingestor config: `index` is empty — there is nowhere to put the documents");
        }
        if self.num_workers == 0 {
            bail!("ingestor config: `num_workers` is zero — a pool of nobody ingests nothing");
        }
        if self.num_active_connections == 0 {
            bail!(
                "ingestor config: `num_active_connections` is zero — with no admission tokens, \
                every send waits forever"
            );
        }
        if !self.threshold.is_finite() || !(0.0..=1.0).contains(&self.threshold) {
            bail!(
                "ingestor config: `threshold` must be a finite ratio in [0, 1], got {}",
                self.threshold
            );
        }
        if self.bulk_byte_size <= 0 {
            bail!("ingestor config: `bulk_byte_size` must be positive");
        }
        if self.scan_buffer_size == 0 {
            bail!("ingestor config: `scan_buffer_size` must be positive");
        }
        if self.optimize_bulk_size {
            let opt = &self.optimizer;
            if opt.acceleration <= 1.0 {
                bail!("ingestor config: optimizer `acceleration` must exceed 1.0 or the step never moves");
            }
            if opt.step <= 0.0 || opt.epsilon <= 0.0 {
                bail!("ingestor config: optimizer `step` and `epsilon` must be positive");
            }
            if opt.min_value > opt.max_value {
                bail!(
                    "ingestor config: optimizer bounds are inverted ({} > {})",
                    opt.min_value,
                    opt.max_value
                );
            }
            if opt.number_of_runs == 0 || opt.window_secs == 0 {
                bail!("ingestor config: optimizer `number_of_runs` and `window_secs` must be positive");
            }
        }
        Ok(())
    }
}

/// 🌊 The engine. Construct with everything it needs, call
/// [`Ingestor::ingest`] once, read the error log off the side afterwards.
pub struct Ingestor {
    config: IngestorConfig,
    feed: Box<dyn Feed>,
    document_ctor: DocumentCtor,
    sink: Arc<dyn Sink>,
    tracker: Arc<ThresholdTracker>,
}

impl Ingestor {
    /// 🚀 Validates the config and wires the collaborators. Missing
    /// collaborators are a compile error, not a runtime surprise — that's
    /// the whole point of this signature.
    pub fn new(
        config: IngestorConfig,
        feed: Box<dyn Feed>,
        document_ctor: DocumentCtor,
        sink: Arc<dyn Sink>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            feed,
            document_ctor,
            sink,
            tracker: Arc::new(ThresholdTracker::new()),
        })
    }

    /// 🏁 Run the ingestion to completion. One terminal error or success;
    /// the recoverable-error log is on [`Ingestor::doc_errs`] either way.
    pub async fn ingest(&mut self) -> Result<()> {
        info!("{}", self.feed.summary());

        self.prepare_index().await?;

        let equalizer = Equalizer::open(self.config.num_active_connections);
        let progress = Arc::new(ProgressCounters::new());
        let display = ProgressDisplay::start(Arc::clone(&progress));
        let bulk_size = Arc::new(SharedBulkSize::new(self.config.bulk_byte_size));

        // 🧗 the climber runs for the life of the pool and not a tick more
        let climb = if self.config.optimize_bulk_size {
            let opt = &self.config.optimizer;
            let climber = HillClimber::new(
                opt.acceleration,
                opt.step,
                opt.epsilon,
                opt.min_value,
                opt.max_value,
                opt.number_of_runs,
            );
            let solution = ThroughputSolution::new(
                Arc::clone(&bulk_size),
                Arc::clone(&progress),
                Duration::from_secs(opt.window_secs),
            );
            Some(tokio::spawn(async move {
                climber.optimize(&solution).await;
            }))
        } else {
            None
        };

        let worker = BatchWorker {
            index: self.config.index.clone(),
            threshold: self.config.threshold,
            scan_buffer_size: self.config.scan_buffer_size,
            sink: Arc::clone(&self.sink),
            document_ctor: Arc::clone(&self.document_ctor),
            tracker: Arc::clone(&self.tracker),
            equalizer: equalizer.clone(),
            bulk_size: Arc::clone(&bulk_size),
            progress: Arc::clone(&progress),
        };
        let pool = WorkerPool::new(self.config.num_workers);
        let mut run_err = pool.execute(worker, self.feed.as_mut()).await.err();

        // 🏁 drain every in-flight submission. Errors surfacing here are
        // batch errors like any other — fold them into the breaker rather
        // than failing outright; a run can absorb a few late casualties.
        for err in equalizer.close().await {
            let verdict = self.tracker.check_err(err, self.config.threshold);
            if verdict.is_abort() && run_err.is_none() {
                run_err = Some(self.tracker.overflow_error(self.config.threshold));
            }
        }
        if let Some(climb) = climb {
            climb.abort();
        }
        display.finish(run_err.is_none()).await;

        if let Some(err) = run_err {
            return Err(err);
        }
        self.finalize_index().await
    }

    /// 📜 Every recoverable document/batch error from the run, in order.
    pub fn doc_errs(&self) -> Vec<String> {
        self.tracker.errs()
    }

    /// 🎯 An evenly strided sample of the recoverable-error log.
    pub fn sample_doc_errs(&self, n: usize) -> Vec<String> {
        self.tracker.sample_errs(n)
    }

    async fn prepare_index(&self) -> Result<()> {
        let index = &self.config.index;
        let exists = self.sink.index_exists(index).await?;
        if exists && self.config.clear_existing {
            info!("🗑️ deleting existing index `{index}`");
            self.sink
                .delete_index(index)
                .await
                .with_context(|| format!("could not delete existing index `{index}`"))?;
        }

        // the document format knows its own schema; ask it once, here
        let document = (self.document_ctor)()?;
        let mapping = document.mapping().unwrap_or_default();

        if !exists || self.config.clear_existing {
            info!("🏗️ creating index `{index}`");
            self.sink
                .create_index(index, &mapping)
                .await
                .with_context(|| format!("could not create index `{index}`"))?;
        } else if self.config.update_mapping {
            let doc_type = document.doc_type().unwrap_or_default();
            info!("🗺️ updating mapping on index `{index}`");
            self.sink
                .put_mapping(index, &doc_type, &mapping)
                .await
                .with_context(|| format!("could not update mapping on index `{index}`"))?;
        }
        Ok(())
    }

    async fn finalize_index(&self) -> Result<()> {
        let index = &self.config.index;
        if self.config.num_replicas > 0 {
            info!(
                "🔄 enabling {} replica(s) for index `{index}`",
                self.config.num_replicas
            );
            self.sink
                .enable_replicas(index, self.config.num_replicas)
                .await
                .with_context(|| format!("could not enable replicas on index `{index}`"))?;
        }
        self.sink
            .set_read_only(index, self.config.read_only)
            .await
            .with_context(|| format!("could not set the read-only flag on index `{index}`"))?;
        self.sink
            .set_block_write(index, self.config.block_write)
            .await
            .with_context(|| format!("could not set the block-write flag on index `{index}`"))?;
        Ok(())
    }
}

/// 👷 One pool slot's worth of the hot loop: lines in, batches out.
///
/// Cloned once per slot; everything shared rides in `Arc`s (or is an
/// `Equalizer`, which is its own kind of Arc with opinions).
#[derive(Clone)]
struct BatchWorker {
    index: String,
    threshold: f64,
    scan_buffer_size: usize,
    sink: Arc<dyn Sink>,
    document_ctor: DocumentCtor,
    tracker: Arc<ThresholdTracker>,
    equalizer: Equalizer,
    bulk_size: Arc<SharedBulkSize>,
    progress: Arc<ProgressCounters>,
}

impl BatchWorker {
    /// ➕ One line → maybe one item. `Ok(true)` = added, `Ok(false)` = skip
    /// (missing id/type/payload — dropped silently, counted as nothing),
    /// `Err` = parse error for the breaker.
    fn add_line(
        &self,
        document: &mut dyn Document,
        batch: &mut dyn Batch,
        line: &str,
    ) -> Result<bool> {
        document.set_data(line)?;
        let Some(id) = document.id() else {
            return Ok(false);
        };
        let Some(doc_type) = document.doc_type() else {
            return Ok(false);
        };
        let Some(source) = document.source() else {
            return Ok(false);
        };
        batch.add(&doc_type, &id, source);
        Ok(true)
    }
}

#[async_trait]
impl UnitWorker for BatchWorker {
    async fn process(&self, unit: ByteSource) -> Result<()> {
        let mut reader = BufReader::with_capacity(self.scan_buffer_size, unit);
        let mut document = match (self.document_ctor)() {
            Ok(document) => document,
            Err(err) => {
                // a constructor that won't construct is a breaker matter,
                // not an instant run-killer — the unit is skipped either way
                if self.tracker.check_err(err, self.threshold).is_abort() {
                    return Err(self.tracker.overflow_error(self.threshold));
                }
                return Ok(());
            }
        };

        let mut line = String::new();
        let mut unit_done = false;
        while !unit_done {
            // 📸 budget snapshot — the climber may move it between batches,
            // never within one
            let budget = self.bulk_size.get();
            let mut batch = self.sink.new_batch(&self.index);
            let mut docs: u64 = 0;

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        unit_done = true;
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        // a unit whose stream dies mid-read ends gracefully:
                        // log it, check the breaker, ship what we have
                        let err = anyhow!(err).context("source unit stream failed mid-read");
                        if self.tracker.check_err(err, self.threshold).is_abort() {
                            return Err(self.tracker.overflow_error(self.threshold));
                        }
                        unit_done = true;
                        break;
                    }
                }
                let trimmed = line.trim_end_matches('\n').trim_end_matches('\r');
                if trimmed.is_empty() {
                    continue;
                }
                match self.add_line(document.as_mut(), batch.as_mut(), trimmed) {
                    Ok(true) => {
                        docs += 1;
                        self.tracker.add_success();
                        // boundary inclusive: landing exactly ON the budget
                        // triggers the send, same as crossing it
                        if batch.estimated_size_bytes() as i64 >= budget {
                            break;
                        }
                    }
                    Ok(false) => {}
                    Err(err) => {
                        if self.tracker.check_err(err, self.threshold).is_abort() {
                            return Err(self.tracker.overflow_error(self.threshold));
                        }
                    }
                }
            }

            if batch.is_empty() {
                // nothing accumulated — the unit is spent
                return Ok(());
            }

            // snapshot the totals NOW; the callback fires after the async
            // send and must credit what was actually in this batch
            let bytes = batch.estimated_size_bytes();
            let progress = Arc::clone(&self.progress);
            let callback: SendCallback = Box::new(move |outcome: &Result<()>| {
                if outcome.is_ok() {
                    progress.update(bytes, docs);
                }
            });

            // admission errors wear someone else's name tag (relaxed
            // attribution) but they are batch errors all the same — the
            // breaker decides whether the run survives them
            if let Err(err) = self.equalizer.send(batch, Some(callback)).await {
                if self.tracker.check_err(err, self.threshold).is_abort() {
                    return Err(self.tracker.overflow_error(self.threshold));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::{JsonDocumentConfig, JsonLineDocument};
    use crate::feeds::InMemoryFeed;
    use crate::sinks::InMemorySink;

    fn json_ctor() -> DocumentCtor {
        let config = JsonDocumentConfig {
            id_field: "id".to_string(),
            doc_type: "datum".to_string(),
            mapping: Some(r#"{"properties":{}}"#.to_string()),
        };
        Arc::new(move || {
            Ok(Box::new(JsonLineDocument::new(config.clone())) as Box<dyn Document>)
        })
    }

    fn config(index: &str) -> IngestorConfig {
        IngestorConfig {
            index: index.to_string(),
            clear_existing: true,
            num_active_connections: 2,
            num_workers: 2,
            num_replicas: 1,
            threshold: 0.01,
            bulk_byte_size: 20 * MIB,
            scan_buffer_size: 64 * 1024,
            update_mapping: false,
            read_only: false,
            block_write: true,
            optimize_bulk_size: false,
            optimizer: OptimizerConfig::default(),
        }
    }

    fn ndjson(ids: std::ops::Range<u32>) -> String {
        ids.map(|i| format!(r#"{{"id":"{i:04}"}}"#))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[tokio::test]
    async fn the_one_where_the_whole_pipeline_holds_hands() {
        let sink = InMemorySink::new();
        let feed = InMemoryFeed::from_strings([ndjson(0..40), ndjson(40..100)]);
        let mut ingestor = Ingestor::new(
            config("docs"),
            Box::new(feed),
            json_ctor(),
            Arc::new(sink.clone()),
        )
        .expect("💀 a sane config must construct");
        ingestor.ingest().await.expect("💀 a clean run must pass");

        assert_eq!(sink.total_docs().await, 100);
        assert!(sink.indices.lock().await.contains("docs"));
        assert_eq!(*sink.replicas.lock().await, Some(1));
        assert_eq!(*sink.read_only.lock().await, Some(false));
        assert_eq!(*sink.block_write.lock().await, Some(true));
        assert!(ingestor.doc_errs().is_empty());
    }

    #[tokio::test]
    async fn the_one_where_the_budget_boundary_is_inclusive() {
        // each rendered doc is exactly 13 bytes: {"id":"0001"}
        // budget = 2 docs exactly → landing ON the budget sends, so four
        // docs arrive as [2, 2] — not [3, 1], which is what a strict `>`
        // comparison would produce
        let doc_len = r#"{"id":"0001"}"#.len() as i64;
        let sink = InMemorySink::new();
        let feed = InMemoryFeed::from_strings([ndjson(1..5)]);
        let mut cfg = config("docs");
        cfg.num_workers = 1;
        cfg.num_active_connections = 1;
        cfg.bulk_byte_size = 2 * doc_len;
        let mut ingestor = Ingestor::new(
            cfg,
            Box::new(feed),
            json_ctor(),
            Arc::new(sink.clone()),
        )
        .expect("💀 a sane config must construct");
        ingestor.ingest().await.expect("💀 a clean run must pass");

        let received = sink.received.lock().await;
        let shape: Vec<usize> = received.iter().map(|b| b.doc_count).collect();
        assert_eq!(shape, vec![2, 2]);
    }

    #[tokio::test]
    async fn the_one_where_the_breaker_ends_the_run() {
        // a unit of pure garbage: every line is a parse error, zero
        // successes — the breaker trips as soon as the floor is crossed
        let garbage = (0..50)
            .map(|i| format!("not json at all, line {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let sink = InMemorySink::new();
        let feed = InMemoryFeed::from_strings([garbage]);
        let mut ingestor = Ingestor::new(
            config("docs"),
            Box::new(feed),
            json_ctor(),
            Arc::new(sink.clone()),
        )
        .expect("💀 a sane config must construct");
        let err = ingestor
            .ingest()
            .await
            .expect_err("💀 a garbage feed must trip the breaker");
        assert!(format!("{err:#}").contains("surpassed the configured threshold"));
        assert!(ingestor.doc_errs().len() >= 10);
        assert_eq!(sink.total_docs().await, 0);
    }

    #[tokio::test]
    async fn the_one_where_idless_records_slip_away_quietly() {
        // 5 real docs, 3 skips (no id field) — skips count as nothing
        let unit = [
            r#"{"id":"a1","v":1}"#,
            r#"{"v":"no id"}"#,
            r#"{"id":"a2","v":2}"#,
            r#"{"v":"still no id"}"#,
            r#"{"id":"a3","v":3}"#,
            r#"{"id":"a4","v":4}"#,
            r#"{"v":"free spirit"}"#,
            r#"{"id":"a5","v":5}"#,
        ]
        .join("\n");
        let sink = InMemorySink::new();
        let feed = InMemoryFeed::from_strings([unit]);
        let mut ingestor = Ingestor::new(
            config("docs"),
            Box::new(feed),
            json_ctor(),
            Arc::new(sink.clone()),
        )
        .expect("💀 a sane config must construct");
        ingestor.ingest().await.expect("💀 skips are not errors");
        assert_eq!(sink.total_docs().await, 5);
        assert!(ingestor.doc_errs().is_empty());
    }

    #[tokio::test]
    async fn the_one_where_the_feed_brought_nothing() {
        let sink = InMemorySink::new();
        let feed = InMemoryFeed::new(vec![]);
        let mut ingestor = Ingestor::new(
            config("docs"),
            Box::new(feed),
            json_ctor(),
            Arc::new(sink.clone()),
        )
        .expect("💀 a sane config must construct");
        ingestor.ingest().await.expect("💀 an empty feed is a clean run");
        // zero batches, but the lifecycle still ran start to finish
        assert!(sink.received.lock().await.is_empty());
        assert!(sink.indices.lock().await.contains("docs"));
        assert_eq!(*sink.replicas.lock().await, Some(1));
    }

    #[tokio::test]
    async fn the_one_where_one_lost_batch_is_survivable() {
        // one injected send failure against hundreds of successes: the
        // cumulative ratio stays deep underwater, the run completes, and
        // the casualty shows up in the error log
        let sink = InMemorySink::new();
        sink.fail_next_sends(1);
        let doc_len = r#"{"id":"0001"}"#.len() as i64;
        let mut cfg = config("docs");
        cfg.num_workers = 1;
        cfg.num_active_connections = 1;
        cfg.bulk_byte_size = 10 * doc_len;
        let feed = InMemoryFeed::from_strings([ndjson(0..300)]);
        let mut ingestor = Ingestor::new(
            cfg,
            Box::new(feed),
            json_ctor(),
            Arc::new(sink.clone()),
        )
        .expect("💀 a sane config must construct");
        ingestor.ingest().await.expect("💀 one casualty is not a rout");
        assert_eq!(ingestor.doc_errs().len(), 1);
        assert!(ingestor.doc_errs()[0].contains("injected bulk failure"));
        // 300 docs minus the 10 on the doomed batch, minus the 10 on the
        // batch whose admission drew the parked error token and was dropped
        // unsent — the relaxed attribution contract has a body count
        assert_eq!(sink.total_docs().await, 280);
    }

    #[tokio::test]
    async fn the_one_where_an_existing_index_is_shown_the_door() {
        let sink = InMemorySink::new();
        sink.indices.lock().await.insert("docs".to_string());
        let feed = InMemoryFeed::from_strings([ndjson(0..3)]);
        let mut ingestor = Ingestor::new(
            config("docs"),
            Box::new(feed),
            json_ctor(),
            Arc::new(sink.clone()),
        )
        .expect("💀 a sane config must construct");
        ingestor.ingest().await.expect("💀 clear-existing run must pass");
        // deleted, then recreated
        assert!(sink.indices.lock().await.contains("docs"));
        assert_eq!(sink.total_docs().await, 3);
    }

    #[test]
    fn the_one_where_the_config_is_told_no() {
        let mut cfg = config("");
        assert!(cfg.validate().is_err(), "empty index must be rejected");
        cfg = config("docs");
        cfg.num_workers = 0;
        assert!(cfg.validate().is_err(), "zero workers must be rejected");
        cfg = config("docs");
        cfg.threshold = 1.5;
        assert!(cfg.validate().is_err(), "threshold past 1.0 must be rejected");
        cfg = config("docs");
        cfg.threshold = f64::NAN;
        assert!(cfg.validate().is_err(), "NaN threshold must be rejected");
        cfg = config("docs");
        cfg.optimize_bulk_size = true;
        cfg.optimizer.acceleration = 1.0;
        assert!(cfg.validate().is_err(), "unit acceleration must be rejected");
        assert!(config("docs").validate().is_ok());
    }
}
