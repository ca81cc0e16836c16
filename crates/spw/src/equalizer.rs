//! 🎚️ The Equalizer — backpressure as a lifestyle.
//!
//! 🎬 *[a worker finishes a batch. it approaches the velvet rope.]*
//! *[the bouncer checks the token pool. the token pool checks the vibes.]*
//! *["In a world where producers outrun consumers... one channel dared to say 'wait'."]*
//!
//! Two jobs, one module:
//!
//! 1. **Admission** — exactly N tokens exist. A batch may not leave the
//!    building without one. At most N submissions are ever in flight, and
//!    the N+1th caller blocks at the rope until somebody's send completes.
//! 2. **Pacing** — before dispatch, each submission sleeps off the
//!    difference between the sink's average ingest time (mean of the last
//!    64 observed round trips) and the time the worker already spent
//!    building the batch. Producers stay loosely synchronized to the
//!    sink's observed rate instead of bursting ahead and face-planting.
//!
//! ⚠️ THE RELAXED ATTRIBUTION CONTRACT, READ THIS TWICE:
//! sends are asynchronous. The error returned synchronously by a later
//! `send()` call may belong to an EARLIER, unrelated submission whose async
//! task happened to fail around the same time. Tokens carry outcomes, and
//! admission hands you whichever token comes back first. This is
//! intentional, load-bearing, and preserved on purpose — callers must not
//! assume a returned error belongs to the batch they just offered.
//!
//! 🦆 The duck asked which batch the error belonged to. We said "one of
//! them". The duck found this unsatisfying. The duck is not wrong.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use tracing::{debug, trace};

use crate::sinks::Batch;

/// 📏 Number of observed ingest durations kept for the moving average.
const MAX_NUM_RATES: usize = 64;

/// 📞 Optional completion hook, invoked with the submission's outcome once
/// its async send finishes — success or failure, the callback hears it.
pub(crate) type SendCallback = Box<dyn FnOnce(&Result<()>) + Send>;

/// 🎚️ Bounded concurrent admission plus latency-based pacing for batch
/// submissions.
///
/// Internals: a bounded channel holding exactly `size` tokens, where each
/// token is a `Result<()>` — `Ok` when minted or returned by a clean send,
/// `Err` when returned by a failed one. Plus the rolling latency window.
///
/// Clone-able (channel handles and an `Arc` all the way down) so every
/// worker can hold one; [`Equalizer::close`] consumes one handle and drains
/// the whole pool.
#[derive(Debug, Clone)]
pub(crate) struct Equalizer {
    token_tx: async_channel::Sender<Result<()>>,
    token_rx: async_channel::Receiver<Result<()>>,
    /// 📊 the last 64 sink-reported ingest durations, in millis
    rates: Arc<Mutex<VecDeque<u64>>>,
    size: usize,
}

impl Equalizer {
    /// 🚀 Open the equalizer with `size` admission tokens.
    ///
    /// Invariant from here until [`Equalizer::close`]: exactly `size`
    /// tokens exist, split between the channel and in-flight send tasks.
    /// At most `size` batches are in flight at any instant.
    pub(crate) fn open(size: usize) -> Self {
        let (token_tx, token_rx) = async_channel::bounded(size);
        for _ in 0..size {
            // 🔒 capacity == size and nobody else has the sender yet, so
            // this cannot fail. The expect documents the impossibility.
            token_tx
                .try_send(Ok(()))
                .expect("seeding a fresh bounded channel within capacity cannot fail");
        }
        debug!("🎚️ equalizer open with {size} admission token(s)");
        Self {
            token_tx,
            token_rx,
            rates: Arc::new(Mutex::new(VecDeque::with_capacity(MAX_NUM_RATES))),
            size,
        }
    }

    /// 📬 Submit a batch. Blocks until *admitted* — NOT until the sink call
    /// completes; that runs on its own task after admission.
    ///
    /// If the token we draw carries an error from a previously completed
    /// send, that error is returned synchronously right here, the batch is
    /// dropped unsent, and one fresh `Ok` token is re-seeded so the pool
    /// stays at exactly `size` tokens — a token is never consumed twice.
    /// Per the relaxed attribution contract, the returned error likely
    /// belongs to an earlier submission. Do not take it personally.
    pub(crate) async fn send(
        &self,
        batch: Box<dyn Batch>,
        callback: Option<SendCallback>,
    ) -> Result<()> {
        // ⏱️ how long the caller spent building this batch — credited
        // against the pacing sleep, measured before we queue at the rope
        let build_ms = batch.build_millis();

        let token = self
            .token_rx
            .recv()
            .await
            .map_err(|_| anyhow!("equalizer token pool is closed; no further sends accepted"))?;
        if let Err(err) = token {
            // ⚠️ an earlier async send failed and parked its error in the
            // pool. Re-seed a clean token (the pool must hold `size` tokens
            // at all times) and surface the error to whoever asked first.
            let _ = self.token_tx.try_send(Ok(()));
            return Err(err);
        }

        let token_tx = self.token_tx.clone();
        let rates = Arc::clone(&self.rates);
        tokio::spawn(async move {
            throttle(&rates, build_ms).await;
            let (took, outcome) = batch.send().await;
            if let Some(callback) = callback {
                callback(&outcome);
            }
            measure(&rates, took);
            // 🎟️ return the token, outcome riding along. If the channel is
            // already closed we are past the drain and the outcome has no
            // audience left — nothing useful remains to do with it.
            let _ = token_tx.send(outcome).await;
        });
        Ok(())
    }

    /// 🏁 Drain-then-close. Receives exactly `size` tokens — which means
    /// waiting out every in-flight send task — collects every error
    /// encountered during the drain, THEN closes the channel, and returns
    /// the error list.
    ///
    /// ⚠️ Ordering is load-bearing: closing the channel before the drain
    /// completes would strand in-flight tasks trying to return tokens.
    /// Drain first. Close after. Always.
    pub(crate) async fn close(self) -> Vec<anyhow::Error> {
        let mut errs = Vec::new();
        for _ in 0..self.size {
            match self.token_rx.recv().await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => errs.push(err),
                // channel closed under us — another handle already drained;
                // nothing further to collect
                Err(_) => break,
            }
        }
        self.token_rx.close();
        debug!(
            "🏁 equalizer closed: {} token(s) drained, {} error(s) collected",
            self.size,
            errs.len()
        );
        errs
    }
}

/// 😴 Sleep off the difference between the sink's average ingest time and
/// the time already spent building the payload. Positive remainder only —
/// if the worker was slower than the sink, the sink is ready; go.
async fn throttle(rates: &Mutex<VecDeque<u64>>, build_ms: u64) {
    let avg = {
        let rates = rates
            .lock()
            .expect("rate history poisoned by a panicked send task");
        if rates.is_empty() {
            // 📭 no observations yet — first batches ride free
            return;
        }
        rates.iter().sum::<u64>() as f64 / rates.len() as f64
    };
    let delta = avg - build_ms as f64;
    if delta > 0.0 {
        trace!("😴 throttling submission for {delta:.0}ms");
        tokio::time::sleep(std::time::Duration::from_millis(delta as u64)).await;
    }
}

/// 📊 Append an observed ingest duration, evicting the oldest past 64.
fn measure(rates: &Mutex<VecDeque<u64>>, took_ms: u64) {
    let mut rates = rates
        .lock()
        .expect("rate history poisoned by a panicked send task");
    rates.push_back(took_ms);
    if rates.len() > MAX_NUM_RATES {
        rates.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::{InMemorySink, Sink};
    use std::time::Duration;

    fn small_batch(sink: &InMemorySink) -> Box<dyn Batch> {
        let mut batch = sink.new_batch("docs");
        batch.add("doc", "x", &serde_json::json!({"n": 1}));
        batch
    }

    #[tokio::test]
    async fn the_one_where_the_rope_holds_at_exactly_n() {
        // 🧪 slow sends, many submissions, and the sink itself counting how
        // many sends ever ran at once — the rope holds at N, no slack
        const N: usize = 3;
        let sink = InMemorySink::new();
        sink.set_latency(Duration::from_millis(50)).await;
        let eq = Equalizer::open(N);
        for _ in 0..12 {
            eq.send(small_batch(&sink), None)
                .await
                .expect("💀 clean sends must admit");
        }
        let errs = eq.close().await;
        assert!(errs.is_empty());
        let high_water = sink.max_concurrent_sends();
        assert!(
            high_water as usize <= N,
            "in-flight high water {high_water} blew past the rope"
        );
        assert_eq!(sink.received.lock().await.len(), 12);
    }

    #[tokio::test]
    async fn the_one_where_close_drains_every_token_and_every_error() {
        const N: usize = 4;
        let sink = InMemorySink::new();
        sink.fail_next_sends(3);
        let eq = Equalizer::open(N);
        for _ in 0..3 {
            // 💣 all three armed sends admit fine; the failures surface later
            eq.send(small_batch(&sink), None)
                .await
                .expect("💀 admission should succeed while tokens are clean");
        }
        let errs = eq.close().await;
        // every error recorded during the drain comes back, all three
        assert_eq!(errs.len(), 3);
        for err in &errs {
            assert!(format!("{err:#}").contains("injected bulk failure"));
        }
    }

    #[tokio::test]
    async fn the_one_where_the_error_belongs_to_somebody_else() {
        let sink = InMemorySink::new();
        sink.fail_next_sends(1);
        let eq = Equalizer::open(1);
        // submission A: admitted, fails asynchronously
        eq.send(small_batch(&sink), None)
            .await
            .expect("💀 A's admission should be clean");
        // give A's task time to park its error in the token pool
        tokio::time::sleep(Duration::from_millis(50)).await;
        // submission B: draws A's error token and gets A's error — the
        // relaxed attribution contract, working as intended
        let err = eq
            .send(small_batch(&sink), None)
            .await
            .expect_err("💀 B must surface A's parked error");
        assert!(format!("{err:#}").contains("injected bulk failure"));
        // the re-seeded token keeps the pool whole: close still drains
        // exactly N without hanging
        let errs = eq.close().await;
        assert!(errs.is_empty(), "B consumed the error; drain sees none");
    }

    #[tokio::test]
    async fn the_one_where_the_callback_hears_about_it_either_way() {
        let sink = InMemorySink::new();
        sink.fail_next_sends(1);
        let eq = Equalizer::open(2);
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..2 {
            let outcomes = Arc::clone(&outcomes);
            let callback: SendCallback = Box::new(move |outcome: &Result<()>| {
                outcomes
                    .lock()
                    .expect("test outcome log poisoned")
                    .push(outcome.is_ok());
            });
            eq.send(small_batch(&sink), Some(callback))
                .await
                .expect("💀 both admissions are clean");
        }
        let _ = eq.close().await;
        let outcomes = outcomes.lock().expect("test outcome log poisoned");
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.contains(&true));
        assert!(outcomes.contains(&false));
    }

    #[test]
    fn the_one_where_the_window_evicts_its_elders() {
        let rates = Mutex::new(VecDeque::new());
        for ms in 0..100u64 {
            measure(&rates, ms);
        }
        let rates = rates.lock().expect("rate history poisoned");
        assert_eq!(rates.len(), MAX_NUM_RATES);
        // oldest 36 evicted; front should be 36, back 99
        assert_eq!(*rates.front().expect("non-empty"), 36);
        assert_eq!(*rates.back().expect("non-empty"), 99);
    }
}
