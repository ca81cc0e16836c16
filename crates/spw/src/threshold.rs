//! 🎬 *[a counter ticks upward in a dark room. nobody claps.]*
//! *[somewhere, a malformed JSON line is being born. it doesn't know yet.]*
//! *["In a world where errors accumulate... one tracker dared to do division."]*
//!
//! 🚦 The ThresholdTracker — the circuit breaker of the spillway pipeline.
//!
//! Every parsed document is a success. Every mangled line, every rejected
//! batch, every bulk response with an attitude problem is an error. This
//! module keeps both tallies for the WHOLE run — no resets, no forgiveness,
//! no "let's pretend the last hour didn't happen" — and pulls the plug once
//! the cumulative error ratio crosses the configured limit.
//!
//! 🧠 Knowledge graph:
//! - Ratio = `1 − successes/num_errors`. Yes, errors in the denominator.
//!   It punishes error-heavy runs hard and goes negative when successes
//!   dominate. It is not a probability. Do not put it in a dashboard as one.
//! - Warm-up floor: no verdict until 10 items total. A run that opens with
//!   3 bad lines out of 3 is not a disaster yet. It might just be a header.
//! - The error log is append-only and mutex-guarded; the success counter is
//!   a lock-free atomic bumped once per accepted item at parse time.
//!
//! 🦆 The duck asked what happens when the breaker trips. We said the whole
//! run stops. The duck said that seemed harsh. The duck has never been paged.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::anyhow;

/// ⚖️ Don't pass judgement until at least this many items have been seen.
/// 9 straight errors with 0 successes still gets a pass. Item 10 does not.
const MINIMUM_TO_CHECK: u64 = 10;

/// 🚦 What the tracker thinks the pipeline should do next.
///
/// Two variants. Two futures. One of them involves going home early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// ✅ Keep ingesting. The error ratio is tolerable. For now.
    Continue,
    /// 💀 Stop everything. The ratio crossed the line. The line was configured.
    Abort,
}

impl Verdict {
    /// 🔍 `true` if this verdict means "pack it up".
    pub fn is_abort(self) -> bool {
        matches!(self, Verdict::Abort)
    }
}

/// 🚦 Whole-run, monotonic error-ratio breaker.
///
/// One of these is created at run start, shared by every worker via `Arc`,
/// and discarded at run end. It never resets mid-run. Once it says
/// [`Verdict::Abort`], the pipeline is expected to stop entirely — there is
/// no cooldown, no half-open state, no second chance. This is a breaker in
/// the "main panel of the house" sense, not the "retry with jitter" sense.
///
/// 🔒 Internals: a mutex-guarded append-only error log (stored as rendered
/// strings, context chain included, so the log survives the errors being
/// consumed) plus an atomic success counter. The ratio reads the success
/// counter while still holding the log lock, so each verdict sees a
/// consistent snapshot of both.
#[derive(Debug, Default)]
pub struct ThresholdTracker {
    /// 📜 Every recoverable error this run has ever seen, in arrival order.
    /// Append-only. Monotonic. The receipts.
    errs: Mutex<Vec<String>>,
    /// ✅ One tick per accepted (non-skip) item, counted at parse time —
    /// before the item's batch is anywhere near the sink.
    successes: AtomicU64,
}

impl ThresholdTracker {
    /// 🚀 A fresh tracker: zero errors, zero successes, infinite optimism.
    pub fn new() -> Self {
        Self::default()
    }

    /// 📝 Record a recoverable error and decide whether the run survives it.
    ///
    /// The error is appended to the log unconditionally. The verdict is
    /// [`Verdict::Continue`] while fewer than 10 items (errors + successes)
    /// have been seen, regardless of how ugly the ratio looks — small sample
    /// sizes lie, and we refuse to be lied to. Past the floor, the verdict is
    /// [`Verdict::Abort`] iff `1 − successes/num_errors > threshold`.
    ///
    /// ⚠️ This consumes the error. The log keeps its rendered form (with the
    /// full context chain) for the post-run report; the caller gets a verdict
    /// and, on abort, should return [`ThresholdTracker::overflow_error`] —
    /// the synthetic terminal error — not the original.
    pub fn check_err(&self, err: anyhow::Error, threshold: f64) -> Verdict {
        // 🔒 Lock poisoning here means a worker panicked mid-append. The run
        // is already lost at that point; an honest panic beats a silent one.
        let mut log = self
            .errs
            .lock()
            .expect("threshold error log poisoned by a panicked worker");
        // 📜 {:#} renders the whole anyhow context chain on one line —
        // the 3am reader gets the full story, not just the punchline.
        log.push(format!("{err:#}"));
        let num_errors = log.len() as u64;
        // 📸 Snapshot successes while the log is still locked, so the ratio
        // never mixes "errors from now" with "successes from later".
        let successes = self.successes.load(Ordering::SeqCst);
        drop(log);

        let num_total = num_errors + successes;
        // ⚖️ Warm-up floor: don't fail until a minimum number of items have
        // been processed. Three bad lines in a row proves nothing.
        if num_total < MINIMUM_TO_CHECK {
            return Verdict::Continue;
        }
        let ratio = 1.0 - (successes as f64 / num_errors as f64);
        if ratio > threshold {
            Verdict::Abort
        } else {
            Verdict::Continue
        }
    }

    /// ✅ Count one accepted item. Lock-free, called from every worker, once
    /// per non-skip document at parse time — whether or not its batch has
    /// been sent yet. (Successes are about parsing, not delivery.)
    pub fn add_success(&self) {
        self.successes.fetch_add(1, Ordering::SeqCst);
    }

    /// 🔢 Current success count. Mostly for tests and the morbidly curious.
    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::SeqCst)
    }

    /// 💀 The synthetic abort error — the only error type that deliberately
    /// halts an otherwise-live pipeline. Returned as the run's terminal
    /// error by whichever worker's check observed the crossing.
    pub fn overflow_error(&self, threshold: f64) -> anyhow::Error {
        anyhow!(
            "ratio of errors to successes has surpassed the configured threshold of `{threshold}`"
        )
    }

    /// 📜 Full snapshot of the recoverable-error log, in arrival order.
    pub fn errs(&self) -> Vec<String> {
        self.errs
            .lock()
            .expect("threshold error log poisoned by a panicked worker")
            .clone()
    }

    /// 🎯 `n` evenly strided entries from the error log, original order
    /// preserved — bounded diagnostics without hauling the whole log around.
    ///
    /// Stride is `len/n`; entry `i` of the sample is log entry
    /// `floor(i * stride)`. If the log is shorter than `n`, you get all of it
    /// — we sample errors, we don't invent them. Asking for zero samples
    /// gets zero samples, not the whole log.
    pub fn sample_errs(&self, n: usize) -> Vec<String> {
        if n == 0 {
            return Vec::new();
        }
        let log = self
            .errs
            .lock()
            .expect("threshold error log poisoned by a panicked worker");
        if log.len() < n {
            return log.clone();
        }
        let stride = log.len() as f64 / n as f64;
        (0..n)
            .map(|i| log[(i as f64 * stride).floor() as usize].clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boom() -> anyhow::Error {
        anyhow!("the line would not parse. the line had other plans.")
    }

    #[test]
    fn the_one_where_nine_straight_errors_get_a_pass() {
        let tracker = ThresholdTracker::new();
        // 🧪 warm-up floor: 9 errors, 0 successes, verdict stays Continue
        for _ in 0..9 {
            assert_eq!(tracker.check_err(boom(), 0.01), Verdict::Continue);
        }
        // 💀 the 10th item crosses the floor — now the ratio matters, and
        // with zero successes the ratio is a full 1.0. Abort.
        assert_eq!(tracker.check_err(boom(), 0.01), Verdict::Abort);
    }

    #[test]
    fn the_one_where_the_ratio_sits_right_on_the_fence() {
        // 🧪 3 successes + 7 errors → ratio = 1 − 3/7 ≈ 0.571
        let tracker = ThresholdTracker::new();
        for _ in 0..3 {
            tracker.add_success();
        }
        for _ in 0..6 {
            tracker.check_err(boom(), 0.99);
        }
        // the 7th error tips total to 10 — past the floor, ratio 0.571 > 0.5
        assert_eq!(tracker.check_err(boom(), 0.5), Verdict::Abort);

        // same shape, friendlier threshold: 0.571 < 0.6 → Continue
        let tracker = ThresholdTracker::new();
        for _ in 0..3 {
            tracker.add_success();
        }
        for _ in 0..6 {
            tracker.check_err(boom(), 0.99);
        }
        assert_eq!(tracker.check_err(boom(), 0.6), Verdict::Continue);
    }

    #[test]
    fn the_one_where_successes_drown_out_the_errors() {
        let tracker = ThresholdTracker::new();
        for _ in 0..100 {
            tracker.add_success();
        }
        // 1 − 100/5 is very, very negative. No threshold catches that.
        for _ in 0..5 {
            assert_eq!(tracker.check_err(boom(), 0.0), Verdict::Continue);
        }
    }

    #[test]
    fn the_one_where_sampling_takes_every_tenth_regret() {
        let tracker = ThresholdTracker::new();
        // flood the floor so check_err never aborts mid-setup
        for _ in 0..1000 {
            tracker.add_success();
        }
        for i in 0..100 {
            tracker.check_err(anyhow!("err {i}"), 0.99);
        }
        let sample = tracker.sample_errs(10);
        assert_eq!(sample.len(), 10);
        // stride 100/10 = 10 → entries 0, 10, 20, ... 90, original order
        for (i, entry) in sample.iter().enumerate() {
            assert_eq!(entry, &format!("err {}", i * 10));
        }
    }

    #[test]
    fn the_one_where_the_log_is_smaller_than_the_ask() {
        let tracker = ThresholdTracker::new();
        for _ in 0..100 {
            tracker.add_success();
        }
        for i in 0..3 {
            tracker.check_err(anyhow!("err {i}"), 0.99);
        }
        // asking for 10 out of 3 gets you 3 — sampling, not fabrication
        assert_eq!(tracker.sample_errs(10).len(), 3);
        assert_eq!(tracker.errs().len(), 3);
        // and asking for nothing gets you nothing, not everything
        assert!(tracker.sample_errs(0).is_empty());
    }
}
