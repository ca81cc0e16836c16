//! 🧗 The bulk-size optimizer — hill climbing with the engine running.
//!
//! 🎬 *[a batch size stands at the base of a throughput curve, looking up.]*
//! *[it does not know where the summit is. nobody does. the curve moves.]*
//! *["In a world where 20MiB was a guess... one climber refused to accept it."]*
//!
//! The ideal batch byte size depends on the cluster, the mapping, the
//! documents, the moon phase. So instead of guessing, a background task
//! perturbs the LIVE batch size while ingestion runs, scores each setting by
//! the documents-per-second it actually produces, and climbs toward the best
//! one. Measurement is noisy (it's a live system; everything is noisy), so
//! each comparison is repeated across several trials and settled by vote.
//!
//! 🧠 Knowledge graph:
//! - Three candidates per round: keep the value, step down, step up. The
//!   best-scoring candidate of each trial earns a win; a strict majority of
//!   the possible wins ends the round early. Yes, the majority can be wrong
//!   about a noisy landscape. It's a vote, not a proof. It's cheap and it
//!   works, which is the entire job description.
//! - "Keep" winning means the neighborhood has nothing better → the step
//!   shrinks and the search tightens. A neighbor winning means there's a
//!   slope → move, and the step GROWS to ride it.
//! - The climber halts once `step <= epsilon` and never restarts. One
//!   optimization run per ingestion run, then silence.
//! - Workers pick up the new size at their next batch, never mid-batch.
//!
//! 🦆 The duck asked if this converges to the global maximum. We said it
//! converges to *a* maximum. The duck said that's a local maximum. The duck
//! was informed that production is also a local maximum.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::progress::ProgressCounters;

/// 📏 The live, shared batch byte budget. Workers snapshot it once per
/// batch; the optimizer rewrites it between measurements. The mutex is held
/// for nanoseconds either way.
#[derive(Debug)]
pub struct SharedBulkSize {
    value: Mutex<i64>,
}

impl SharedBulkSize {
    pub fn new(initial: i64) -> Self {
        Self {
            value: Mutex::new(initial),
        }
    }

    /// 📸 Snapshot the current budget. Taken once per batch — a batch never
    /// changes its mind about its own size mid-build.
    pub fn get(&self) -> i64 {
        *self
            .value
            .lock()
            .expect("bulk size cell poisoned by a panicked writer")
    }

    pub fn set(&self, value: i64) {
        *self
            .value
            .lock()
            .expect("bulk size cell poisoned by a panicked writer") = value;
    }
}

/// 🧗 Something the hill climber can tune: a live value and a way to find
/// out how good the world is while that value is in effect.
#[async_trait]
pub(crate) trait Solution: Send + Sync {
    /// 📊 Measure how well the CURRENT value is doing. Slow by design —
    /// real scores come from watching a live system for a while.
    async fn score(&self) -> f64;

    /// 🔢 The live value under optimization.
    fn value(&self) -> i64;

    /// ✏️ Move the live value. Takes effect on the next observer, whoever
    /// that turns out to be.
    fn set_value(&self, value: i64);
}

/// 📊 Scores a bulk size by the documents/second the pipeline moves while
/// that size is live: sample the shared doc counter, wait out the window,
/// sample again, divide.
pub(crate) struct ThroughputSolution {
    bulk_size: Arc<SharedBulkSize>,
    progress: Arc<ProgressCounters>,
    /// ⏱️ measurement window per score. 30s in production; shorter in tests,
    /// because tests have places to be.
    window: Duration,
}

impl ThroughputSolution {
    pub(crate) fn new(
        bulk_size: Arc<SharedBulkSize>,
        progress: Arc<ProgressCounters>,
        window: Duration,
    ) -> Self {
        Self {
            bulk_size,
            progress,
            window,
        }
    }
}

#[async_trait]
impl Solution for ThroughputSolution {
    async fn score(&self) -> f64 {
        let start_docs = self.progress.docs();
        tokio::time::sleep(self.window).await;
        let end_docs = self.progress.docs();
        (end_docs - start_docs) as f64 / self.window.as_secs_f64()
    }

    fn value(&self) -> i64 {
        self.bulk_size.get()
    }

    fn set_value(&self, value: i64) {
        info!("🧗 setting bulk byte size to {value}");
        self.bulk_size.set(value);
    }
}

/// 🧗 Vote-settled hill climber over a noisy score landscape.
///
/// Consumed by [`HillClimber::optimize`] — one climber, one climb. The step
/// mutates as the search breathes in and out; when it drops to `epsilon`
/// the climb is over and the struct is gone.
#[derive(Debug, Clone)]
pub(crate) struct HillClimber {
    acceleration: f64,
    step: f64,
    epsilon: f64,
    min_value: i64,
    max_value: i64,
    number_of_runs: u32,
}

impl HillClimber {
    pub(crate) fn new(
        acceleration: f64,
        step: f64,
        epsilon: f64,
        min_value: i64,
        max_value: i64,
        number_of_runs: u32,
    ) -> Self {
        Self {
            acceleration,
            step,
            epsilon,
            min_value,
            max_value,
            number_of_runs,
        }
    }

    /// 🧗 Climb until the step collapses below epsilon, then stop forever.
    ///
    /// Each round: probe {keep, down, up} for `number_of_runs` trials (or
    /// until one candidate holds a strict majority of the possible wins),
    /// then settle — keep → shrink the step and restore the value; move →
    /// take the winning offset and grow the step.
    pub(crate) async fn optimize(mut self, solution: &dyn Solution) {
        info!("🧗 starting bulk-size optimization run");
        while self.step > self.epsilon {
            let current = solution.value();
            let offset = (self.step * self.acceleration) as i64;
            // "keep" is candidate 0 and evaluated first: on a perfectly flat
            // landscape every strict comparison fails, keep wins every
            // trial, and the step shrinks to termination instead of
            // wandering. Flat landscapes happen. Ask anyone with a cache.
            let candidates = [
                current,
                self.keep_in_bounds(current - offset),
                self.keep_in_bounds(current + offset),
            ];
            let mut wins = [0u32; 3];
            for _ in 0..self.number_of_runs {
                let mut best = 0usize;
                let mut best_score = f64::NEG_INFINITY;
                for (i, &candidate) in candidates.iter().enumerate() {
                    solution.set_value(candidate);
                    let score = solution.score().await;
                    debug!("🧗 value {candidate} scored {score:.3}");
                    if score > best_score {
                        best_score = score;
                        best = i;
                    }
                }
                wins[best] += 1;
                if wins[best] * 2 > self.number_of_runs {
                    // one candidate already holds a strict majority; the
                    // remaining trials cannot change the outcome
                    break;
                }
            }

            // most wins takes it; ties defer to the earlier candidate, so
            // "keep" beats a neighbor it merely drew with
            let mut winner = 0usize;
            for i in 1..wins.len() {
                if wins[i] > wins[winner] {
                    winner = i;
                }
            }
            if winner == 0 {
                debug!("🧗 no better neighbor; tightening step to {}", self.step / self.acceleration);
                solution.set_value(current);
                self.step /= self.acceleration;
            } else {
                debug!("🧗 moving to {}; growing step to {}", candidates[winner], self.step * self.acceleration);
                solution.set_value(candidates[winner]);
                self.step *= self.acceleration;
            }
        }
        info!("🧗 optimization run complete; the value rests where it stands");
    }

    fn keep_in_bounds(&self, value: i64) -> i64 {
        value.clamp(self.min_value, self.max_value)
    }
}
