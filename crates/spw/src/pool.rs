//! 👷 The WorkerPool — a fixed-size crew and a very short conveyor belt.
//!
//! 🎬 *[W workers punch in. the feed hands over one unit at a time.]*
//! *[nobody gets a second unit until they've reported on the first.]*
//! *["In a world of unbounded task spawning... one pool chose a headcount."]*
//!
//! The shape, because the shape is everything:
//!
//! - A **ready channel** (capacity W) where workers report. The very first
//!   report is a hello; every report after that is the outcome of one unit.
//! - A **work channel** (capacity 1, yes, ONE) where the dispatcher places
//!   units. Capacity 1 means the feed is pulled lazily — we never read a
//!   unit from the feed until a worker has actually reported free.
//! - Closing the work channel IS the termination signal. There is no kill
//!   flag, no cancellation token, no secret third channel. Workers drain,
//!   hit the closed channel, and go home.
//!
//! 🧠 Knowledge graph:
//! - First error wins. A worker that fails reports its error and clocks out;
//!   the dispatcher stops feeding, lets in-flight units finish, and returns
//!   that first error. In-flight work is FINISHED, not abandoned — half-sent
//!   batches are worse than slightly-late shutdowns.
//! - `outstanding` counts reports still owed to the dispatcher: W hellos
//!   plus one per dispatched unit. When it hits zero, everyone has spoken.
//! - Ancient proverb: "The pool that spawns per-item has no pool at all."

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::feeds::{ByteSource, Feed};

/// 👷 One unit of work, processed end-to-end: the worker owns the unit's
/// byte stream and drives it all the way through parse, batch, and submit.
///
/// Implementations are cloned once per pool slot, so whatever state they
/// share (threshold tracker, equalizer, sink handle) rides inside `Arc`s.
#[async_trait]
pub(crate) trait UnitWorker: Send + Sync {
    /// 🔨 Consume one unit. `Ok` means the unit is fully ingested or
    /// gracefully skipped; `Err` means the run should stop.
    async fn process(&self, unit: ByteSource) -> Result<()>;
}

/// 👷 Fixed-size pool: `size` workers, one dispatcher, lazy feed pulls.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WorkerPool {
    size: usize,
}

impl WorkerPool {
    /// 🚀 A pool with a fixed headcount. Hiring happens at [`execute`] time;
    /// this just writes the number down.
    ///
    /// [`execute`]: WorkerPool::execute
    pub(crate) fn new(size: usize) -> Self {
        Self { size }
    }

    /// 🏭 Run the feed dry (or die trying). Spawns `size` copies of the
    /// worker, pulls units from the feed one at a time as workers free up,
    /// and returns once every dispatched unit has been reported on.
    ///
    /// Returns the FIRST error observed — a worker failure or a feed
    /// failure, whichever lands first. Subsequent errors lose the race and
    /// are dropped; their story was the same story anyway.
    pub(crate) async fn execute<W>(&self, worker: W, feed: &mut dyn Feed) -> Result<()>
    where
        W: UnitWorker + Clone + 'static,
    {
        let (work_tx, work_rx) = async_channel::bounded::<ByteSource>(1);
        let (ready_tx, ready_rx) = async_channel::bounded::<Result<()>>(self.size);

        debug!("👷 pool spinning up {} worker(s)", self.size);
        let mut crew = Vec::with_capacity(self.size);
        for slot in 0..self.size {
            let worker = worker.clone();
            let work_rx = work_rx.clone();
            let ready_tx = ready_tx.clone();
            crew.push(tokio::spawn(async move {
                // 👋 the hello: one free-slot report before any work arrives
                if ready_tx.send(Ok(())).await.is_err() {
                    return;
                }
                while let Ok(unit) = work_rx.recv().await {
                    let outcome = worker.process(unit).await;
                    let failed = outcome.is_err();
                    if ready_tx.send(outcome).await.is_err() {
                        return;
                    }
                    if failed {
                        // 🪦 this worker's error is in flight to the
                        // dispatcher; it takes no further units
                        warn!("👷 worker slot {slot} clocking out after a failed unit");
                        return;
                    }
                }
            }));
        }
        // only the workers hold senders now, so the ready channel closes
        // itself if the whole crew somehow vanishes
        drop(ready_tx);

        // 🧮 reports still owed: W hellos + one per dispatched unit
        let mut outstanding = self.size;
        let mut first_err: Option<anyhow::Error> = None;
        let mut feed_done = false;
        while outstanding > 0 {
            let report = ready_rx.recv().await;
            outstanding -= 1;
            match report {
                Ok(Ok(())) => {
                    // a worker is free — pull the next unit, if we still want one
                    if first_err.is_none() && !feed_done {
                        match feed.next().await {
                            Ok(Some(unit)) => {
                                if work_tx.send(unit).await.is_ok() {
                                    outstanding += 1;
                                }
                            }
                            Ok(None) => feed_done = true,
                            Err(err) => {
                                first_err = Some(err);
                                feed_done = true;
                            }
                        }
                    }
                }
                Ok(Err(err)) => {
                    // first error wins; the rest finish their units and drain
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                    feed_done = true;
                }
                Err(_) => break,
            }
        }

        // 🔚 closing the work channel is the whole termination protocol
        work_tx.close();
        for handle in crew {
            let _ = handle.await;
        }
        debug!("👷 pool drained; crew of {} has gone home", self.size);
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
