//! 🚰 Feeds — where the bytes come from.
//!
//! A [`Feed`] is an ordered sequence of source units, vended one at a time.
//! Each unit is an owned async byte stream ([`ByteSource`]) that a worker
//! consumes end-to-end: newline-delimited documents go in one side, batches
//! come out the other, and the feed is never asked for unit k+1 until some
//! worker has freed up. Lazy pulls, by construction.
//!
//! # Contract 📜
//! - `next` returns `Ok(Some(unit))` until the stream is dry, then
//!   `Ok(None)` forever after. EOF is a value, not an error. We are not
//!   savages.
//! - `Err` from `next` is terminal — the pool stops dispatching and the
//!   run fails with that error.
//! - Units are vended in a deterministic order, but WORKERS finish them in
//!   whatever order the scheduler feels like. Order of ingestion across
//!   units is explicitly not a thing anyone should rely on.
//!
//! 🧠 Knowledge graph: trait → concrete impls ([`FileFeed`] for real data,
//! [`InMemoryFeed`] for tests), selected once at composition time.

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::AsyncRead;

pub mod file;
pub mod in_mem;

pub use file::{Compression, FileFeed, FileFeedConfig};
pub use in_mem::InMemoryFeed;

/// 🌊 One source unit: an owned, boxed async byte stream. The worker that
/// receives it owns it outright — buffering, draining, and dropping it are
/// all the worker's problem now.
pub type ByteSource = Box<dyn AsyncRead + Send + Unpin>;

/// 🚰 An ordered sequence of source units.
///
/// `&mut self` on `next` is deliberate: a feed is a cursor, exactly one
/// dispatcher drives it, and making that exclusive in the signature means
/// nobody gets creative with sharing it across tasks.
#[async_trait]
pub trait Feed: Send {
    /// ⏭️ Vend the next unit, or `None` when the feed is exhausted.
    async fn next(&mut self) -> Result<Option<ByteSource>>;

    /// 📋 One human-readable line about what this feed is about to deliver.
    /// Logged once at run start, before any byte moves.
    fn summary(&self) -> String;
}
