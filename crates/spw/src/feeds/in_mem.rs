//! 🧪 The in-memory feed: units that were never on disk and never will be.
//!
//! Hand it a Vec of byte buffers, get back a [`Feed`] that vends them in
//! order as [`Cursor`]-backed streams. Tests use this to drive the whole
//! pipeline without touching a filesystem, which keeps them fast, hermetic,
//! and immune to whatever CI thinks a tmpdir is today.

use std::io::Cursor;

use anyhow::Result;
use async_trait::async_trait;

use crate::feeds::{ByteSource, Feed};
use crate::progress::format_bytes;

/// 🧪 A feed over pre-baked byte buffers, vended front to back.
#[derive(Debug, Default)]
pub struct InMemoryFeed {
    units: Vec<Vec<u8>>,
    index: usize,
}

impl InMemoryFeed {
    /// 🚀 One unit per buffer, vended in the order given.
    pub fn new(units: Vec<Vec<u8>>) -> Self {
        Self { units, index: 0 }
    }

    /// 📜 Convenience: one unit per string. NDJSON goes in here a lot.
    pub fn from_strings<S: Into<String>>(units: impl IntoIterator<Item = S>) -> Self {
        Self::new(
            units
                .into_iter()
                .map(|unit| unit.into().into_bytes())
                .collect(),
        )
    }
}

#[async_trait]
impl Feed for InMemoryFeed {
    async fn next(&mut self) -> Result<Option<ByteSource>> {
        let Some(unit) = self.units.get(self.index) else {
            return Ok(None);
        };
        self.index += 1;
        // Cursor<Vec<u8>> is AsyncRead under tokio; no pump required
        let source: ByteSource = Box::new(Cursor::new(unit.clone()));
        Ok(Some(source))
    }

    fn summary(&self) -> String {
        format!(
            "In-memory feed contains {} units containing {}",
            self.units.len(),
            format_bytes(self.units.iter().map(|u| u.len() as u64).sum())
        )
    }
}
