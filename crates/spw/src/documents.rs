//! 📄 Documents — one raw line in, one indexable item out. Or a shrug.
//!
//! A [`Document`] turns a raw record (one line of a source unit) into the
//! `(id, type, payload)` triple the sink wants. The trait is deliberately
//! two-phase: `set_data` parses (and can FAIL — parse errors feed the
//! threshold breaker), then the getters extract (and can DECLINE — a `None`
//! id, type, or payload means "skip this one", dropped silently, counted as
//! neither error nor success. Not every line is destined for greatness.)
//!
//! Each worker builds its own document instance through a [`DocumentCtor`]
//! at unit start and reuses it line after line — construction once, parsing
//! many, allocation kept honest.
//!
//! 🧠 Knowledge graph: `mapping()` is consulted exactly once, at
//! index-preparation time, before any worker exists. It rides on the trait
//! because the document format is what knows its own schema.

use std::sync::Arc;

use anyhow::Result;

pub mod json;

pub use json::{JsonDocumentConfig, JsonLineDocument};

/// 📄 A reusable line-to-item converter. One per worker, refilled per line.
pub trait Document: Send {
    /// 📥 Parse one raw record into the document. Failure here is a parse
    /// error — recoverable, logged, counted toward the threshold ratio.
    fn set_data(&mut self, line: &str) -> Result<()>;

    /// 🆔 The item's external id. `None` = skip this record.
    fn id(&self) -> Option<String>;

    /// 🏷️ The item's type tag. `None` = skip this record.
    fn doc_type(&self) -> Option<String>;

    /// 📦 The item's payload. `None` = skip this record.
    fn source(&self) -> Option<&serde_json::Value>;

    /// 🗺️ The index mapping for this document shape, consulted once at
    /// prepare time. `None` = the sink's defaults are somebody's problem.
    fn mapping(&self) -> Option<String>;
}

/// 🏭 Builds a fresh [`Document`] per worker. `Arc`'d so the ingestor can
/// hand the same factory to every pool slot without ceremony.
pub type DocumentCtor = Arc<dyn Fn() -> Result<Box<dyn Document>> + Send + Sync>;
