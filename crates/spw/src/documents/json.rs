//! 📄 The JSON line document — NDJSON's best and only friend here.
//!
//! One line = one JSON object = one item. The id lives somewhere inside the
//! object, addressed by a dot path ("user.id" means `obj.user.id`), because
//! upstream systems never put the id where you'd want it and never will.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::documents::Document;

/// 📄 Config for the JSON line document. Serde-friendly so it loads straight
/// out of the app config.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonDocumentConfig {
    /// 🆔 dot path to the id field inside each object, e.g. "id" or
    /// "metadata.uuid". A record without it is a skip, not an error.
    pub id_field: String,
    /// 🏷️ the type tag stamped on every item this document produces
    pub doc_type: String,
    /// 🗺️ optional index mapping body, applied once at prepare time
    #[serde(default)]
    pub mapping: Option<String>,
}

/// 📄 A reusable NDJSON line parser: `set_data` refills it, the getters
/// pick it apart.
pub struct JsonLineDocument {
    config: JsonDocumentConfig,
    data: Option<Value>,
}

impl JsonLineDocument {
    pub fn new(config: JsonDocumentConfig) -> Self {
        Self { config, data: None }
    }

    /// 🧭 Walk the dot path through nested objects. Any missing key or
    /// non-object intermediate ends the walk empty-handed.
    fn lookup(&self, path: &str) -> Option<&Value> {
        let mut current = self.data.as_ref()?;
        for key in path.split('.') {
            current = current.as_object()?.get(key)?;
        }
        Some(current)
    }
}

impl Document for JsonLineDocument {
    fn set_data(&mut self, line: &str) -> Result<()> {
        let parsed: Value = serde_json::from_str(line).with_context(|| {
            format!(
                "💀 This line claimed to be JSON. It lied. The first 80 chars \
                of the deception: `{}`",
                line.chars().take(80).collect::<String>()
            )
        })?;
        self.data = Some(parsed);
        Ok(())
    }

    fn id(&self) -> Option<String> {
        // strings pass through; numbers get stringified, because upstream
        // systems flip-flop between `"id": "42"` and `"id": 42` freely
        match self.lookup(&self.config.id_field)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn doc_type(&self) -> Option<String> {
        if self.config.doc_type.is_empty() {
            None
        } else {
            Some(self.config.doc_type.clone())
        }
    }

    fn source(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    fn mapping(&self) -> Option<String> {
        self.config.mapping.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id_field: &str) -> JsonLineDocument {
        JsonLineDocument::new(JsonDocumentConfig {
            id_field: id_field.to_string(),
            doc_type: "datum".to_string(),
            mapping: Some(r#"{"properties":{}}"#.to_string()),
        })
    }

    #[test]
    fn the_one_where_the_id_is_exactly_where_promised() {
        let mut d = doc("id");
        d.set_data(r#"{"id":"abc-123","body":"hello"}"#)
            .expect("💀 valid JSON must parse");
        assert_eq!(d.id().as_deref(), Some("abc-123"));
        assert_eq!(d.doc_type().as_deref(), Some("datum"));
        assert!(d.source().is_some());
        assert!(d.mapping().is_some());
    }

    #[test]
    fn the_one_where_the_id_is_three_objects_deep() {
        let mut d = doc("metadata.ids.primary");
        d.set_data(r#"{"metadata":{"ids":{"primary":"deep-7"}},"x":1}"#)
            .expect("💀 valid JSON must parse");
        assert_eq!(d.id().as_deref(), Some("deep-7"));
    }

    #[test]
    fn the_one_where_the_id_is_secretly_a_number() {
        let mut d = doc("id");
        d.set_data(r#"{"id":42}"#).expect("💀 valid JSON must parse");
        assert_eq!(d.id().as_deref(), Some("42"));
    }

    #[test]
    fn the_one_where_the_record_quietly_excuses_itself() {
        let mut d = doc("id");
        // missing id → skip, empty id → skip, wrong-typed id → skip
        for line in [r#"{"body":"no id here"}"#, r#"{"id":""}"#, r#"{"id":[1]}"#] {
            d.set_data(line).expect("💀 valid JSON must parse");
            assert_eq!(d.id(), None, "line {line} should be a skip");
        }
    }

    #[test]
    fn the_one_where_the_line_was_never_json() {
        let mut d = doc("id");
        let err = d
            .set_data("this,is,a,csv,row,actually")
            .expect_err("💀 garbage must fail to parse");
        assert!(format!("{err:#}").contains("claimed to be JSON"));
    }
}
