//! 🔧 App Configuration — the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the
//! fridge. In the junk drawer. Nothing." — every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.
//!
//! Shape: one [`AppConfig`] with four rooms — which feed, which document
//! format, which sink, and the engine knobs. The feed/document/sink
//! sections are externally tagged enums, so the TOML reads like
//! `[feed.File]` / `[sink.Elasticsearch]` and serde does the dispatching.

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::documents::JsonDocumentConfig;
use crate::feeds::FileFeedConfig;
use crate::ingestor::IngestorConfig;
use crate::sinks::ElasticsearchConfig;

/// 🚰 Which feed supplies the bytes.
#[derive(Debug, Deserialize, Clone)]
pub enum FeedConfig {
    /// 📂 walk a directory tree of (optionally compressed) NDJSON files
    File(FileFeedConfig),
    /// 🧪 inline units straight from the config — demos and smoke tests
    InMemory { units: Vec<String> },
}

/// 📄 Which document format turns lines into items.
#[derive(Debug, Deserialize, Clone)]
pub enum DocumentConfig {
    Json(JsonDocumentConfig),
}

/// 🕳️ Which sink receives the batches.
#[derive(Debug, Deserialize, Clone)]
pub enum SinkConfig {
    Elasticsearch(ElasticsearchConfig),
    /// 🧪 the RAM-backed sink — smoke tests, dry runs, trust falls
    InMemory,
}

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub document: DocumentConfig,
    pub sink: SinkConfig,
    pub ingest: IngestorConfig,
}

/// 🚀 Load the config — from a file, from env vars, or from the sheer power
/// of hoping.
///
/// 🔧 Merges environment variables (SPW_*) with an optional TOML file.
/// ALL SPW_ vars are fair game. We don't gatekeep env vars here. This is a
/// safe space. 🦆
///
/// 📐 DESIGN NOTE:
///   - `config_file_name` None → env vars only. No file. No assumptions.
///   - `config_file_name` Some → env vars + TOML, merged. TOML wins.
///
/// 💀 Returns an error if the config is unparseable. Which it will be.
/// Check the error message though — it's contextual, informative, and
/// written with love. Or despair. Hard to tell at 3am.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("SPW_"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (SPW_*). \
             The file exists in our hearts, but apparently not on disk.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (SPW_*). \
                 No file was provided — this one's all on the environment. Classic."
            .to_string(),
    };

    config.extract().context(context_msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn write_test_config(contents: &str) -> std::path::PathBuf {
        let timestamp_of_questionable_life_choices = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("💀 Clock went backwards. Time is a flat bug report.")
            .as_nanos();
        let temp_path = std::env::temp_dir().join(format!(
            "spw_app_config_{timestamp_of_questionable_life_choices}.toml"
        ));
        fs::write(&temp_path, contents)
            .expect("💀 Failed to write test config. The filesystem said 'new phone who dis'.");
        temp_path
    }

    #[test]
    fn the_one_where_the_toml_checks_into_all_four_rooms() {
        let config_path = write_test_config(
            r#"
            [feed.File]
            path = "/data/dump"
            excludes = ["README.md"]
            compression = "gzip"

            [document.Json]
            id_field = "metadata.uuid"
            doc_type = "event"

            [sink.Elasticsearch]
            url = "http://localhost:9200"

            [ingest]
            index = "events"
            num_workers = 4
            threshold = 0.05
            "#,
        );

        let app_config = load_config(Some(config_path.as_path()))
            .expect("💀 A complete config should parse. Figment, we had a deal.");

        match &app_config.feed {
            FeedConfig::File(file) => {
                assert_eq!(file.path, "/data/dump");
                assert_eq!(file.excludes, vec!["README.md"]);
                assert_eq!(file.compression, Some(crate::feeds::Compression::Gzip));
            }
            honestly_who_knows => panic!(
                "💀 Expected a File feed, but serde took us to {honestly_who_knows:?}. Plot twist energy."
            ),
        }
        match &app_config.document {
            DocumentConfig::Json(json) => assert_eq!(json.id_field, "metadata.uuid"),
        }
        assert_eq!(app_config.ingest.index, "events");
        assert_eq!(app_config.ingest.num_workers, 4);
        assert_eq!(app_config.ingest.threshold, 0.05);

        fs::remove_file(config_path)
            .expect("💀 Failed to remove test config. Even the trash has trust issues.");
    }

    #[test]
    fn the_one_where_the_defaults_show_up_uninvited_but_helpful() {
        // note: the unit variant rides as a bare string, not an empty table
        let config_path = write_test_config(
            r#"
            sink = "InMemory"

            [feed.InMemory]
            units = ["{\"id\":\"1\"}"]

            [document.Json]
            id_field = "id"
            doc_type = "datum"

            [ingest]
            index = "events"
            "#,
        );

        let app_config: AppConfig = Figment::new()
            .merge(Toml::file(config_path.as_path()))
            .extract()
            .expect("💀 Defaults should fill the gaps. Serde left us on read otherwise.");

        assert!(app_config.ingest.clear_existing);
        assert_eq!(app_config.ingest.num_workers, 8);
        assert_eq!(app_config.ingest.num_active_connections, 8);
        assert_eq!(app_config.ingest.threshold, 0.01);
        assert_eq!(app_config.ingest.bulk_byte_size, 20 * 1024 * 1024);
        assert!(!app_config.ingest.optimize_bulk_size);
        assert_eq!(app_config.ingest.optimizer.window_secs, 30);

        fs::remove_file(config_path)
            .expect("💀 Failed to remove test config. The janitor quit mid-scene.");
    }

    #[test]
    fn the_one_where_half_a_config_gets_the_full_story() {
        let config_path = write_test_config(
            r#"
            [feed.File]
            path = "/data/dump"
            "#,
        );

        let err = load_config(Some(config_path.as_path()))
            .expect_err("💀 A config missing its sink should not parse");
        // the context string, not "error: error" energy
        assert!(format!("{err:#}").contains("Failed to parse configuration"));

        fs::remove_file(config_path)
            .expect("💀 Failed to remove test config. The janitor quit mid-scene.");
    }
}
