//! 🚀 spw-cli — the front door, the bouncer, the maitre d' of spillway.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 This binary crate is the thin CLI wrapper that loads config,
//! sets up logging, and then lets the real code do the heavy lifting.
//! Like a manager. 🦆

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use spw::app_config::{AppConfig, FeedConfig, SinkConfig};
use spw::progress::format_bytes;

/// 🌊 Bulk-load NDJSON into a search index, with backpressure and manners.
#[derive(Debug, Parser)]
#[command(name = "spw", version)]
struct Args {
    /// path to the TOML configuration file
    #[arg(default_value = "spw.toml")]
    config: PathBuf,
}

/// 🚀 main() — where it all begins. The genesis. The big bang.
/// The "I pressed F5 and held my breath" moment.
///
/// 🔧 Steps:
/// 1. Init tracing (so we can see what goes wrong, and when)
/// 2. Parse args (clap does the catching)
/// 3. Load config (the moment of truth)
/// 4. Run the thing (send it and pray 🙏)
/// 5. Handle errors (cry, but informatively)
#[tokio::main]
async fn main() -> Result<()> {
    // 📡 Set up tracing — because println! debugging is a lifestyle choice
    // we're trying to move past, like flip phones and cargo shorts
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    // 🔒 Validate the config file exists before we get too emotionally attached
    let config_file = args.config.as_path();
    let config_file_path_which_is_validated_to_exist = match config_file
        .try_exists()
        .with_context(|| format!(
            "💀 Configuration file may not exist, couldn't find it. Double check that it \
            exists, or maybe, it's an issue with pwd/cwd and relative paths. In that case, \
            use an absolute path, to be absolutely certain, you are not messing this up. \
            Was checking here: '{}'",
            config_file.display()
        ))? {
        true => Some(config_file),  // ✅ Found it! Better than finding my car keys
        false => None,              // 💤 Not there. The env vars are on their own.
    };

    // 🔧 Load the config — this is the moment where we find out if the TOML is valid
    // or if someone put a tab where a space should be (looking at you, Kevin)
    let app_config = spw::app_config::load_config(config_file_path_which_is_validated_to_exist)
        .context(
            "💀 In spw-cli, main, we couldn't load the config file, take a look at the file, \
            make sure it's correct. Make sure you didn't forget something obvious, dumas",
        )?;

    print_run_plan(&app_config);

    // 🚀 SEND IT. No take-backs. This is not a drill.
    let result = spw::run(app_config).await;

    // 💀 Error handling: the part where we find out what went wrong
    // and print it in a way that's helpful at 3am
    if let Err(err) = result {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion of sadness, one tear-jerking layer at a time
        let mut the_vibes_are_giving_connection_issues = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            // -- 🕵️ sniff the cause like a truffle pig hunting for connection problems
            let cause_str = cause.to_string();
            if cause_str.contains("error sending request")
                || cause_str.contains("connection refused")
                || cause_str.contains("Connection refused")
                || cause_str.contains("tcp connect error")
                || cause_str.contains("dns error")
            {
                the_vibes_are_giving_connection_issues = true;
            }
        }

        // -- 📡 if it smells like a connection problem, it's probably a connection problem
        // -- like when your wifi icon has full bars but nothing loads
        if the_vibes_are_giving_connection_issues {
            error!(
                "🔧 hint: looks like the sink isn't reachable. \
                Double-check that the backing service (Elasticsearch, etc.) \
                is actually running. If you're using Docker, try: \
                `docker ps` to see what's up, or `docker compose up -d` to resurrect it. \
                Even clusters need a nudge sometimes. ☕"
            );
        }

        // 🗑️ Exit with prejudice. Process exitus maximus.
        std::process::exit(1);
    }

    // ✅ If we got here, everything worked. Pop the champagne. 🍾
    Ok(())
}

/// 🍽️ Print the run plan as a table, so the 3am operator can spot the
/// wrong index name BEFORE it gets deleted, not after.
fn print_run_plan(config: &AppConfig) {
    let feed_desc = match &config.feed {
        FeedConfig::File(file) => format!("files under `{}`", file.path),
        FeedConfig::InMemory { units } => format!("{} in-memory unit(s)", units.len()),
    };
    let sink_desc = match &config.sink {
        SinkConfig::Elasticsearch(es) => format!("elasticsearch @ {}", es.url),
        SinkConfig::InMemory => "in-memory (dry run)".to_string(),
    };

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["knob", "value"]);
    table.add_row(vec!["feed", &feed_desc]);
    table.add_row(vec!["sink", &sink_desc]);
    table.add_row(vec!["index", &config.ingest.index]);
    table.add_row(vec![
        "clear existing".to_string(),
        config.ingest.clear_existing.to_string(),
    ]);
    table.add_row(vec![
        "workers".to_string(),
        config.ingest.num_workers.to_string(),
    ]);
    table.add_row(vec![
        "active connections".to_string(),
        config.ingest.num_active_connections.to_string(),
    ]);
    table.add_row(vec![
        "bulk byte size".to_string(),
        format_bytes(config.ingest.bulk_byte_size.max(0) as u64),
    ]);
    table.add_row(vec![
        "error threshold".to_string(),
        config.ingest.threshold.to_string(),
    ]);
    table.add_row(vec![
        "optimize bulk size".to_string(),
        config.ingest.optimize_bulk_size.to_string(),
    ]);
    info!("🌊 run plan:\n{table}");
}
