//! 🚀 siphon-cli — the front door, the bouncer, the maitre d' of siphon.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 This binary crate is the thin CLI wrapper that loads config,
//! sets up logging, and then lets the real code do the heavy lifting.
//! Like a manager. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// Streams a remote sensor feed into a metric store, one bounded batch at
/// a time.
#[derive(Debug, Parser)]
#[command(name = "siphon", version, about)]
struct Cli {
    /// Path to a TOML config file. SIPHON_* environment variables always
    /// apply; the file, when present, wins on conflicts.
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,
}

/// 🚀 main() — where it all begins.
///
/// 🔧 Steps:
/// 1. Init tracing (so we can see what goes wrong, and when)
/// 2. Parse args
/// 3. Load config (the moment of truth)
/// 4. Run the pipeline (send it 🙏)
/// 5. Report, or triage the error chain (cry)
#[tokio::main]
async fn main() -> Result<()> {
    // 📡 Set up tracing first; everything after this point deserves logs.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // 🔒 Resolve the config file before getting emotionally attached.
    // Explicit path: must exist. No path: `siphon.toml` if it's there,
    // env-only otherwise.
    let config_path = match cli.config {
        Some(path) => {
            let exists = path.try_exists().context(format!(
                "💀 couldn't even check whether '{}' exists. Maybe a permissions thing, \
                 maybe a cwd thing. An absolute path removes all doubt.",
                path.display()
            ))?;
            if !exists {
                anyhow::bail!(
                    "💀 config file '{}' does not exist. We knocked. Nobody answered.",
                    path.display()
                );
            }
            Some(path)
        }
        None => {
            let fallback = PathBuf::from("siphon.toml");
            fallback.is_file().then_some(fallback)
        }
    };

    let app_config = siphon::app_config::load_config(config_path.as_deref())
        .context("💀 couldn't load the configuration. Check the file, check the SIPHON_* env vars, check the obvious thing first.")?;

    // 🛑 Ctrl-C flips the shutdown flag; the pipeline notices at its next
    // suspension point and bows out without retrying.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Ctrl-C received, asking the pipeline to stop");
            let _ = shutdown_tx.send(true);
        }
    });

    // 🚀 SEND IT. No take-backs.
    match siphon::run(app_config, shutdown_rx).await {
        Ok(report) => {
            println!("{}", render_report(&report));
            Ok(())
        }
        Err(err) => {
            error!("💀 error: {}", err);
            // 🧅 peel the onion of sadness, one layer at a time
            let mut looks_like_connection_trouble = false;
            for cause in err.chain().skip(1) {
                error!("⚠️  cause: {}", cause);
                let cause_str = cause.to_string();
                if cause_str.contains("error sending request")
                    || cause_str.contains("connection refused")
                    || cause_str.contains("Connection refused")
                    || cause_str.contains("tcp connect error")
                    || cause_str.contains("dns error")
                {
                    looks_like_connection_trouble = true;
                }
            }

            // 📡 if it smells like a connection problem, it's probably a
            // connection problem
            if looks_like_connection_trouble {
                error!(
                    "🔧 hint: looks like a service isn't reachable. \
                    Double-check that the feed URL and the metric store are actually up. \
                    If you're using Docker, try: `docker ps` to see what's running, \
                    or `docker compose up -d` to resurrect it. \
                    Even servers need a nudge sometimes. ☕"
                );
            }

            // 🗑️ Exit with prejudice.
            std::process::exit(1);
        }
    }
}

/// 🍽️ The end-of-run summary table. Two columns, no borders, all numbers.
fn render_report(report: &siphon::FetchReport) -> Table {
    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    let rows: [(&str, String); 5] = [
        ("records processed", report.records_processed.to_string()),
        ("documents written", report.documents_written.to_string()),
        ("duplicates skipped", report.duplicates_skipped.to_string()),
        ("batches flushed", report.batches_flushed.to_string()),
        ("records dropped", report.records_dropped.to_string()),
    ];
    for (name, value) in rows {
        table.add_row(vec![
            Cell::new(name),
            Cell::new(value).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}
