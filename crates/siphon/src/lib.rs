//! 🚀 siphon — streams a remote sensor feed into a metric store.
//!
//! 🎬 *[a URL. a store. between them: several gigabytes of JSON array
//! that will not fit in memory and would not apologize if it did.]*
//!
//! The library's whole public surface is [`run`]: load a config, hand it
//! over with a shutdown handle, get back a [`FetchReport`] or a terminal
//! error. Inside, a chunk-tolerant scanner peels records off the stream,
//! a transformer fans each record out into metric documents, and a batch
//! writer lands them in bounded bulk inserts while the stream keeps
//! flowing. Transport failures restart the whole pipeline with
//! exponential backoff; everything else fails honestly.
//!
//! 🦆 (one duck per crate, minimum. this is the crate's.)

pub mod app_config;
pub mod common;
pub mod events;
pub mod scanners;
pub mod stores;
pub mod transforms;

mod fetcher;
mod progress;
mod writer;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::warn;

use crate::app_config::AppConfig;
use crate::events::{EventPublisher, PublisherBackend};
use crate::fetcher::FetchOrchestrator;

pub use crate::common::FetchReport;

/// 🚀 Run one fetch-and-ingest cycle.
///
/// Constructs the event publisher with an explicit lifecycle, wires it
/// into the orchestrator, runs the pipeline, and closes the publisher on
/// the way out whatever happened. The `shutdown` receiver is honored at
/// every suspension point; flipping it to `true` abandons the in-flight
/// attempt and skips any remaining retries.
pub async fn run(app_config: AppConfig, shutdown: watch::Receiver<bool>) -> Result<FetchReport> {
    let publisher = PublisherBackend::connect(&app_config.publisher)
        .await
        .context("💀 could not set up the event publisher")?;

    let orchestrator = FetchOrchestrator::new(
        app_config.fetcher,
        app_config.store,
        publisher.clone(),
        shutdown,
    )?;

    let report = orchestrator.fetch_and_ingest().await;

    if let Err(close_err) = publisher.close().await {
        warn!("📣 publisher close failed: {close_err:#}");
    }

    report
}
