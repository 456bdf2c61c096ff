//! 📡 The fetch orchestrator: the one module that owns a whole attempt.
//!
//! 🎬 COLD OPEN — INT. SERVER ROOM — 3:47 AM
//!
//! The feed is eleven million records behind one GET request. The store is
//! three hops away and moody. Between them stands this module, holding a
//! scanner in one hand and a batch writer in the other, prepared to do the
//! entire thing over again from byte zero if the network so much as
//! sneezes. It has done this before. It will do it again. It keeps count.
//!
//! Pipeline, per attempt:
//!
//! ```text
//! HTTP chunk → JsonArrayScanner → SensorReading → expand() → BatchWriter → store
//! ```
//!
//! Backpressure is structural: the next chunk is only awaited after the
//! current chunk's processing (scan, expand, buffer) has finished, so the
//! stream can never outrun the writer's buffer. Retries restart the whole
//! pipeline from a fresh request; there is no resume-from-offset, and
//! partial state never survives an attempt.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::app_config::{FetcherConfig, StoreConfig};
use crate::common::FetchReport;
use crate::events::{DataFetchEvent, EventPublisher, PublisherBackend};
use crate::progress::IngestGauge;
use crate::scanners::JsonArrayScanner;
use crate::stores::{MetricStore, StoreBackend};
use crate::transforms::{SensorReading, expand};
use crate::writer::BatchWriter;

/// ⏱️ Exponential backoff: `base * 2^attempt`. 1s, 2s, 4s with the stock
/// base. The shift is capped so a misconfigured retry count can't wrap.
pub(crate) fn backoff_delay(attempt: u32, base_ms: u64) -> Duration {
    Duration::from_millis(base_ms.saturating_mul(1u64 << attempt.min(16)))
}

/// 🔍 Is this the kind of failure where doing the whole thing again might
/// actually work?
///
/// Transport-level trouble (refused, reset, aborted, timed out, DNS having
/// a day) is recoverable. Everything else, including a store that answers
/// with a real HTTP error, is not; retrying a 500 with the same payload is
/// just scheduling a second 500.
pub(crate) fn is_recoverable(err: &anyhow::Error) -> bool {
    for cause in err.chain() {
        if let Some(request_err) = cause.downcast_ref::<reqwest::Error>() {
            if request_err.is_connect() || request_err.is_timeout() {
                return true;
            }
        }
        if let Some(io_err) = cause.downcast_ref::<std::io::Error>() {
            if matches!(
                io_err.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
    }

    // 🕵️ Fallback net: sniff the rendered chain the way the CLI does for
    // its connectivity hint. Error types don't always survive the trip
    // through every wrapper, but the words usually do.
    let rendered = format!("{err:#}").to_ascii_lowercase();
    [
        "connection reset",
        "connection refused",
        "connection aborted",
        "connection closed",
        "broken pipe",
        "timed out",
        "timeout",
        "error sending request",
        "tcp connect error",
        "dns error",
        "incomplete message",
    ]
    .iter()
    .any(|needle| rendered.contains(needle))
}

/// Resolves when shutdown is requested; never resolves if it never is.
async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            // Sender gone means nobody can ever ask us to stop.
            std::future::pending::<()>().await;
        }
    }
}

/// 📡 Owns the fetch lifecycle: connect, stream, flush, retry, notify.
///
/// One orchestrator per logical fetch. Concurrent `fetch_and_ingest` calls
/// against the same collection would race on labels; the caller is expected
/// to issue one at a time, and we do not police it here.
#[derive(Debug)]
pub(crate) struct FetchOrchestrator {
    config: FetcherConfig,
    store_config: StoreConfig,
    publisher: PublisherBackend,
    shutdown: watch::Receiver<bool>,
    client: reqwest::Client,
}

impl FetchOrchestrator {
    /// 🚀 Build the orchestrator and its HTTP client.
    ///
    /// Connect timeout only. The body is allowed to take as long as it
    /// takes; a response-size limit or overall deadline would just turn
    /// every large feed into a guaranteed failure.
    pub(crate) fn new(
        config: FetcherConfig,
        store_config: StoreConfig,
        publisher: PublisherBackend,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .context("💀 the fetcher's HTTP client refused to be born")?;

        Ok(Self {
            config,
            store_config,
            publisher,
            shutdown,
            client,
        })
    }

    /// 🚀 Fetch the feed and ingest it, retrying transport failures.
    ///
    /// Terminal success returns the run report; terminal failure returns a
    /// single error naming the attempts made. Either way, exactly one
    /// completion event goes out (fire-and-forget: a deaf publisher is a
    /// warning, never a failure).
    pub(crate) async fn fetch_and_ingest(&self) -> Result<FetchReport> {
        let mut attempt: u32 = 0;
        let outcome = loop {
            match self.run_attempt(attempt).await {
                Ok(report) => break Ok(report),
                Err(err) if *self.shutdown.borrow() => {
                    break Err(err.context("🛑 shutdown requested, abandoning the fetch"));
                }
                Err(err) if is_recoverable(&err) && attempt < self.config.max_retries => {
                    let delay = backoff_delay(attempt, self.config.base_backoff_ms);
                    warn!(
                        "🔄 attempt {} failed on a transport error, retrying in {:?}: {err:#}",
                        attempt + 1,
                        delay
                    );
                    if !self.sleep_unless_shutdown(delay).await {
                        break Err(err.context("🛑 shutdown requested during backoff"));
                    }
                    attempt += 1;
                }
                Err(err) => {
                    break Err(err.context(format!(
                        "💀 fetch failed for good after {} attempt(s)",
                        attempt + 1
                    )));
                }
            }
        };

        // 📣 One completion event per terminal outcome, success or not.
        let event = match &outcome {
            Ok(report) => DataFetchEvent::success(&self.config.url, report.records_processed),
            Err(err) => DataFetchEvent::failure(&self.config.url, format!("{err:#}")),
        };
        if let Err(publish_err) = self.publisher.publish(&event).await {
            warn!("📣 completion event went nowhere: {publish_err:#}");
        }

        outcome
    }

    /// One full pipeline attempt: store session, stream, final flush.
    ///
    /// The store session is scoped to the attempt; whatever happens, it is
    /// closed before the orchestrator decides about retries.
    async fn run_attempt(&self, attempt: u32) -> Result<FetchReport> {
        debug!("📡 attempt {} against {}", attempt + 1, self.config.url);
        let store = StoreBackend::connect(&self.store_config)
            .await
            .context("💀 could not open a store session")?;

        let result = self.stream_into(&store).await;

        if let Err(close_err) = store.close().await {
            warn!("🔌 store session close failed: {close_err:#}");
        }
        result
    }

    /// The streaming heart: chunks in, batches out.
    async fn stream_into(&self, store: &StoreBackend) -> Result<FetchReport> {
        let response = self
            .client
            .get(&self.config.url)
            .header("Accept", "application/json")
            .header("Connection", "keep-alive")
            .send()
            .await
            .context("💀 could not open the feed stream")?;

        let status = response.status();
        if !status.is_success() {
            bail!("💀 the feed answered '{status}' before we read a single byte");
        }

        let mut gauge = IngestGauge::new(response.content_length().unwrap_or(0));
        let mut stream = response.bytes_stream();

        // 🏗️ Fresh per attempt, discarded with it. Nothing here survives
        // into a retry; that is a feature, not an oversight.
        let mut scanner = JsonArrayScanner::new();
        let mut writer = BatchWriter::new(store.clone(), self.config.batch_size);
        let mut records_processed: u64 = 0;
        let mut ordinal: u64 = 0;
        let mut readings_dropped: u64 = 0;

        let shutdown_fut = wait_for_shutdown(self.shutdown.clone());
        tokio::pin!(shutdown_fut);

        loop {
            let chunk = tokio::select! {
                biased;
                _ = &mut shutdown_fut => bail!("🛑 shutdown requested mid-stream"),
                next = stream.next() => match next {
                    Some(chunk) => chunk.context("💀 the feed stream broke mid-body")?,
                    None => break,
                },
            };

            let mut records_in_chunk: u64 = 0;
            for object in scanner.feed(&chunk) {
                let reading = match serde_json::from_value::<SensorReading>(object) {
                    Ok(reading) => reading,
                    Err(err) => {
                        // 🗑️ Valid JSON, wrong shape. Same fate as invalid
                        // JSON: dropped, counted, scan continues.
                        readings_dropped += 1;
                        ordinal += 1;
                        warn!("🗑️ dropped a reading that wouldn't deserialize: {err}");
                        continue;
                    }
                };

                let documents = expand(&reading, ordinal, Utc::now());
                ordinal += 1;
                if documents.is_empty() {
                    continue;
                }
                records_processed += 1;
                records_in_chunk += 1;
                for document in documents {
                    writer.add(document);
                    writer.flush_if_full();
                }
            }

            // 🔍 Background flushes that failed while we were scanning
            // surface here and abort the attempt.
            writer.poll_failures()?;
            gauge.update(chunk.len() as u64, records_in_chunk);
        }

        scanner
            .finish()
            .context("💀 the feed ended with a truncated record")?;
        let dropped = readings_dropped + scanner.dropped();

        let (totals, batches_flushed) = writer.finish().await?;
        gauge.finish();

        info!(
            "✅ ingested {} record(s): {} document(s) written, {} duplicate(s) skipped, {} batch(es)",
            records_processed, totals.inserted, totals.duplicates, batches_flushed
        );

        Ok(FetchReport {
            records_processed,
            documents_written: totals.inserted,
            duplicates_skipped: totals.duplicates,
            batches_flushed,
            records_dropped: dropped,
        })
    }

    /// ⏱️ Backoff nap. Returns false if shutdown interrupted it.
    async fn sleep_unless_shutdown(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = wait_for_shutdown(self.shutdown.clone()) => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
