//! 🎬 *[documents accumulate. the buffer fills. somewhere, a store waits.]*
//! *[the scan loop does not wait. the scan loop has a stream to drink.]*
//!
//! 🗑️ The BatchWriter: bounded buffering between the scan loop and the store.
//!
//! Intermediate flushes are dispatched as detached tasks so store latency
//! never stalls the stream consumer. Detached does NOT mean forgotten:
//! every flush reports its outcome back over a channel, and the scan loop
//! drains that channel between chunks. A background flush that fails kills
//! the run deterministically instead of dissolving into a log line nobody
//! reads.
//!
//! ⚠️ Flushing is NOT automatic on drop. Call `finish()`. If you don't,
//! the last partial batch silently vanishes and you will spend 45 minutes
//! wondering why the document counts don't match. Ask me how I know.

use anyhow::{Context, Result};
use tracing::{debug, trace};

use crate::common::MetricDocument;
use crate::stores::{InsertSummary, MetricStore, StoreBackend};

/// 🗑️ Accumulates metric documents and flushes them in bounded batches.
///
/// One writer per fetch attempt. It is not shared, it is not Sync, and it
/// never survives a retry; fresh attempt, fresh writer, empty buffer.
#[derive(Debug)]
pub(crate) struct BatchWriter {
    store: StoreBackend,
    batch_size: usize,
    buffer: Vec<MetricDocument>,
    /// Outcomes of detached flushes come home through here.
    results_tx: async_channel::Sender<Result<InsertSummary>>,
    results_rx: async_channel::Receiver<Result<InsertSummary>>,
    /// Background flushes dispatched vs. outcomes absorbed. `finish()`
    /// refuses to return until these two agree.
    dispatched: usize,
    settled: usize,
    totals: InsertSummary,
    batches_flushed: usize,
}

impl BatchWriter {
    pub(crate) fn new(store: StoreBackend, batch_size: usize) -> Self {
        // ✉️ Unbounded on purpose: at most one result per dispatched batch,
        // and the writer outlives every sender clone it hands out.
        let (results_tx, results_rx) = async_channel::unbounded();
        Self {
            store,
            batch_size: batch_size.max(1),
            buffer: Vec::with_capacity(batch_size.max(1)),
            results_tx,
            results_rx,
            dispatched: 0,
            settled: 0,
            totals: InsertSummary::default(),
            batches_flushed: 0,
        }
    }

    /// 📥 Append one document. Costs a push, nothing more.
    pub(crate) fn add(&mut self, document: MetricDocument) {
        self.buffer.push(document);
    }

    /// 🚀 Dispatch a background flush if the buffer just hit the cap.
    ///
    /// Called after every `add`, so the flush fires the moment document
    /// number `batch_size` lands, before the next one is accepted.
    pub(crate) fn flush_if_full(&mut self) {
        if self.buffer.len() >= self.batch_size {
            self.dispatch_background();
        }
    }

    fn dispatch_background(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let documents = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.batch_size));
        let store = self.store.clone();
        let results_tx = self.results_tx.clone();
        self.dispatched += 1;
        self.batches_flushed += 1;
        let batch_len = documents.len();
        trace!("🚀 dispatching background flush of {batch_len} document(s)");

        tokio::spawn(async move {
            let outcome = store.insert_many(documents).await;
            // Receiver gone means the writer already bailed; nothing left
            // to report to.
            let _ = results_tx.send(outcome).await;
        });
    }

    /// 🔍 Absorb every background flush that has completed so far.
    ///
    /// The scan loop calls this between chunks. A failed flush surfaces
    /// here as an error and takes the whole attempt down with it.
    pub(crate) fn poll_failures(&mut self) -> Result<()> {
        while let Ok(outcome) = self.results_rx.try_recv() {
            self.settled += 1;
            let summary = outcome.context("💀 a background batch flush failed mid-stream")?;
            self.totals.absorb(summary);
        }
        Ok(())
    }

    /// 🏁 Flush the remainder and wait for every outstanding batch.
    ///
    /// The final partial batch is awaited directly (the stream is done,
    /// there is nothing left to backpressure). Then the writer sits on the
    /// result channel until every dispatched background flush has reported
    /// in. Returns the aggregate counts and the number of batches flushed.
    pub(crate) async fn finish(mut self) -> Result<(InsertSummary, usize)> {
        if !self.buffer.is_empty() {
            let documents = std::mem::take(&mut self.buffer);
            let batch_len = documents.len();
            self.batches_flushed += 1;
            debug!("🏁 final flush of {batch_len} remaining document(s)");
            let summary = self
                .store
                .insert_many(documents)
                .await
                .context("💀 the final flush stumbled at the finish line")?;
            self.totals.absorb(summary);
        }

        while self.settled < self.dispatched {
            let outcome = self
                .results_rx
                .recv()
                .await
                .context("💀 flush result channel closed with batches still unaccounted for")?;
            self.settled += 1;
            let summary = outcome.context("💀 a background batch flush failed")?;
            self.totals.absorb(summary);
        }

        Ok((self.totals, self.batches_flushed))
    }

    #[cfg(test)]
    pub(crate) fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{MetricDocument, MetricKind};
    use crate::stores::{HttpStore, HttpStoreConfig, InMemoryStore};
    use chrono::DateTime;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn doc(label: &str) -> MetricDocument {
        MetricDocument {
            label: label.to_string(),
            value: 1.0,
            timestamp: DateTime::from_timestamp_millis(0).unwrap(),
            source: "test".to_string(),
            kind: MetricKind::Humidity,
        }
    }

    #[tokio::test]
    async fn the_one_where_the_nth_document_triggers_the_flush() {
        let store = InMemoryStore::new();
        let mut writer = BatchWriter::new(StoreBackend::InMemory(store.clone()), 3);

        for i in 0..2 {
            writer.add(doc(&format!("humidity_test_{i}")));
            writer.flush_if_full();
            assert_eq!(writer.buffered(), i + 1, "no flush before the cap");
        }

        // 🧪 Document number 3 hits the cap: the buffer must be empty
        // again before a 4th document is ever added.
        writer.add(doc("humidity_test_2"));
        writer.flush_if_full();
        assert_eq!(writer.buffered(), 0);

        let (totals, batches) = writer.finish().await.unwrap();
        assert_eq!(totals.inserted, 3);
        assert_eq!(batches, 1);
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn the_one_where_the_remainder_gets_exactly_one_final_flush() {
        let store = InMemoryStore::new();
        let mut writer = BatchWriter::new(StoreBackend::InMemory(store.clone()), 5);

        for i in 0..4 {
            writer.add(doc(&format!("humidity_test_{i}")));
            writer.flush_if_full();
        }
        assert_eq!(writer.buffered(), 4);

        let (totals, batches) = writer.finish().await.unwrap();
        assert_eq!(totals.inserted, 4);
        assert_eq!(batches, 1, "4 < 5 means one flush, at the end, not before");
        assert_eq!(store.len().await, 4);
    }

    #[tokio::test]
    async fn the_one_where_duplicates_do_not_sink_the_batch() {
        let store = InMemoryStore::new();
        let mut writer = BatchWriter::new(StoreBackend::InMemory(store.clone()), 10);

        writer.add(doc("humidity_test_0"));
        writer.add(doc("humidity_test_0"));
        writer.add(doc("humidity_test_1"));

        let (totals, _) = writer.finish().await.unwrap();
        assert_eq!(totals.inserted, 2);
        assert_eq!(totals.duplicates, 1);
    }

    #[tokio::test]
    async fn the_one_where_a_failed_background_flush_is_not_forgotten() {
        // 🧪 Store pings fine, then 500s every bulk insert. The detached
        // flush must come back to haunt finish(), not evaporate.
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/metrics/bulk-insert"))
            .respond_with(ResponseTemplate::new(500).set_body_string("nope"))
            .mount(&server)
            .await;

        let store = HttpStore::connect(HttpStoreConfig {
            url: server.uri(),
            collection: "metrics".into(),
            username: None,
            password: None,
            api_key: None,
        })
        .await
        .unwrap();

        let mut writer = BatchWriter::new(StoreBackend::Http(store), 2);
        writer.add(doc("humidity_test_0"));
        writer.add(doc("humidity_test_1"));
        writer.flush_if_full();
        assert_eq!(writer.buffered(), 0, "background flush was dispatched");

        let err = writer.finish().await.unwrap_err();
        let rendered = format!("{err:#}");
        assert!(rendered.contains("background batch flush failed"), "got: {rendered}");
    }

    #[tokio::test]
    async fn the_one_where_an_empty_writer_finishes_quietly() {
        let store = InMemoryStore::new();
        let writer = BatchWriter::new(StoreBackend::InMemory(store), 5);
        let (totals, batches) = writer.finish().await.unwrap();
        assert_eq!(totals, InsertSummary::default());
        assert_eq!(batches, 0);
    }
}
