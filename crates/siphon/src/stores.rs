//! 🔌 Stores, where the documents actually land.
//!
//! 🎭 This module is the casting agency for the metric store seam. Need to
//! bulk-insert into a document store over HTTP? Need a RAM-only store for
//! tests and dry runs? We've got a backend for that. Two, in fact. A very
//! exclusive agency.
//!
//! The trait is deliberately tiny: the pipeline needs exactly "insert many,
//! unordered, tell me what stuck" and "close the session". Everything else
//! the store can do (queries, indexes, existential dread) belongs to other
//! callers and other codebases.
//!
//! 🦆 The duck is here because every module must have one. This is law.

use anyhow::Result;
use async_trait::async_trait;

use crate::common::MetricDocument;

pub(crate) mod http;
pub(crate) mod in_mem;

pub use http::HttpStoreConfig;
pub(crate) use http::HttpStore;
pub(crate) use in_mem::InMemoryStore;

use crate::app_config::StoreConfig;

/// 📊 What a bulk insert has to report: how many documents stuck, and how
/// many bounced off an existing label.
///
/// Duplicates are an outcome, not an error. The pipeline counts them and
/// moves on; only non-duplicate failures abort anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertSummary {
    pub inserted: usize,
    pub duplicates: usize,
}

impl InsertSummary {
    /// 📊 Fold another batch's outcome into this one.
    pub fn absorb(&mut self, other: InsertSummary) {
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
    }
}

/// 🚰 A destination for metric documents.
///
/// # Contract
/// - `insert_many` performs one unordered bulk insert. Individual documents
///   colliding with existing labels are skipped and counted, never raised.
///   Anything else that goes wrong is an error for the whole call.
/// - `close` ends the session. One session per fetch attempt; the caller
///   opens and closes around every attempt, retries included.
#[async_trait]
pub(crate) trait MetricStore: std::fmt::Debug {
    async fn insert_many(&self, documents: Vec<MetricDocument>) -> Result<InsertSummary>;
    async fn close(&self) -> Result<()>;
}

/// 🎭 The polymorphic store, enum-dispatched so callers never know where
/// the documents actually go. Ignorance is a feature. It's called
/// "abstraction".
#[derive(Debug, Clone)]
pub(crate) enum StoreBackend {
    Http(HttpStore),
    InMemory(InMemoryStore),
}

impl StoreBackend {
    /// 🔌 Open a fresh store session for one fetch attempt.
    ///
    /// The HTTP backend pings the server on the way in so a dead store
    /// fails loudly here instead of quietly 50,000 documents later.
    pub(crate) async fn connect(config: &StoreConfig) -> Result<Self> {
        match config {
            StoreConfig::Http(http_config) => {
                Ok(Self::Http(HttpStore::connect(http_config.clone()).await?))
            }
            StoreConfig::InMemory => Ok(Self::InMemory(InMemoryStore::new())),
        }
    }
}

#[async_trait]
impl MetricStore for StoreBackend {
    async fn insert_many(&self, documents: Vec<MetricDocument>) -> Result<InsertSummary> {
        match self {
            Self::Http(store) => store.insert_many(documents).await,
            Self::InMemory(store) => store.insert_many(documents).await,
        }
    }

    async fn close(&self) -> Result<()> {
        match self {
            Self::Http(store) => store.close().await,
            Self::InMemory(store) => store.close().await,
        }
    }
}
