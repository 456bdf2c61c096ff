//! 📦 The in-memory store: tests, dry runs, and absolutely nothing else.
//!
//! Lives entirely in RAM, gone the moment you blink. First write to a label
//! wins; later writes are counted as duplicates and dropped, which is the
//! same bargain the real store offers, just without the network in between.
//!
//! ⚠️ If you're deploying this to prod, please also deploy a therapist.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::common::MetricDocument;
use crate::stores::{InsertSummary, MetricStore};

/// 📦 A label-keyed map behind an `Arc<Mutex<...>>`.
///
/// Clone-able because tests need to peek inside after handing a clone off
/// to the pipeline. Everyone shares the same map. That's the point.
#[derive(Debug, Default, Clone)]
pub(crate) struct InMemoryStore {
    documents: Arc<tokio::sync::Mutex<HashMap<String, MetricDocument>>>,
}

impl InMemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 🔍 Snapshot of everything stored, sorted by label for stable asserts.
    #[cfg(test)]
    pub(crate) async fn documents(&self) -> Vec<MetricDocument> {
        let guard = self.documents.lock().await;
        let mut docs: Vec<MetricDocument> = guard.values().cloned().collect();
        docs.sort_by(|a, b| a.label.cmp(&b.label));
        docs
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.documents.lock().await.len()
    }
}

#[async_trait]
impl MetricStore for InMemoryStore {
    async fn insert_many(&self, documents: Vec<MetricDocument>) -> Result<InsertSummary> {
        let mut guard = self.documents.lock().await;
        let mut summary = InsertSummary::default();
        for document in documents {
            match guard.entry(document.label.clone()) {
                Entry::Occupied(_) => summary.duplicates += 1,
                Entry::Vacant(slot) => {
                    slot.insert(document);
                    summary.inserted += 1;
                }
            }
        }
        Ok(summary)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
