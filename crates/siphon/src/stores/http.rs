//! 📡 The HTTP document-store backend.
//!
//! 🎬 COLD OPEN — INT. SERVER ROOM — 3:47 AM
//!
//! The store is out there. Behind a load balancer, behind a firewall rule
//! someone wrote in 2021 and then left the company. This module sends your
//! precious documents to it in unordered bulk batches and reads back two
//! numbers: how many stuck, how many were already there. It does not judge
//! the duplicates. It counts them. It moves on.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::common::MetricDocument;
use crate::stores::{InsertSummary, MetricStore};

/// 🔧 Configuration for the HTTP store backend.
///
/// Auth is tri-modal, same ranking as everywhere else in this workspace:
/// api_key beats basic auth beats hoping anonymous works.
#[derive(Debug, Deserialize, Clone)]
pub struct HttpStoreConfig {
    /// 📡 Base URL of the document store. Scheme and port included. Yes,
    /// all of it.
    pub url: String,
    /// 📦 Target collection. Defaults to `metrics`, which is what the
    /// ingest route expects to query later.
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_collection() -> String {
    "metrics".to_string()
}

/// 📡 A live session against the document store's bulk-insert API.
///
/// Wire contract: `POST {url}/{collection}/bulk-insert?ordered=false` with
/// `{"documents": [...]}`; the store answers `{"inserted": N, "duplicates": M}`.
/// Unordered means per-document label collisions are skipped server-side
/// instead of aborting the batch, which is the entire reason we can flush
/// in the background without flinching.
#[derive(Debug, Clone)]
pub(crate) struct HttpStore {
    client: reqwest::Client,
    config: HttpStoreConfig,
}

impl HttpStore {
    /// 🔌 Build the client and ping the store root.
    ///
    /// 10 second connect timeout, 30 second request timeout. Bulk writes
    /// are bounded by the batch size, so unlike the feed download they get
    /// to have deadlines.
    pub(crate) async fn connect(config: HttpStoreConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .context("💀 the HTTP client refused to be born. Probably a cursed TLS stack.")?;

        // 📡 Connectivity ping. Fail loudly here, not mid-batch.
        let store = Self { client, config };
        let response = store
            .with_auth(store.client.get(&store.config.url))
            .send()
            .await
            .context("💀 reached out to the metric store and got ghosted. Is it running?")?;
        trace!("🔌 store ping answered {}", response.status());

        Ok(store)
    }

    /// 🔒 Auth priority: api_key wins over basic auth. Not a democracy.
    fn with_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(ref api_key) = self.config.api_key {
            request.header("Authorization", format!("ApiKey {api_key}"))
        } else if let Some(ref username) = self.config.username {
            request.basic_auth(username, self.config.password.as_ref())
        } else {
            request
        }
    }

    fn bulk_url(&self) -> String {
        format!(
            "{}/{}/bulk-insert",
            self.config.url.trim_end_matches('/'),
            self.config.collection
        )
    }
}

/// 📦 The store's answer to a bulk insert.
#[derive(Debug, Deserialize)]
struct BulkInsertResponse {
    #[serde(default)]
    inserted: usize,
    #[serde(default)]
    duplicates: usize,
}

#[async_trait]
impl MetricStore for HttpStore {
    async fn insert_many(&self, documents: Vec<MetricDocument>) -> Result<InsertSummary> {
        if documents.is_empty() {
            // ⚠️ No empty bulk requests. The store doesn't want them and
            // frankly neither do we. Boundaries are healthy.
            return Ok(InsertSummary::default());
        }

        let batch_len = documents.len();
        let response = self
            .with_auth(self.client.post(self.bulk_url()))
            .query(&[("ordered", "false")])
            .json(&serde_json::json!({ "documents": documents }))
            .send()
            .await
            .context("💀 the bulk insert never reached the store. The network was not vibing with it.")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "💀 the store looked at our batch of {batch_len} documents and said '{status}'. \
                 Response body: '{body}'."
            );
        }

        let outcome: BulkInsertResponse = response
            .json()
            .await
            .context("💀 the store said 2xx and then sent back a body we couldn't read")?;

        if outcome.duplicates > 0 {
            debug!(
                "🗑️ store skipped {} duplicate label(s) out of {batch_len}; the rest landed",
                outcome.duplicates
            );
        }
        trace!("✅ bulk insert landed: {} inserted", outcome.inserted);

        Ok(InsertSummary {
            inserted: outcome.inserted,
            duplicates: outcome.duplicates,
        })
    }

    async fn close(&self) -> Result<()> {
        // 🗑️ Nothing stateful to tear down server-side; the pooled
        // connections die with the client. Ceremony level: browser tab.
        debug!("🔌 store session closed");
        Ok(())
    }
}
