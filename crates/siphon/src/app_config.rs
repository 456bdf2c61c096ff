//! 🔧 App Configuration, the sacred TOML-to-struct pipeline.
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.
//!
//! Layering: `SIPHON_*` environment variables first, then an optional TOML
//! file merged on top. No file, no implicit default path, no pineapple
//! defaults; if the caller doesn't hand us a path, the environment is all
//! there is.

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::events::HttpPublisherConfig;
use crate::stores::HttpStoreConfig;

/// 📦 Everything the pipeline needs to know about itself.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 📡 Where the feed lives and how stubbornly to fetch it.
    pub fetcher: FetcherConfig,
    /// 🚰 Where the documents land.
    pub store: StoreConfig,
    /// 📣 Who hears about it afterwards. Optional; silence is the default.
    #[serde(default)]
    pub publisher: PublisherConfig,
}

/// 🔧 Knobs for the fetch orchestrator.
#[derive(Debug, Deserialize, Clone)]
pub struct FetcherConfig {
    /// 📡 The feed URL. One top-level JSON array, however many gigabytes.
    pub url: String,
    /// 🔄 Retries after the initial attempt, transport failures only.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// ⏱️ Base backoff in milliseconds; doubles per retry (1s, 2s, 4s...).
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    /// 📦 Documents per store batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// ⏱️ Connect timeout in seconds. The only timeout the download gets;
    /// a multi-hour body is legal and expected, so there is no overall
    /// response deadline at all.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    1000
}

fn default_batch_size() -> usize {
    5000
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("siphon/{}", env!("CARGO_PKG_VERSION"))
}

/// 🚰 Which store backend the documents land in.
#[derive(Debug, Deserialize, Clone)]
pub enum StoreConfig {
    /// 📡 A real document store behind a bulk-insert HTTP API.
    Http(HttpStoreConfig),
    /// 📦 RAM. For dry runs and tests. The documents evaporate with the
    /// process, which for a dry run is the whole point.
    InMemory,
}

/// 📣 Which publisher backend carries the completion event.
#[derive(Debug, Deserialize, Clone, Default)]
pub enum PublisherConfig {
    Http(HttpPublisherConfig),
    InMemory,
    #[default]
    Disabled,
}

/// 🚀 Load the config from env vars (`SIPHON_*`) plus an optional TOML file.
///
/// - `None` means env vars only. No file. No assumptions.
/// - `Some(path)` merges the file on top; the file wins on conflicts.
///
/// 💀 Returns a contextual error if the merged pile doesn't deserialize.
/// The error message names the file, because "error: error" energy helps
/// nobody at 3am.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 loading configuration: {:?}",
        config_file_name.unwrap_or(Path::new("<env only>"))
    );

    let config = Figment::new().merge(Env::prefixed("SIPHON_"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 failed to parse configuration from '{}' and SIPHON_* environment variables",
            path.display()
        ),
        None => "💀 failed to parse configuration from SIPHON_* environment variables \
                 (no file was provided, this one's all on the environment)"
            .to_string(),
    };

    config.extract().context(context_msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_test_config(contents: &str) -> tempfile::NamedTempFile {
        let file = tempfile::Builder::new()
            .prefix("siphon_app_config_")
            .suffix(".toml")
            .tempfile()
            .expect("💀 failed to create test config file");
        fs::write(file.path(), contents).expect("💀 failed to write test config");
        file
    }

    #[test]
    fn the_one_where_a_full_config_parses() {
        let file = write_test_config(
            r#"
            [fetcher]
            url = "https://feed.example/timeseries.json"
            max_retries = 5
            base_backoff_ms = 250
            batch_size = 100

            [store.Http]
            url = "http://store.example:9200"
            collection = "metrics"
            api_key = "hunter2"

            [publisher.Http]
            url = "http://bus.example:6379"
            channel = "data-fetch"
            "#,
        );

        let config = load_config(Some(file.path())).expect("💀 full config should parse");
        assert_eq!(config.fetcher.max_retries, 5);
        assert_eq!(config.fetcher.base_backoff_ms, 250);
        assert_eq!(config.fetcher.batch_size, 100);
        match config.store {
            StoreConfig::Http(http) => {
                assert_eq!(http.collection, "metrics");
                assert_eq!(http.api_key.as_deref(), Some("hunter2"));
            }
            honestly_who_knows => panic!("💀 expected an Http store, serde took us to {honestly_who_knows:?}"),
        }
        assert!(matches!(config.publisher, PublisherConfig::Http(_)));
    }

    #[test]
    fn the_one_where_defaults_show_up_uninvited_but_helpful() {
        let file = write_test_config(
            r#"
            [fetcher]
            url = "https://feed.example/timeseries.json"

            store = "InMemory"
            "#,
        );

        let config = load_config(Some(file.path())).expect("💀 minimal config should parse");
        assert_eq!(config.fetcher.max_retries, 3);
        assert_eq!(config.fetcher.base_backoff_ms, 1000);
        assert_eq!(config.fetcher.batch_size, 5000);
        assert_eq!(config.fetcher.connect_timeout_secs, 10);
        assert!(matches!(config.store, StoreConfig::InMemory));
        assert!(matches!(config.publisher, PublisherConfig::Disabled));
    }

    #[test]
    fn the_one_where_a_missing_url_is_a_contextual_error() {
        let file = write_test_config(
            r#"
            [fetcher]
            max_retries = 2

            store = "InMemory"
            "#,
        );

        let err = load_config(Some(file.path())).expect_err("💀 a url-less fetcher must not parse");
        assert!(format!("{err:#}").contains("failed to parse configuration"));
    }
}
