//! 📦 Common data structures, the carriers of the siphon pipeline.
//!
//! 🎬 COLD OPEN — INT. DATA CENTER — 3:47 AM
//!
//! Somewhere upstream, a weather station is publishing JSON. Somewhere
//! downstream, a metric store is waiting for documents. In between: these
//! structs, quietly ferrying numbers from one side to the other without
//! asking what a hectopascal is. They don't need to know. They carry.
//!
//! 🦆 (the duck is load-bearing, do not remove)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 🌡️ The three kinds of metric a sensor reading can carry.
///
/// Serialized as the lowercase kind name, which is what lands in the
/// store's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Temperature,
    Humidity,
    Pressure,
}

impl MetricKind {
    /// 🏷️ The full kind name, as persisted in the `type` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Pressure => "pressure",
        }
    }

    /// 🏷️ The short prefix used when synthesizing labels.
    ///
    /// Temperature gets the abbreviated `temp` while the other two keep
    /// their full names. Label history is not symmetric. Label history
    /// doesn't owe you symmetry.
    pub fn label_prefix(&self) -> &'static str {
        match self {
            Self::Temperature => "temp",
            Self::Humidity => "humidity",
            Self::Pressure => "pressure",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 🎯 One persisted metric document. The atomic unit of this whole pipeline.
///
/// `label` is synthesized as `{prefix}_{source}_{ordinal}` where the ordinal
/// is scoped to a single fetch run, so a re-run regenerates the same labels
/// from zero. Insert-style stores treat the rerun copies as duplicates and
/// skip them. That is the dedup story. The whole dedup story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDocument {
    pub label: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
}

/// 📊 What a completed fetch run has to show for itself.
///
/// Handed back to the caller on success and rendered as the CLI's
/// end-of-run table. Every field is a cold, indifferent number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchReport {
    /// Source records that yielded at least one metric document.
    pub records_processed: u64,
    /// Documents the store acknowledged as inserted.
    pub documents_written: usize,
    /// Documents the store skipped as duplicates of existing labels.
    pub duplicates_skipped: usize,
    /// Batches dispatched to the store, background and final combined.
    pub batches_flushed: usize,
    /// Records dropped on the floor: undecodable objects and readings
    /// whose fields would not deserialize.
    pub records_dropped: u64,
}
