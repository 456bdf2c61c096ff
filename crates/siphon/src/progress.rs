//! 📊 progress.rs — "Are we there yet?" — every long download, every time.
//!
//! A thin gauge over indicatif: byte position against the Content-Length
//! when the feed deigns to send one, a spinner when it doesn't, and a
//! sliding-window throughput readout either way.
//!
//! ⚠️ Watching the gauge will not make it go faster. We've tried.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

const MIB: u64 = 1024 * 1024;
/// Rate window width. Wide enough that a hiccup doesn't read like a cliff.
const RATE_WINDOW: Duration = Duration::from_secs(5);

fn format_bytes(bytes: u64) -> String {
    if bytes >= MIB {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= 1024 {
        format!("{:.2} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} bytes")
    }
}

/// 📊 Tracks one fetch attempt's bytes and records, renders them live.
pub(crate) struct IngestGauge {
    bar: ProgressBar,
    bytes_seen: u64,
    records_seen: u64,
    /// (when, bytes at that moment) samples for the rate window.
    samples: VecDeque<(Instant, u64)>,
}

impl std::fmt::Debug for IngestGauge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // ProgressBar doesn't derive Debug, and nobody debugging a fetch
        // wants a wall of terminal-control state anyway.
        f.debug_struct("IngestGauge")
            .field("bytes_seen", &self.bytes_seen)
            .field("records_seen", &self.records_seen)
            .finish()
    }
}

impl IngestGauge {
    /// 🚀 Build the gauge. `total_bytes = 0` means the feed kept its
    /// Content-Length to itself; we fall back to a spinner and honesty.
    pub(crate) fn new(total_bytes: u64) -> Self {
        let bar = if total_bytes > 0 {
            let bar = ProgressBar::new(total_bytes);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{msg}\n[{bar:40.cyan/blue}] {percent}%")
                    .unwrap() // safe unwrap: template is hardcoded and valid, checked twice
                    .progress_chars("=>-"),
            );
            bar
        } else {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner} {msg}")
                    .unwrap(), // same deal
            );
            bar
        };

        let mut samples = VecDeque::new();
        samples.push_back((Instant::now(), 0u64));

        Self {
            bar,
            bytes_seen: 0,
            records_seen: 0,
            samples,
        }
    }

    /// 🔄 Feed the gauge one chunk's worth of accounting.
    pub(crate) fn update(&mut self, bytes: u64, records: u64) {
        self.bytes_seen += bytes;
        self.records_seen += records;

        let now = Instant::now();
        while let Some(&(when, _)) = self.samples.front() {
            if now.duration_since(when) > RATE_WINDOW {
                self.samples.pop_front();
            } else {
                break;
            }
        }
        self.samples.push_back((now, self.bytes_seen));

        let rate = match self.samples.front() {
            Some(&(oldest_when, oldest_bytes)) => {
                let elapsed = now.duration_since(oldest_when).as_secs_f64();
                if elapsed > 0.0 {
                    (self.bytes_seen.saturating_sub(oldest_bytes)) as f64 / elapsed / MIB as f64
                } else {
                    0.0
                }
            }
            None => 0.0,
        };

        self.bar.set_position(self.bytes_seen);
        self.bar.set_message(format!(
            "📡 {} records | {} | {rate:.2} MiB/s",
            self.records_seen,
            format_bytes(self.bytes_seen),
        ));
    }

    /// ✅ Ring the bell. We made it. (Or the stream ended. Same energy.)
    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_bytes_get_human_sized() {
        assert_eq!(format_bytes(512), "512 bytes");
        assert_eq!(format_bytes(2048), "2.00 KiB");
        assert_eq!(format_bytes(3 * MIB), "3.00 MiB");
    }

    #[test]
    fn the_one_where_the_gauge_accumulates() {
        let mut gauge = IngestGauge::new(0);
        gauge.update(1000, 3);
        gauge.update(500, 2);
        assert_eq!(gauge.bytes_seen, 1500);
        assert_eq!(gauge.records_seen, 5);
        gauge.finish();
    }
}
