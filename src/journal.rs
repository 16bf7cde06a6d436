// =============================================================================
// Order journal — append-only JSONL event log
// =============================================================================
//
// Every executor decision is appended as one JSON line, never rewritten;
// `runtime_config::RuntimeConfig::save`'s "never corrupt what's already on
// disk" posture is carried here as append-only rather than atomic-replace,
// since a journal's whole point is a durable history, not a single current
// value.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalEventKind {
    PlanBuilt,
    PolicyRejected,
    OrderSubmitted,
    OrderFilled,
    OrderCancelled,
    MakerTimeoutFallback,
    OrderFailed,
    PositionClosed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEvent {
    pub timestamp_ms: i64,
    pub symbol: String,
    pub kind: JournalEventKind,
    pub client_order_id: String,
    pub detail: String,
}

/// Append-only order journal. Safe to share across the worker pool; each
/// write takes an exclusive lock around append-and-flush so interleaved
/// writers never tear a line.
pub struct Journal {
    path: PathBuf,
    lock: Mutex<()>,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    pub fn record(&self, event: &JournalEvent) -> Result<()> {
        let _guard = self.lock.lock();

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create journal directory {}", parent.display()))?;
        }

        let line = serde_json::to_string(event).context("failed to serialise journal event")?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open journal file {}", self.path.display()))?;

        writeln!(file, "{line}").with_context(|| format!("failed to append to journal file {}", self.path.display()))?;
        Ok(())
    }

    pub fn record_simple(&self, symbol: &str, kind: JournalEventKind, client_order_id: &str, detail: impl Into<String>) -> Result<()> {
        self.record(&JournalEvent {
            timestamp_ms: Utc::now().timestamp_millis(),
            symbol: symbol.to_string(),
            kind,
            client_order_id: client_order_id.to_string(),
            detail: detail.into(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("scanner_journal_test_{}_{}", std::process::id(), name))
    }

    #[test]
    fn appends_one_line_per_event() {
        let path = temp_path("append");
        let _ = std::fs::remove_file(&path);
        let journal = Journal::new(&path);
        journal.record_simple("BTC/USDT", JournalEventKind::PlanBuilt, "abc-1", "built plan").unwrap();
        journal.record_simple("BTC/USDT", JournalEventKind::OrderSubmitted, "abc-1", "submitted near leg").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let parsed: JournalEvent = serde_json::from_str(line).unwrap();
            assert_eq!(parsed.client_order_id, "abc-1");
        }
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn creates_parent_directory_if_missing() {
        let path = std::env::temp_dir()
            .join(format!("scanner_journal_test_{}_nested", std::process::id()))
            .join("orders.jsonl");
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
        let journal = Journal::new(&path);
        journal.record_simple("ETH/USDT", JournalEventKind::OrderFailed, "xyz-2", "boom").unwrap();
        assert!(path.exists());
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
