//! Operation log — timestamped progress messages for one CLI run.
//!
//! Every message goes to `tracing`, is kept in memory so it can be embedded
//! in the analysis output, and is optionally appended to a JSONL file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One `(timestamp, message)` pair. Serializes as a two-element array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry(pub String, pub String);

impl LogEntry {
    pub fn timestamp(&self) -> &str {
        &self.0
    }

    pub fn message(&self) -> &str {
        &self.1
    }
}

#[derive(Serialize)]
struct JsonlLine<'a> {
    timestamp: &'a str,
    message: &'a str,
}

#[derive(Default)]
pub struct OperationLog {
    entries: Vec<LogEntry>,
    sink: Option<File>,
}

impl OperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also append every entry to `path` as JSON lines.
    pub fn with_file(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file: {}", path.display()))?;
        Ok(Self {
            entries: Vec::new(),
            sink: Some(file),
        })
    }

    pub fn log(&mut self, message: impl Into<String>) {
        let message = message.into();
        let timestamp = Utc::now().format(TIMESTAMP_FORMAT).to_string();
        tracing::info!("{message}");

        if let Some(file) = self.sink.as_mut() {
            let line = JsonlLine {
                timestamp: &timestamp,
                message: &message,
            };
            // A broken log file must not abort the analysis.
            let written = serde_json::to_string(&line)
                .map_err(std::io::Error::from)
                .and_then(|json| writeln!(file, "{json}"));
            if let Err(e) = written {
                tracing::warn!("failed to append to log file: {e}");
                self.sink = None;
            }
        }

        self.entries.push(LogEntry(timestamp, message));
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn keeps_entries_in_order() {
        let mut log = OperationLog::new();
        log.log("one");
        log.log(String::from("two"));
        let messages: Vec<&str> = log.entries().iter().map(|e| e.message()).collect();
        assert_eq!(messages, vec!["one", "two"]);
        assert_eq!(log.entries()[0].timestamp().len(), 19);
    }

    #[test]
    fn entry_serializes_as_pair() {
        let entry = LogEntry("2024-01-01 00:00:00".into(), "hello".into());
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            serde_json::json!(["2024-01-01 00:00:00", "hello"])
        );
    }

    #[test]
    fn appends_jsonl() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("run.jsonl");

        let mut log = OperationLog::with_file(&path).unwrap();
        log.log("first");
        drop(log);
        let mut log = OperationLog::with_file(&path).unwrap();
        log.log("second");
        drop(log);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["message"], "second");
        assert!(lines[0]["timestamp"].is_string());
    }
}
