//! Append-only check-in history (one JSON object per line).

use crate::checkin::{format_local_timestamp, CheckinResult};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub timestamp: f64,
    /// `success` or `failure`
    pub status: String,
    #[serde(default)]
    pub reward: String,
    #[serde(default)]
    pub message: String,
}

impl HistoryRecord {
    pub fn summary(&self) -> String {
        let reward = if self.reward.is_empty() {
            String::new()
        } else {
            format!(" reward={}", self.reward)
        };
        let line = format!(
            "[{}] {} {}{}",
            format_local_timestamp(self.timestamp),
            self.status.to_uppercase(),
            self.message,
            reward
        );
        line.trim().to_string()
    }
}

impl From<&CheckinResult> for HistoryRecord {
    fn from(result: &CheckinResult) -> Self {
        Self {
            timestamp: result.timestamp,
            status: if result.success { "success" } else { "failure" }.to_string(),
            reward: result.reward.clone().unwrap_or_default(),
            message: result.message.clone(),
        }
    }
}

pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, result: &CheckinResult) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).context("Failed to create history directory")?;
            }
        }

        let mut line = serde_json::to_string(&HistoryRecord::from(result))
            .context("Failed to serialize history record")?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open history file {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .context("Failed to append history record")?;

        Ok(())
    }

    /// All records in file order. Malformed lines are skipped.
    pub fn load(&self) -> Result<Vec<HistoryRecord>> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read history from {}", self.path.display())
                })
            }
        };

        let mut records = Vec::new();
        for (index, line) in data.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(line = index + 1, error = %e, "Skipping malformed history line"),
            }
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(success: bool, message: &str, reward: Option<&str>, timestamp: f64) -> CheckinResult {
        CheckinResult {
            success,
            message: message.to_string(),
            reward: reward.map(str::to_string),
            timestamp,
        }
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("history.jsonl"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_append_and_load_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("nested").join("history.jsonl"));

        store.append(&result(true, "ok", Some("5"), 1.0)).unwrap();
        store.append(&result(false, "already done", None, 2.0)).unwrap();

        let records = store.load().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, "success");
        assert_eq!(records[0].reward, "5");
        assert_eq!(records[1].status, "failure");
        assert_eq!(records[1].reward, "");
        assert_eq!(records[1].timestamp, 2.0);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let store = HistoryStore::new(&path);

        store.append(&result(true, "first", None, 1.0)).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "garbage").unwrap();
        writeln!(file).unwrap();
        store.append(&result(true, "second", None, 3.0)).unwrap();

        let messages: Vec<_> = store
            .load()
            .unwrap()
            .into_iter()
            .map(|r| r.message)
            .collect();
        assert_eq!(messages, vec!["first", "second"]);
    }

    #[test]
    fn test_summary() {
        let record = HistoryRecord::from(&result(true, "Checked in", Some("10"), 1700000000.0));
        assert!(record.summary().ends_with("] SUCCESS Checked in reward=10"));

        let record = HistoryRecord::from(&result(false, "nope", None, 1700000000.0));
        assert!(record.summary().ends_with("] FAILURE nope"));
    }
}
