//! Persisted schedule state.

use crate::config::ScheduleConfig;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Daily fire time (local wall clock) plus the last successful fire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleState {
    pub hour: u32,
    pub minute: u32,
    /// Sub-minute offset, written only when non-zero
    #[serde(default, skip_serializing_if = "is_zero")]
    pub second: u32,
    /// Set only after the job completed without error
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

impl ScheduleState {
    pub fn from_config(config: ScheduleConfig) -> Self {
        Self {
            hour: config.hour,
            minute: config.minute,
            second: 0,
            last_run: None,
        }
    }

    /// Fire time of day, or `None` when any component is out of range.
    pub fn time_of_day(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(self.hour, self.minute, self.second)
    }
}

/// Owns the schedule-state file.
///
/// Loading never fails: a missing, unreadable or invalid file yields the
/// configured defaults.
pub struct ScheduleStore {
    path: PathBuf,
    defaults: ScheduleConfig,
}

impl ScheduleStore {
    pub fn new<P: AsRef<Path>>(path: P, defaults: ScheduleConfig) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            defaults,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> ScheduleState {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No schedule state; using configured time");
                return self.fallback();
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to read schedule state; using configured time"
                );
                return self.fallback();
            }
        };

        let state = match serde_json::from_str::<ScheduleState>(&data) {
            Ok(state) => state,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Schedule state could not be decoded; using configured time"
                );
                return self.fallback();
            }
        };

        if state.time_of_day().is_none() {
            warn!(
                hour = state.hour,
                minute = state.minute,
                second = state.second,
                "Schedule state out of range; using configured time"
            );
            return self.fallback();
        }

        state
    }

    /// Overwrites the state file atomically.
    pub fn save(&self, state: &ScheduleState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).context("Failed to create schedule directory")?;
            }
        }

        let json = serde_json::to_string_pretty(state).context("Failed to serialize schedule")?;

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file =
                fs::File::create(&tmp_path).context("Failed to create temporary schedule file")?;
            file.write_all(json.as_bytes())
                .context("Failed to write schedule state")?;
            file.sync_all()
                .context("Failed to sync schedule file to disk")?;
        }

        fs::rename(&tmp_path, &self.path).context("Failed to replace schedule file")?;

        debug!(path = %self.path.display(), last_run = ?state.last_run, "Schedule state saved");
        Ok(())
    }

    fn fallback(&self) -> ScheduleState {
        ScheduleState::from_config(self.defaults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn defaults() -> ScheduleConfig {
        ScheduleConfig { hour: 9, minute: 0 }
    }

    fn store_in(dir: &tempfile::TempDir) -> ScheduleStore {
        ScheduleStore::new(dir.path().join("schedule.json"), defaults())
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let state = store_in(&dir).load();
        assert_eq!(state, ScheduleState::from_config(defaults()));
        assert_eq!(state.last_run, None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let state = ScheduleState {
            hour: 7,
            minute: 45,
            second: 0,
            last_run: Some(Utc.with_ymd_and_hms(2024, 3, 1, 7, 45, 2).unwrap()),
        };

        store.save(&state).unwrap();
        assert_eq!(store.load(), state);
        assert!(!dir.path().join("schedule.tmp").exists());
    }

    #[test]
    fn test_file_layout_omits_zero_second() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let path = dir.path().join("schedule.json");

        store.save(&ScheduleState::from_config(defaults())).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let mut keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["hour", "last_run", "minute"]);

        let mut state = ScheduleState::from_config(defaults());
        state.second = 30;
        store.save(&state).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["second"], 30);
        assert_eq!(store.load(), state);
    }

    #[test]
    fn test_persisted_time_wins_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("schedule.json"), r#"{"hour": 21, "minute": 30}"#).unwrap();

        let state = store_in(&dir).load();
        assert_eq!((state.hour, state.minute, state.second), (21, 30, 0));
        assert_eq!(state.last_run, None);
    }

    #[test]
    fn test_corrupt_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("schedule.json"), "{ not json").unwrap();

        let state = store_in(&dir).load();
        assert_eq!((state.hour, state.minute), (9, 0));
    }

    #[test]
    fn test_out_of_range_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("schedule.json"),
            r#"{"hour": 25, "minute": 0, "last_run": "2024-03-01T09:00:00Z"}"#,
        )
        .unwrap();

        let state = store_in(&dir).load();
        assert_eq!(state, ScheduleState::from_config(defaults()));
    }

    #[test]
    fn test_time_of_day() {
        let mut state = ScheduleState::from_config(defaults());
        assert_eq!(state.time_of_day(), NaiveTime::from_hms_opt(9, 0, 0));

        state.minute = 60;
        assert_eq!(state.time_of_day(), None);
    }
}
