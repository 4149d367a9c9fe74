use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = ".anyrouter_auto";

/// Per-user application directory and the files inside it.
#[derive(Debug, Clone)]
pub struct AppPaths {
    base_dir: PathBuf,
}

impl AppPaths {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    /// `$ANYROUTER_HOME`, or `~/.anyrouter_auto`.
    pub fn from_env() -> Result<Self> {
        if let Ok(dir) = std::env::var("ANYROUTER_HOME") {
            if !dir.trim().is_empty() {
                return Ok(Self::new(dir));
            }
        }
        let home = dirs::home_dir().context("Unable to determine home directory")?;
        Ok(Self::new(home.join(APP_DIR_NAME)))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Create the base directory if missing.
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir).with_context(|| {
            format!(
                "Failed to create application directory {}",
                self.base_dir.display()
            )
        })
    }

    pub fn credentials_file(&self) -> PathBuf {
        self.base_dir.join("credentials.json")
    }

    pub fn schedule_file(&self) -> PathBuf {
        self.base_dir.join("schedule.json")
    }

    pub fn history_file(&self) -> PathBuf {
        self.base_dir.join("history.jsonl")
    }

    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_layout() {
        let paths = AppPaths::new("/tmp/anyrouter-test");
        assert_eq!(
            paths.credentials_file(),
            PathBuf::from("/tmp/anyrouter-test/credentials.json")
        );
        assert_eq!(
            paths.schedule_file(),
            PathBuf::from("/tmp/anyrouter-test/schedule.json")
        );
        assert_eq!(
            paths.history_file(),
            PathBuf::from("/tmp/anyrouter-test/history.jsonl")
        );
    }

    #[test]
    fn test_ensure_creates_nested_dir() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::new(dir.path().join("a").join("b"));
        paths.ensure().unwrap();
        assert!(paths.base_dir().is_dir());
        // Idempotent
        paths.ensure().unwrap();
    }
}
