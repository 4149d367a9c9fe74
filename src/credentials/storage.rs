//! File-backed credential storage.
//!
//! Holds exactly one record (last write wins). Writes go to a temporary file
//! that is renamed over the target, so readers never see a partial record.

use super::{obfuscation, CredentialRecord};
use anyhow::{Context, Result};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Single-record credential store.
///
/// # Concurrency
/// Not locked. One process writes at a time; concurrent CLI invocations are
/// unguarded.
pub struct CredentialStore {
    path: PathBuf,
    passphrase: String,
}

impl CredentialStore {
    /// Creates a store for `path`. An empty or absent passphrase disables masking.
    pub fn new<P: AsRef<Path>>(path: P, passphrase: Option<&str>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            passphrase: passphrase.unwrap_or_default().to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored record.
    ///
    /// # Returns
    /// * `Ok(Some(record))` - Record found and decoded
    /// * `Ok(None)` - No file, or the file could not be decoded (wrong passphrase, corrupt)
    /// * `Err` - The file exists but could not be read
    pub fn load(&self) -> Result<Option<CredentialRecord>> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read credentials from {}", self.path.display())
                })
            }
        };

        let payload = obfuscation::decode(&self.passphrase, &data);
        match serde_json::from_slice::<CredentialRecord>(&payload) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Stored credentials could not be decoded; treating as absent"
                );
                Ok(None)
            }
        }
    }

    /// Overwrites the stored record.
    pub fn save(&self, record: &CredentialRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).context("Failed to create credentials directory")?;
            }
        }

        let json = serde_json::to_vec_pretty(record).context("Failed to serialize credentials")?;
        let data = obfuscation::encode(&self.passphrase, &json);

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file = create_private_file(&tmp_path)
                .context("Failed to create temporary credentials file")?;
            file.write_all(&data)
                .context("Failed to write credentials")?;
            file.sync_all()
                .context("Failed to sync credentials file to disk")?;
        }

        fs::rename(&tmp_path, &self.path).context("Failed to replace credentials file")?;

        debug!(
            path = %self.path.display(),
            has_refresh_token = record.refresh_token.is_some(),
            "Credentials saved"
        );

        Ok(())
    }

    /// Removes the stored record. Missing file is not an error.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove credentials file"),
        }
    }
}

#[cfg(unix)]
fn create_private_file(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn create_private_file(path: &Path) -> std::io::Result<fs::File> {
    fs::File::create(path)
}
