//! Download history persisted as `downloads.json`.
//!
//! A record is created when a download starts and moves to `completed` or
//! `failed` exactly once. A retry of the same version creates a new record.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, ZvmError};
use crate::mirrors::registry::format_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Downloading,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub id: u64,
    pub version: String,
    pub path: PathBuf,
    pub status: DownloadStatus,
    pub downloaded_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minisign_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

/// Outcome of the integrity checks recorded on completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationSummary {
    pub checksum: Option<String>,
    pub checksum_verified: bool,
    pub minisign_verified: bool,
}

/// JSON-file store of [`DownloadRecord`]s.
#[derive(Debug, Clone)]
pub struct DownloadRecordStore {
    path: PathBuf,
}

impl DownloadRecordStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Loads all records. A missing file is an empty history.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<Vec<DownloadRecord>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ZvmError::io(
                    format!("failed to read {}", self.path.display()),
                    e,
                ));
            }
        };
        serde_json::from_str(&content).map_err(|e| {
            ZvmError::config(format!("failed to parse {}: {e}", self.path.display()))
        })
    }

    fn save(&self, records: &[DownloadRecord]) -> Result<()> {
        let json = serde_json::to_string_pretty(records)
            .map_err(|e| ZvmError::config(format!("failed to serialize download records: {e}")))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ZvmError::io(format!("failed to create {}", parent.display()), e)
            })?;
        }
        std::fs::write(&self.path, json)
            .map_err(|e| ZvmError::io(format!("failed to write {}", self.path.display()), e))
    }

    /// Appends a `downloading` record and returns its id.
    ///
    /// # Errors
    ///
    /// Propagates load and save failures.
    pub fn begin(&self, version: &str, path: &Path, download_url: Option<&str>) -> Result<u64> {
        let mut records = self.load()?;
        let id = records.iter().map(|r| r.id).max().map_or(1, |max| max + 1);
        records.push(DownloadRecord {
            id,
            version: version.to_string(),
            path: path.to_path_buf(),
            status: DownloadStatus::Downloading,
            downloaded_at: format_timestamp(Utc::now()),
            checksum: None,
            checksum_verified: None,
            minisign_verified: None,
            download_url: download_url.map(str::to_string),
        });
        self.save(&records)?;
        Ok(id)
    }

    /// Marks record `id` completed. Returns `false` if it had already left the
    /// `downloading` state or does not exist.
    ///
    /// # Errors
    ///
    /// Propagates load and save failures.
    pub fn complete(
        &self,
        id: u64,
        download_url: &str,
        summary: &VerificationSummary,
    ) -> Result<bool> {
        self.transition(id, |record| {
            record.status = DownloadStatus::Completed;
            record.download_url = Some(download_url.to_string());
            record.checksum.clone_from(&summary.checksum);
            record.checksum_verified = Some(summary.checksum_verified);
            record.minisign_verified = Some(summary.minisign_verified);
        })
    }

    /// Marks record `id` failed. Returns `false` if it had already left the
    /// `downloading` state or does not exist.
    ///
    /// # Errors
    ///
    /// Propagates load and save failures.
    pub fn fail(&self, id: u64) -> Result<bool> {
        self.transition(id, |record| record.status = DownloadStatus::Failed)
    }

    fn transition(&self, id: u64, apply: impl FnOnce(&mut DownloadRecord)) -> Result<bool> {
        let mut records = self.load()?;
        let Some(record) = records
            .iter_mut()
            .find(|r| r.id == id && r.status == DownloadStatus::Downloading)
        else {
            return Ok(false);
        };
        apply(record);
        self.save(&records)?;
        Ok(true)
    }

    /// Newest record for `version`.
    ///
    /// # Errors
    ///
    /// Propagates load failures.
    pub fn latest(&self, version: &str) -> Result<Option<DownloadRecord>> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|r| r.version == version)
            .max_by_key(|r| r.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> DownloadRecordStore {
        DownloadRecordStore::new(dir.join("downloads.json"))
    }

    #[test]
    fn begin_creates_downloading_record() {
        let temp = tempfile::tempdir().unwrap();
        let store = store(temp.path());

        let id = store
            .begin("0.13.0", Path::new("/tmp/zig"), Some("https://a.example/zig.tar.xz"))
            .unwrap();
        let record = store.latest("0.13.0").unwrap().unwrap();

        assert_eq!(record.id, id);
        assert_eq!(record.status, DownloadStatus::Downloading);
        assert!(store.path.exists());
    }

    #[test]
    fn complete_transitions_once() {
        let temp = tempfile::tempdir().unwrap();
        let store = store(temp.path());
        let id = store.begin("0.13.0", Path::new("/tmp/zig"), None).unwrap();
        let summary = VerificationSummary {
            checksum: Some("abc".to_string()),
            checksum_verified: true,
            minisign_verified: false,
        };

        assert!(store.complete(id, "https://a.example/zig", &summary).unwrap());
        assert!(!store.fail(id).unwrap());

        let record = store.latest("0.13.0").unwrap().unwrap();
        assert_eq!(record.status, DownloadStatus::Completed);
        assert_eq!(record.checksum_verified, Some(true));
        assert_eq!(record.minisign_verified, Some(false));
        assert_eq!(record.download_url.as_deref(), Some("https://a.example/zig"));
    }

    #[test]
    fn retry_creates_new_record() {
        let temp = tempfile::tempdir().unwrap();
        let store = store(temp.path());

        let first = store.begin("0.13.0", Path::new("/tmp/zig"), None).unwrap();
        assert!(store.fail(first).unwrap());
        let second = store.begin("0.13.0", Path::new("/tmp/zig"), None).unwrap();

        assert_ne!(first, second);
        assert_eq!(store.load().unwrap().len(), 2);
        let latest = store.latest("0.13.0").unwrap().unwrap();
        assert_eq!(latest.id, second);
        assert_eq!(latest.status, DownloadStatus::Downloading);
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&DownloadStatus::Downloading).unwrap();
        assert_eq!(json, "\"downloading\"");
    }
}
