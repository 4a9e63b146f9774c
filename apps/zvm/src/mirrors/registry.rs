//! Persistence of the ranked mirror set.
//!
//! ## File Format
//!
//! ```toml
//! schema_version = 1
//! last_synced = "2026-10-14T08:00:00Z"
//!
//! [[mirrors]]
//! url = "https://mirror.example.org/zig"
//! rank = 1
//! ```
//!
//! Files written before schema versioning (version 0) stored mirrors as
//! `[url, rank]` pairs and carry no `schema_version`. They are parsed with a
//! strict structure and upgraded by [`migrate_v0_to_v1`]; anything that fails
//! to parse as a known version loads as a fresh empty set.
//!
//! Saving validates every mirror and the timestamp and refuses to write
//! invalid data.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{ConfigStore, TomlFileStore};
use crate::errors::{Result, ZvmError};

/// Current on-disk schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// A community mirror and its reliability rank (lower is better).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Mirror {
    pub url: String,
    pub rank: u32,
}

impl Mirror {
    #[must_use]
    pub fn new(url: impl Into<String>, rank: u32) -> Self {
        Self {
            url: url.into(),
            rank,
        }
    }
}

/// The ranked mirror set and the time it was last rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MirrorsConfig {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<String>,
    #[serde(default)]
    pub mirrors: Vec<Mirror>,
}

impl Default for MirrorsConfig {
    fn default() -> Self {
        Self::empty(Utc::now())
    }
}

impl MirrorsConfig {
    /// An empty mirror set stamped with `now`.
    #[must_use]
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            last_synced: Some(format_timestamp(now)),
            mirrors: Vec::new(),
        }
    }

    /// Checks the invariants enforced at save time.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        for mirror in &self.mirrors {
            if !is_https_url(&mirror.url) {
                return Err(ZvmError::config(format!(
                    "mirror URL must use https: {}",
                    mirror.url
                )));
            }
            if mirror.rank < 1 {
                return Err(ZvmError::config(format!(
                    "mirror rank must be at least 1: {} has rank {}",
                    mirror.url, mirror.rank
                )));
            }
        }
        if let Some(ts) = &self.last_synced
            && parse_timestamp(ts).is_none()
        {
            return Err(ZvmError::config(format!(
                "last_synced is not a valid ISO-8601 timestamp: {ts}"
            )));
        }
        Ok(())
    }
}

/// Whether `url` is an `https://` URL with a non-empty host part.
#[must_use]
pub fn is_https_url(url: &str) -> bool {
    url.strip_prefix("https://")
        .is_some_and(|rest| !rest.is_empty() && !rest.starts_with('/'))
}

/// Formats a timestamp the way it is persisted (`2026-10-14T08:00:00Z`).
#[must_use]
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parses an RFC 3339 / ISO-8601 timestamp.
#[must_use]
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Mirror file layout before `schema_version` was introduced.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MirrorsConfigV0 {
    last_synced: Option<String>,
    #[serde(default)]
    mirrors: Vec<(String, i64)>,
}

/// Upgrades a version 0 document.
///
/// Ranks below 1 are clamped to 1. An unparsable timestamp is dropped, which
/// marks the set as never synced.
fn migrate_v0_to_v1(legacy: MirrorsConfigV0) -> MirrorsConfig {
    let mirrors = legacy
        .mirrors
        .into_iter()
        .map(|(url, rank)| Mirror {
            url,
            rank: u32::try_from(rank.max(1)).unwrap_or(u32::MAX),
        })
        .collect();

    MirrorsConfig {
        schema_version: SCHEMA_VERSION,
        last_synced: legacy
            .last_synced
            .filter(|ts| parse_timestamp(ts).is_some()),
        mirrors,
    }
}

/// Parses a mirror document of any known schema version.
fn parse_document(content: &str) -> std::result::Result<MirrorsConfig, String> {
    let table: toml::Table = toml::from_str(content).map_err(|e| e.to_string())?;

    let mut config = match table.get("schema_version") {
        None => {
            let legacy: MirrorsConfigV0 = toml::from_str(content).map_err(|e| e.to_string())?;
            migrate_v0_to_v1(legacy)
        }
        Some(toml::Value::Integer(1)) => {
            toml::from_str::<MirrorsConfig>(content).map_err(|e| e.to_string())?
        }
        Some(other) => return Err(format!("unsupported schema_version {other}")),
    };

    if config
        .last_synced
        .as_deref()
        .is_some_and(|ts| parse_timestamp(ts).is_none())
    {
        config.last_synced = None;
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// Loads and saves the ranked mirror file.
#[derive(Debug, Clone)]
pub struct MirrorRegistry {
    store: TomlFileStore<MirrorsConfig>,
}

impl MirrorRegistry {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            store: TomlFileStore::new(path),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.store.path()
    }
}

impl ConfigStore<MirrorsConfig> for MirrorRegistry {
    /// Loads the mirror set.
    ///
    /// A missing, unreadable or structurally invalid file yields a fresh empty
    /// set; this never fails.
    fn load(&self) -> Result<MirrorsConfig> {
        let content = match std::fs::read_to_string(self.path()) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(MirrorsConfig::default());
            }
            Err(e) => {
                warn!(path = %self.path().display(), error = %e, "cannot read mirror file, starting fresh");
                return Ok(MirrorsConfig::default());
            }
        };

        match parse_document(&content) {
            Ok(config) => Ok(config),
            Err(reason) => {
                warn!(path = %self.path().display(), %reason, "invalid mirror file, starting fresh");
                Ok(MirrorsConfig::default())
            }
        }
    }

    fn save(&self, config: &MirrorsConfig) -> Result<()> {
        config.validate()?;
        let mut config = config.clone();
        config.schema_version = SCHEMA_VERSION;
        self.store.save(&config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(dir: &Path) -> MirrorRegistry {
        MirrorRegistry::new(dir.join("mirrors.toml"))
    }

    fn sample() -> MirrorsConfig {
        MirrorsConfig {
            schema_version: SCHEMA_VERSION,
            last_synced: Some("2026-10-01T12:00:00Z".to_string()),
            mirrors: vec![
                Mirror::new("https://a.example/zig", 1),
                Mirror::new("https://b.example/zig", 4),
            ],
        }
    }

    #[test]
    fn load_missing_file_returns_fresh_config() {
        let temp = tempfile::tempdir().unwrap();
        let config = registry(temp.path()).load().unwrap();

        assert!(config.mirrors.is_empty());
        assert!(config.last_synced.as_deref().and_then(parse_timestamp).is_some());
        assert_eq!(config.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn save_then_load_is_lossless() {
        let temp = tempfile::tempdir().unwrap();
        let registry = registry(temp.path());

        registry.save(&sample()).unwrap();
        let loaded = registry.load().unwrap();
        assert_eq!(loaded, sample());

        registry.save(&loaded).unwrap();
        assert_eq!(registry.load().unwrap(), sample());
    }

    #[test]
    fn save_rejects_plain_http_url() {
        let temp = tempfile::tempdir().unwrap();
        let registry = registry(temp.path());
        let mut config = sample();
        config.mirrors.push(Mirror::new("http://insecure.example/zig", 1));

        let err = registry.save(&config).unwrap_err();
        assert!(matches!(err, ZvmError::Config { .. }));
        assert!(!registry.path().exists());
    }

    #[test]
    fn save_rejects_zero_rank() {
        let temp = tempfile::tempdir().unwrap();
        let registry = registry(temp.path());
        let mut config = sample();
        config.mirrors[0].rank = 0;

        assert!(registry.save(&config).is_err());
        assert!(!registry.path().exists());
    }

    #[test]
    fn save_rejects_invalid_timestamp_and_keeps_previous_file() {
        let temp = tempfile::tempdir().unwrap();
        let registry = registry(temp.path());
        registry.save(&sample()).unwrap();

        let mut config = sample();
        config.last_synced = Some("yesterday".to_string());
        assert!(registry.save(&config).is_err());
        assert_eq!(registry.load().unwrap(), sample());
    }

    #[test]
    fn save_overwrites_instead_of_merging() {
        let temp = tempfile::tempdir().unwrap();
        let registry = registry(temp.path());
        registry.save(&sample()).unwrap();

        let mut config = sample();
        config.mirrors.truncate(1);
        registry.save(&config).unwrap();

        assert_eq!(registry.load().unwrap().mirrors.len(), 1);
    }

    #[test]
    fn load_structurally_invalid_file_returns_fresh_config() {
        let temp = tempfile::tempdir().unwrap();
        let registry = registry(temp.path());
        std::fs::write(
            registry.path(),
            "schema_version = 1\n[[mirrors]]\nurl = \"https://a.example\"\nrank = \"high\"\n",
        )
        .unwrap();

        assert!(registry.load().unwrap().mirrors.is_empty());
    }

    #[test]
    fn load_unknown_schema_version_returns_fresh_config() {
        let temp = tempfile::tempdir().unwrap();
        let registry = registry(temp.path());
        std::fs::write(registry.path(), "schema_version = 7\nmirrors = []\n").unwrap();

        assert!(registry.load().unwrap().mirrors.is_empty());
    }

    #[test]
    fn load_treats_unparsable_timestamp_as_never_synced() {
        let temp = tempfile::tempdir().unwrap();
        let registry = registry(temp.path());
        std::fs::write(
            registry.path(),
            "schema_version = 1\nlast_synced = \"not a date\"\n[[mirrors]]\nurl = \"https://a.example\"\nrank = 2\n",
        )
        .unwrap();

        let config = registry.load().unwrap();
        assert_eq!(config.last_synced, None);
        assert_eq!(config.mirrors, vec![Mirror::new("https://a.example", 2)]);
    }

    #[test]
    fn load_migrates_legacy_pairs() {
        let temp = tempfile::tempdir().unwrap();
        let registry = registry(temp.path());
        std::fs::write(
            registry.path(),
            "last_synced = \"2025-01-01T00:00:00Z\"\nmirrors = [[\"https://a.example/zig\", 3], [\"https://b.example/zig\", 0]]\n",
        )
        .unwrap();

        let config = registry.load().unwrap();
        assert_eq!(config.schema_version, SCHEMA_VERSION);
        assert_eq!(
            config.mirrors,
            vec![
                Mirror::new("https://a.example/zig", 3),
                Mirror::new("https://b.example/zig", 1),
            ]
        );
        assert_eq!(config.last_synced.as_deref(), Some("2025-01-01T00:00:00Z"));
    }

    #[test]
    fn load_rejects_legacy_file_with_http_mirror() {
        let temp = tempfile::tempdir().unwrap();
        let registry = registry(temp.path());
        std::fs::write(
            registry.path(),
            "mirrors = [[\"http://a.example/zig\", 1]]\n",
        )
        .unwrap();

        assert!(registry.load().unwrap().mirrors.is_empty());
    }

    #[test]
    fn load_rejects_legacy_file_with_unknown_keys() {
        let temp = tempfile::tempdir().unwrap();
        let registry = registry(temp.path());
        std::fs::write(
            registry.path(),
            "mirrors = [[\"https://a.example/zig\", 1]]\ncolour = \"blue\"\n",
        )
        .unwrap();

        assert!(registry.load().unwrap().mirrors.is_empty());
    }

    #[test]
    fn is_https_url_requires_host() {
        assert!(is_https_url("https://mirror.example/zig"));
        assert!(!is_https_url("https://"));
        assert!(!is_https_url("http://mirror.example"));
        assert!(!is_https_url("ftp://mirror.example"));
    }
}
