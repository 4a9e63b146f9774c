//! User configuration and the generic file-backed store.
//!
//! [`ConfigStore`] is the load/save contract used by every persisted document
//! (user configuration, ranked mirrors). [`TomlFileStore`] implements it over a
//! single TOML file that is fully overwritten on every save.
//!
//! ## Environment Overrides
//!
//! - `ZVM_ORIGIN` - origin base URL for release artifacts
//! - `ZVM_MIRROR_LIST_URL` - community mirror list URL
//! - `ZVM_NO_MIRRORS` - download from the origin only
//!
//! Empty or whitespace-only values are treated as unset.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use chrono::TimeDelta;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::errors::{Result, ZvmError};

/// Environment variable overriding the origin base URL.
pub const ORIGIN_ENV: &str = "ZVM_ORIGIN";

/// Environment variable overriding the community mirror list URL.
pub const MIRROR_LIST_ENV: &str = "ZVM_MIRROR_LIST_URL";

/// Environment variable disabling mirror use.
pub const NO_MIRRORS_ENV: &str = "ZVM_NO_MIRRORS";

/// Default origin base URL.
const DEFAULT_ORIGIN: &str = "https://ziglang.org/download";

/// Default community mirror list URL.
const DEFAULT_MIRROR_LIST: &str = "https://ziglang.org/download/community-mirrors.txt";

/// Public key the Zig Software Foundation signs releases with.
const DEFAULT_MINISIGN_KEY: &str = "RWSGOq2NVecA2UPNdBUZykf1CCb147pkmdtYxgb3Ti+JO/wCYvhbAb/U";

/// Load/save contract for a persisted document.
pub trait ConfigStore<T> {
    /// Loads the document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document exists but cannot be read or parsed.
    fn load(&self) -> Result<T>;

    /// Persists the document, replacing any previous contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be serialized or written.
    fn save(&self, value: &T) -> Result<()>;
}

/// A [`ConfigStore`] over a single TOML file.
///
/// A missing file loads as `T::default()`.
#[derive(Debug, Clone)]
pub struct TomlFileStore<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TomlFileStore<T> {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T> ConfigStore<T> for TomlFileStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    fn load(&self) -> Result<T> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => {
                return Err(ZvmError::io(
                    format!("failed to read {}", self.path.display()),
                    e,
                ));
            }
        };
        toml::from_str(&content).map_err(|e| {
            ZvmError::config(format!("failed to parse {}: {e}", self.path.display()))
        })
    }

    fn save(&self, value: &T) -> Result<()> {
        let content = toml::to_string_pretty(value).map_err(|e| {
            ZvmError::config(format!("failed to serialize {}: {e}", self.path.display()))
        })?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ZvmError::io(format!("failed to create {}", parent.display()), e)
            })?;
        }
        std::fs::write(&self.path, content)
            .map_err(|e| ZvmError::io(format!("failed to write {}", self.path.display()), e))
    }
}

/// User configuration read from `config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZvmConfig {
    /// Base URL of the authoritative release server.
    pub origin_base_url: String,
    /// Plaintext list of community mirrors.
    pub community_mirrors_url: String,
    /// Maximum number of mirrors attempted before falling back to the origin.
    pub max_retries: usize,
    /// Freshness window of the cached community list, in hours.
    pub mirror_cache_hours: i64,
    /// Age after which the ranked mirror set is rebuilt, in days.
    pub mirror_sync_days: i64,
    /// Whether mirrors are used at all.
    pub use_mirrors: bool,
    /// Minisign public key used to verify release signatures.
    pub minisign_public_key: Option<String>,
    /// Per-request timeout for downloads, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ZvmConfig {
    fn default() -> Self {
        Self {
            origin_base_url: DEFAULT_ORIGIN.to_string(),
            community_mirrors_url: DEFAULT_MIRROR_LIST.to_string(),
            max_retries: 3,
            mirror_cache_hours: 24,
            mirror_sync_days: 7,
            use_mirrors: true,
            minisign_public_key: Some(DEFAULT_MINISIGN_KEY.to_string()),
            request_timeout_secs: 300,
        }
    }
}

impl ZvmConfig {
    /// Loads the configuration from `path` and applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is not valid TOML, or if a
    /// staleness window is negative or too large to represent.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = TomlFileStore::<Self>::new(path).load()?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Checks values that serde alone cannot reject.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error naming the offending field.
    pub fn validate(&self) -> Result<()> {
        self.mirror_cache_window()?;
        self.mirror_sync_window()?;
        Ok(())
    }

    /// Freshness window of the cached community list.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if `mirror_cache_hours` is out of range.
    pub fn mirror_cache_window(&self) -> Result<TimeDelta> {
        window("mirror_cache_hours", self.mirror_cache_hours, TimeDelta::try_hours)
    }

    /// Age after which the ranked mirror set is rebuilt.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if `mirror_sync_days` is out of range.
    pub fn mirror_sync_window(&self) -> Result<TimeDelta> {
        window("mirror_sync_days", self.mirror_sync_days, TimeDelta::try_days)
    }

    fn apply_env(&mut self) {
        if let Some(origin) = env_value(ORIGIN_ENV) {
            self.origin_base_url = origin;
        }
        if let Some(list) = env_value(MIRROR_LIST_ENV) {
            self.community_mirrors_url = list;
        }
        if env_value(NO_MIRRORS_ENV).is_some() {
            self.use_mirrors = false;
        }
    }

    /// Origin base URL without a trailing slash.
    #[must_use]
    pub fn origin_base(&self) -> &str {
        self.origin_base_url.trim_end_matches('/')
    }
}

fn window(field: &str, value: i64, to_delta: fn(i64) -> Option<TimeDelta>) -> Result<TimeDelta> {
    if value < 0 {
        return Err(ZvmError::config(format!("{field} must not be negative, got {value}")));
    }
    to_delta(value).ok_or_else(|| ZvmError::config(format!("{field} is out of range: {value}")))
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let store = TomlFileStore::<ZvmConfig>::new(temp.path().join("config.toml"));

        assert_eq!(store.load().unwrap(), ZvmConfig::default());
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "max_retries = 5\nuse_mirrors = false\n").unwrap();

        let config = TomlFileStore::<ZvmConfig>::new(&path).load().unwrap();
        assert_eq!(config.max_retries, 5);
        assert!(!config.use_mirrors);
        assert_eq!(config.mirror_sync_days, 7);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "max_retries = [").unwrap();

        let err = TomlFileStore::<ZvmConfig>::new(&path).load().unwrap_err();
        assert!(matches!(err, ZvmError::Config { .. }));
    }

    #[test]
    fn save_overwrites_whole_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("nested").join("config.toml");
        let store = TomlFileStore::<ZvmConfig>::new(&path);

        let config = ZvmConfig {
            max_retries: 9,
            ..ZvmConfig::default()
        };
        store.save(&config).unwrap();
        assert_eq!(store.load().unwrap(), config);

        store.save(&ZvmConfig::default()).unwrap();
        assert_eq!(store.load().unwrap().max_retries, 3);
    }

    #[test]
    #[serial_test::serial]
    fn environment_overrides_file_values() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "origin_base_url = \"https://file.example/download\"\n").unwrap();

        // SAFETY: This test is marked #[serial_test::serial] to ensure exclusive
        // access to environment variables. No other tests run concurrently.
        unsafe {
            std::env::set_var(ORIGIN_ENV, "https://env.example/download");
            std::env::set_var(NO_MIRRORS_ENV, "1");
            std::env::set_var(MIRROR_LIST_ENV, "   ");
        }
        let config = ZvmConfig::load(&path).unwrap();
        unsafe {
            std::env::remove_var(ORIGIN_ENV);
            std::env::remove_var(NO_MIRRORS_ENV);
            std::env::remove_var(MIRROR_LIST_ENV);
        }

        assert_eq!(config.origin_base_url, "https://env.example/download");
        assert!(!config.use_mirrors);
        assert_eq!(config.community_mirrors_url, DEFAULT_MIRROR_LIST);
    }

    #[test]
    fn out_of_range_windows_are_rejected_at_load() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");

        std::fs::write(&path, format!("mirror_cache_hours = {}\n", i64::MAX)).unwrap();
        let err = ZvmConfig::load(&path).unwrap_err();
        assert!(matches!(err, ZvmError::Config { .. }));
        assert!(err.to_string().contains("mirror_cache_hours"));

        std::fs::write(&path, "mirror_sync_days = -1\n").unwrap();
        let err = ZvmConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("mirror_sync_days"));
    }

    #[test]
    fn default_windows_convert_to_durations() {
        let config = ZvmConfig::default();
        assert_eq!(config.mirror_cache_window().unwrap(), TimeDelta::hours(24));
        assert_eq!(config.mirror_sync_window().unwrap(), TimeDelta::days(7));
    }

    #[test]
    fn origin_base_strips_trailing_slash() {
        let config = ZvmConfig {
            origin_base_url: "https://ziglang.org/download/".to_string(),
            ..ZvmConfig::default()
        };
        assert_eq!(config.origin_base(), "https://ziglang.org/download");
    }
}
