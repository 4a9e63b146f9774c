//! Path management for the zvm home directory.
//!
//! The default root directory is `~/.zvm/` (or `%APPDATA%\zvm` on Windows),
//! which can be overridden by setting the `ZVM_HOME` environment variable.
//!
//! ## Directory Structure
//!
//! ```text
//! ~/.zvm/                     # Root directory (or ZVM_HOME)
//!   versions/                 # Installed toolchain versions
//!     0.13.0/
//!       zig                   # Extracted toolchain (wrapper directory stripped)
//!       lib/
//!   bin/                      # Active toolchain (symlink on POSIX, extracted copy on Windows)
//!   backups/                  # Activation backups kept only while an activation runs
//!   tmp/                      # Partial downloads and temporary tar files
//!   cache/
//!     community-mirrors.json  # Cached community mirror list
//!   mirrors.toml              # Ranked mirror set
//!   downloads.json            # Download records
//!   config.toml               # User configuration
//!   active                    # File containing the active version string
//! ```
//!
//! The home directory is single-writer: concurrent zvm processes against the
//! same root are unsupported.

use std::path::PathBuf;

use crate::errors::{Result, ZvmError};

/// Environment variable to override the default root directory.
pub const ZVM_HOME_ENV: &str = "ZVM_HOME";

/// Manages paths inside the zvm home directory.
#[derive(Debug, Clone)]
pub struct ZvmPaths {
    /// Root directory for all zvm data (`~/.zvm` or `ZVM_HOME`).
    pub root: PathBuf,
    /// Directory containing installed versions.
    pub versions: PathBuf,
    /// Directory holding the active executable.
    pub bin: PathBuf,
    /// Directory for activation backups.
    pub backups: PathBuf,
    /// Directory for temporary files.
    pub tmp: PathBuf,
    /// Directory for cached network data.
    pub cache: PathBuf,
}

impl ZvmPaths {
    /// Creates a new `ZvmPaths` instance.
    ///
    /// The root directory is determined by:
    /// 1. The `ZVM_HOME` environment variable if set
    /// 2. On Windows: `%APPDATA%\zvm`
    /// 3. On Unix: `~/.zvm` in the user's home directory
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self> {
        let root = match std::env::var(ZVM_HOME_ENV) {
            Ok(home) if !home.trim().is_empty() => PathBuf::from(home),
            _ => {
                #[cfg(windows)]
                {
                    dirs::data_dir()
                        .ok_or_else(|| {
                            ZvmError::config(
                                "cannot determine AppData directory; set ZVM_HOME",
                            )
                        })?
                        .join("zvm")
                }
                #[cfg(not(windows))]
                {
                    dirs::home_dir()
                        .ok_or_else(|| {
                            ZvmError::config("cannot determine home directory; set ZVM_HOME")
                        })?
                        .join(".zvm")
                }
            }
        };

        Ok(Self::with_root(root))
    }

    /// Creates a new `ZvmPaths` instance with a specific root directory.
    #[must_use = "returns new paths instance without side effects"]
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            versions: root.join("versions"),
            bin: root.join("bin"),
            backups: root.join("backups"),
            tmp: root.join("tmp"),
            cache: root.join("cache"),
            root,
        }
    }

    /// Returns the installation directory of a specific version.
    #[must_use = "returns the path without side effects"]
    pub fn version_dir(&self, version: &str) -> PathBuf {
        self.versions.join(version)
    }

    /// Returns the path of the ranked mirror file.
    #[must_use]
    pub fn mirrors_file(&self) -> PathBuf {
        self.root.join("mirrors.toml")
    }

    /// Returns the path of the community mirror list cache.
    #[must_use]
    pub fn community_cache_file(&self) -> PathBuf {
        self.cache.join("community-mirrors.json")
    }

    /// Returns the path of the download record store.
    #[must_use]
    pub fn downloads_file(&self) -> PathBuf {
        self.root.join("downloads.json")
    }

    /// Returns the path of the user configuration file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Returns the path of the file recording the active version.
    #[must_use]
    pub fn active_file(&self) -> PathBuf {
        self.root.join("active")
    }

    /// Checks if a specific version is installed.
    #[must_use = "returns installation status without side effects"]
    pub fn is_version_installed(&self, version: &str) -> bool {
        self.version_dir(version).is_dir()
    }

    /// Returns the currently active version, if one was recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the active file exists but cannot be read.
    pub fn active_version(&self) -> Result<Option<String>> {
        let path = self.active_file();
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|e| {
            ZvmError::io(format!("failed to read {}", path.display()), e)
        })?;
        let version = content.trim();
        if version.is_empty() {
            Ok(None)
        } else {
            Ok(Some(version.to_string()))
        }
    }

    /// Records the active version.
    ///
    /// # Errors
    ///
    /// Returns an error if the active file cannot be written.
    pub fn set_active_version(&self, version: &str) -> Result<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| {
            ZvmError::io(format!("failed to create {}", self.root.display()), e)
        })?;
        let path = self.active_file();
        std::fs::write(&path, version)
            .map_err(|e| ZvmError::io(format!("failed to write {}", path.display()), e))
    }

    /// Lists all installed versions, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the versions directory cannot be read.
    pub fn list_installed_versions(&self) -> Result<Vec<String>> {
        if !self.versions.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.versions).map_err(|e| {
            ZvmError::io(format!("failed to read {}", self.versions.display()), e)
        })?;

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ZvmError::io("failed to read directory entry", e))?;
            let path = entry.path();
            if path.is_dir()
                && let Some(name) = path.file_name()
                && let Some(name_str) = name.to_str()
            {
                versions.push(name_str.to_string());
            }
        }

        versions.sort();
        Ok(versions)
    }

    /// Ensures all required directories exist.
    ///
    /// # Errors
    ///
    /// Returns an error if any directory cannot be created.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            &self.root,
            &self.versions,
            &self.bin,
            &self.backups,
            &self.tmp,
            &self.cache,
        ] {
            std::fs::create_dir_all(dir)
                .map_err(|e| ZvmError::io(format!("failed to create {}", dir.display()), e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_with_root_lay_out_home() {
        let root = std::env::temp_dir().join("zvm_test_home");
        let paths = ZvmPaths::with_root(root.clone());

        assert_eq!(paths.versions, root.join("versions"));
        assert_eq!(paths.bin, root.join("bin"));
        assert_eq!(paths.backups, root.join("backups"));
        assert_eq!(paths.tmp, root.join("tmp"));
        assert_eq!(paths.mirrors_file(), root.join("mirrors.toml"));
        assert_eq!(
            paths.community_cache_file(),
            root.join("cache").join("community-mirrors.json")
        );
    }

    #[test]
    fn version_dir_constructs_correct_path() {
        let root = std::env::temp_dir().join("zvm_test_version_dir");
        let paths = ZvmPaths::with_root(root.clone());

        assert_eq!(
            paths.version_dir("0.13.0"),
            root.join("versions").join("0.13.0")
        );
    }

    #[test]
    fn list_installed_versions_returns_empty_when_missing() {
        let temp = tempfile::tempdir().unwrap();
        let paths = ZvmPaths::with_root(temp.path().to_path_buf());

        assert!(paths.list_installed_versions().unwrap().is_empty());
    }

    #[test]
    fn list_installed_versions_is_sorted() {
        let temp = tempfile::tempdir().unwrap();
        let paths = ZvmPaths::with_root(temp.path().to_path_buf());
        std::fs::create_dir_all(paths.version_dir("0.13.0")).unwrap();
        std::fs::create_dir_all(paths.version_dir("0.11.0")).unwrap();

        assert_eq!(
            paths.list_installed_versions().unwrap(),
            vec!["0.11.0".to_string(), "0.13.0".to_string()]
        );
    }

    #[test]
    fn active_version_round_trips() {
        let temp = tempfile::tempdir().unwrap();
        let paths = ZvmPaths::with_root(temp.path().to_path_buf());

        assert_eq!(paths.active_version().unwrap(), None);
        paths.set_active_version("0.13.0").unwrap();
        assert_eq!(paths.active_version().unwrap().as_deref(), Some("0.13.0"));
    }
}
