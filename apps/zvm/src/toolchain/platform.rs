//! Platform detection for the zvm toolchain.
//!
//! This module maps the compile-time target to the names used in release
//! artifact URLs and decides which activation strategy the platform supports.
//!
//! ## Supported Platforms
//!
//! - Linux `x86_64` / `aarch64`
//! - macOS `x86_64` / `aarch64`
//! - Windows `x86_64` / `aarch64`

use std::fmt;

use crate::errors::{Result, ZvmError};

/// Operating system family of a release artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    Linux,
    Macos,
    Windows,
}

/// CPU architecture of a release artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86_64,
    Aarch64,
}

/// Archive format the release server publishes for a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarXz,
    Zip,
}

impl ArchiveKind {
    /// File extension without the leading dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::TarXz => "tar.xz",
            Self::Zip => "zip",
        }
    }
}

/// A supported OS/architecture pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
    pub os: OsFamily,
    pub arch: Arch,
}

impl Platform {
    /// Creates a platform from its parts.
    #[must_use]
    pub const fn new(os: OsFamily, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Detects the current platform based on compile-time configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the current OS/architecture combination is not supported.
    pub fn detect() -> Result<Self> {
        let os = match std::env::consts::OS {
            "linux" => OsFamily::Linux,
            "macos" => OsFamily::Macos,
            "windows" => OsFamily::Windows,
            other => {
                return Err(ZvmError::config(format!("unsupported operating system: {other}")));
            }
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => Arch::X86_64,
            "aarch64" => Arch::Aarch64,
            other => return Err(ZvmError::config(format!("unsupported architecture: {other}"))),
        };
        Ok(Self::new(os, arch))
    }

    /// OS segment used in artifact names (`linux`, `macos`, `windows`).
    #[must_use = "returns the OS string without side effects"]
    pub fn os_str(self) -> &'static str {
        match self.os {
            OsFamily::Linux => "linux",
            OsFamily::Macos => "macos",
            OsFamily::Windows => "windows",
        }
    }

    /// Architecture segment used in artifact names.
    #[must_use = "returns the arch string without side effects"]
    pub fn arch_str(self) -> &'static str {
        match self.arch {
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
        }
    }

    /// Returns the executable file extension for this platform.
    #[must_use = "returns the extension string without side effects"]
    pub fn executable_extension(self) -> &'static str {
        match self.os {
            OsFamily::Windows => ".exe",
            OsFamily::Linux | OsFamily::Macos => "",
        }
    }

    /// Name of the toolchain executable on this platform (`zig` or `zig.exe`).
    #[must_use]
    pub fn executable_name(self) -> String {
        format!("zig{}", self.executable_extension())
    }

    /// Archive format published for this platform.
    #[must_use]
    pub fn archive_kind(self) -> ArchiveKind {
        match self.os {
            OsFamily::Windows => ArchiveKind::Zip,
            OsFamily::Linux | OsFamily::Macos => ArchiveKind::TarXz,
        }
    }

    /// Whether activation can rely on a symlink into the versions directory.
    #[must_use]
    pub fn supports_symlinks(self) -> bool {
        !matches!(self.os, OsFamily::Windows)
    }

    /// Artifact base name without extension, e.g. `zig-linux-x86_64-0.13.0`.
    #[must_use]
    pub fn artifact_stem(self, version: &str) -> String {
        format!("zig-{}-{}-{version}", self.os_str(), self.arch_str())
    }

    /// Full artifact file name, e.g. `zig-linux-x86_64-0.13.0.tar.xz`.
    #[must_use]
    pub fn artifact_filename(self, version: &str) -> String {
        format!(
            "{}.{}",
            self.artifact_stem(version),
            self.archive_kind().extension()
        )
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os_str(), self.arch_str())
    }
}
