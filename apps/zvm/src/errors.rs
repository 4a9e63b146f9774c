//! Error types for the zvm CLI.
//!
//! `ZvmError` is the typed error returned by the mirror, archive, activation and
//! download modules. The command layer wraps it in `anyhow::Error` for context,
//! while the orchestrator inspects it directly to decide whether a failure is
//! attributable to a mirror (and should lower that mirror's rank) or is fatal.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the library modules.
pub type Result<T> = std::result::Result<T, ZvmError>;

/// Boxed error used for wrapped sources.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Which integrity check rejected an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationKind {
    Checksum,
    Signature,
}

impl fmt::Display for VerificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Checksum => write!(f, "checksum"),
            Self::Signature => write!(f, "signature"),
        }
    }
}

/// Classification of a per-mirror failure, used to weight rank penalties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Timeouts, DNS failures, HTTP errors (including not-found).
    Timeout,
    /// The artifact did not match the published checksum.
    Checksum,
    /// The artifact did not match the published minisign signature.
    Signature,
}

impl FailureKind {
    /// Rank increment applied for this failure.
    #[must_use]
    pub const fn rank_penalty(self) -> u32 {
        match self {
            Self::Timeout => 1,
            Self::Checksum | Self::Signature => 2,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Checksum => write!(f, "checksum"),
            Self::Signature => write!(f, "signature"),
        }
    }
}

/// Consolidated error type for zvm operations.
#[derive(Debug, Error)]
pub enum ZvmError {
    /// Timeout, HTTP error status, DNS or connection failure.
    #[error("network error for {url}: {message}")]
    Network {
        url: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Checksum or signature mismatch.
    #[error("{kind} verification failed: {message}")]
    Verification {
        kind: VerificationKind,
        message: String,
    },

    /// Corrupt archive, memory ceiling exceeded, or the expected executable missing.
    #[error("extraction error: {message}")]
    Extraction {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Backup, restore or population failure while activating a version.
    #[error("{}", format_activation(.version, .message, .backup_path.as_deref(), .rollback_source.as_deref()))]
    Activation {
        version: String,
        message: String,
        /// Present only when the rollback failed and the backup was kept for manual recovery.
        backup_path: Option<PathBuf>,
        #[source]
        source: Option<BoxError>,
        rollback_source: Option<BoxError>,
    },

    /// Invalid mirror URL, non-positive rank, or invalid timestamp rejected at save time.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem failure outside of the extraction path.
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// The requested version is not present under the versions directory.
    #[error("version {version} is not installed")]
    VersionNotInstalled { version: String },

    /// The version string cannot be used to build artifact names.
    #[error("invalid version: {version}")]
    InvalidVersion { version: String },

    /// The install was interrupted and its cleanup hook has run.
    #[error("interrupted")]
    Interrupted,
}

fn format_activation(
    version: &str,
    message: &str,
    backup_path: Option<&std::path::Path>,
    rollback_source: Option<&(dyn std::error::Error + Send + Sync)>,
) -> String {
    let mut out = format!("activation of {version} failed: {message}");
    if let Some(rollback) = rollback_source {
        out.push_str(&format!("; rollback also failed: {rollback}"));
    }
    if let Some(path) = backup_path {
        out.push_str(&format!("; backup retained at {}", path.display()));
    }
    out
}

impl ZvmError {
    /// Creates a new `Network` error.
    #[must_use]
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new `Network` error with a source error.
    #[must_use]
    pub fn network_with_source(
        url: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a new checksum `Verification` error.
    #[must_use]
    pub fn checksum_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::Verification {
            kind: VerificationKind::Checksum,
            message: format!("expected {}, got {}", expected.into(), actual.into()),
        }
    }

    /// Creates a new signature `Verification` error.
    #[must_use]
    pub fn signature_mismatch(message: impl Into<String>) -> Self {
        Self::Verification {
            kind: VerificationKind::Signature,
            message: message.into(),
        }
    }

    /// Creates a new `Extraction` error.
    #[must_use]
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new `Extraction` error with a source error.
    #[must_use]
    pub fn extraction_with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Extraction {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a new `Activation` error without a wrapped cause.
    #[must_use]
    pub fn activation(version: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Activation {
            version: version.into(),
            message: message.into(),
            backup_path: None,
            source: None,
            rollback_source: None,
        }
    }

    /// Creates an `Activation` error after a successful rollback.
    #[must_use]
    pub fn rolled_back(version: impl Into<String>, cause: ZvmError) -> Self {
        Self::Activation {
            version: version.into(),
            message: format!("{cause}; previous installation restored"),
            backup_path: None,
            source: Some(Box::new(cause)),
            rollback_source: None,
        }
    }

    /// Creates an `Activation` error when the rollback itself failed.
    #[must_use]
    pub fn rollback_failed(
        version: impl Into<String>,
        cause: ZvmError,
        rollback: ZvmError,
        backup_path: PathBuf,
    ) -> Self {
        Self::Activation {
            version: version.into(),
            message: cause.to_string(),
            backup_path: Some(backup_path),
            source: Some(Box::new(cause)),
            rollback_source: Some(Box::new(rollback)),
        }
    }

    /// Creates a new `Config` error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a new `Io` error from an I/O error with context.
    #[must_use]
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Creates a new `VersionNotInstalled` error.
    #[must_use]
    pub fn version_not_installed(version: impl Into<String>) -> Self {
        Self::VersionNotInstalled {
            version: version.into(),
        }
    }

    /// Creates a new `InvalidVersion` error.
    #[must_use]
    pub fn invalid_version(version: impl Into<String>) -> Self {
        Self::InvalidVersion {
            version: version.into(),
        }
    }

    /// Classifies this error for mirror ranking.
    ///
    /// Returns `None` for failures that say nothing about the mirror's health.
    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Network { .. } => Some(FailureKind::Timeout),
            Self::Verification {
                kind: VerificationKind::Checksum,
                ..
            } => Some(FailureKind::Checksum),
            Self::Verification {
                kind: VerificationKind::Signature,
                ..
            } => Some(FailureKind::Signature),
            _ => None,
        }
    }

    /// Backup directory kept on disk after a failed rollback, if any.
    #[must_use]
    pub fn retained_backup(&self) -> Option<&std::path::Path> {
        match self {
            Self::Activation { backup_path, .. } => backup_path.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_error_displays_url() {
        let err = ZvmError::network("https://mirror.example/zig.tar.xz", "timed out");
        assert_eq!(
            err.to_string(),
            "network error for https://mirror.example/zig.tar.xz: timed out"
        );
    }

    #[test]
    fn checksum_mismatch_displays_both_values() {
        let err = ZvmError::checksum_mismatch("abc123", "def456");
        assert_eq!(
            err.to_string(),
            "checksum verification failed: expected abc123, got def456"
        );
    }

    #[test]
    fn failure_kind_classifies_mirror_errors() {
        assert_eq!(
            ZvmError::network("u", "m").failure_kind(),
            Some(FailureKind::Timeout)
        );
        assert_eq!(
            ZvmError::checksum_mismatch("a", "b").failure_kind(),
            Some(FailureKind::Checksum)
        );
        assert_eq!(
            ZvmError::signature_mismatch("bad").failure_kind(),
            Some(FailureKind::Signature)
        );
        assert_eq!(ZvmError::extraction("corrupt").failure_kind(), None);
        assert_eq!(ZvmError::config("bad").failure_kind(), None);
    }

    #[test]
    fn rank_penalties_weight_verification_double() {
        assert_eq!(FailureKind::Timeout.rank_penalty(), 1);
        assert_eq!(FailureKind::Checksum.rank_penalty(), 2);
        assert_eq!(FailureKind::Signature.rank_penalty(), 2);
    }

    #[test]
    fn rolled_back_names_version_and_cause() {
        let err = ZvmError::rolled_back("0.13.0", ZvmError::extraction("zig.exe missing"));
        let msg = err.to_string();
        assert!(msg.contains("0.13.0"));
        assert!(msg.contains("zig.exe missing"));
        assert!(err.retained_backup().is_none());
    }

    #[test]
    fn rollback_failed_names_retained_backup() {
        let err = ZvmError::rollback_failed(
            "0.13.0",
            ZvmError::extraction("zig.exe missing"),
            ZvmError::config("copy failed"),
            PathBuf::from("/tmp/backup-1"),
        );
        let msg = err.to_string();
        assert!(msg.contains("rollback also failed"));
        assert!(msg.contains("backup retained at /tmp/backup-1"));
        assert_eq!(
            err.retained_backup(),
            Some(std::path::Path::new("/tmp/backup-1"))
        );
    }
}
