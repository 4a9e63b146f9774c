//! End-to-end installation of a toolchain version.
//!
//! ## Sequence
//!
//! 1. Refresh the ranked mirror set if its sync window has elapsed.
//! 2. Draw up to `max_retries` mirrors with [`MirrorSelector::select_best`].
//! 3. Fetch the `.shasum` and `.minisig` companions from the origin.
//! 4. Try each mirror in order: download to `tmp/`, verify, and on failure
//!    raise the mirror's rank by the failure's penalty before moving on.
//! 5. Fall back to the origin once when every mirror failed.
//! 6. Extract the verified artifact into a staging directory under `tmp/`,
//!    rename it to `versions/<version>/`, and hand it to the platform's
//!    [`ActivationStrategy`].
//!
//! Nothing is extracted or activated before verification succeeds. A successful
//! activation is the commit point: bookkeeping that fails afterwards is logged
//! and never undoes the install. Failures that say nothing about a mirror
//! (disk errors, bad configuration) stop the install immediately instead of
//! trying the next mirror.

use std::path::{Path, PathBuf};

use chrono::{TimeDelta, Utc};
use rand::Rng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::config::ZvmConfig;
use crate::errors::{Result, ZvmError};
use crate::mirrors::community::{CommunityMirrorList, sync_mirrors};
use crate::mirrors::registry::MirrorRegistry;
use crate::mirrors::selector::MirrorSelector;

use super::activate::{ActivationStrategy, activate_installed, strategy_for};
use super::archive::ArchiveExtractor;
use super::cancel::CancellationContext;
use super::download::Fetcher;
use super::paths::ZvmPaths;
use super::platform::{ArchiveKind, Platform};
use super::records::{DownloadRecordStore, DownloadStatus, VerificationSummary};
use super::verify::{compute_sha256, parse_shasum, verify_checksum, verify_minisign};

/// Where the installed artifact came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadSource {
    AlreadyInstalled,
    Mirror(String),
    Origin,
}

/// Result of a successful [`DownloadOrchestrator::install`].
#[derive(Debug, Clone)]
pub struct InstallOutcome {
    pub version: String,
    pub source: DownloadSource,
    pub verification: VerificationSummary,
    pub strategy: &'static str,
}

/// Checksum and signature published next to the origin artifact.
#[derive(Debug, Default)]
struct Companions {
    shasum: Option<String>,
    minisig: Option<String>,
}

/// Parses `version` as semver so it is safe to interpolate into URLs and paths.
///
/// # Errors
///
/// Returns `InvalidVersion` for anything that is not a semver version.
pub fn validate_version(version: &str) -> Result<semver::Version> {
    semver::Version::parse(version).map_err(|_| ZvmError::invalid_version(version))
}

/// Downloads, verifies and activates toolchain versions.
pub struct DownloadOrchestrator<F: Fetcher, R: Rng = StdRng> {
    paths: ZvmPaths,
    config: ZvmConfig,
    platform: Platform,
    fetcher: F,
    selector: MirrorSelector<R>,
    community: CommunityMirrorList,
    records: DownloadRecordStore,
    extractor: ArchiveExtractor,
    strategy: Box<dyn ActivationStrategy>,
    sync_window: TimeDelta,
}

impl<F: Fetcher> DownloadOrchestrator<F, StdRng> {
    /// Creates an orchestrator with an OS-seeded mirror selector.
    ///
    /// # Errors
    ///
    /// Propagates mirror registry load failures and invalid staleness windows.
    pub fn new(paths: ZvmPaths, config: ZvmConfig, platform: Platform, fetcher: F) -> Result<Self> {
        let selector = MirrorSelector::new(MirrorRegistry::new(paths.mirrors_file()))?;
        Self::with_selector(paths, config, platform, fetcher, selector)
    }
}

impl<F: Fetcher, R: Rng> DownloadOrchestrator<F, R> {
    /// Creates an orchestrator around an existing selector.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if either staleness window is out of range.
    pub fn with_selector(
        paths: ZvmPaths,
        config: ZvmConfig,
        platform: Platform,
        fetcher: F,
        selector: MirrorSelector<R>,
    ) -> Result<Self> {
        let sync_window = config.mirror_sync_window()?;
        let extractor = ArchiveExtractor::new(&paths.tmp);
        let strategy = strategy_for(platform, &paths.backups, extractor.clone());
        let community = CommunityMirrorList::new(
            config.community_mirrors_url.clone(),
            paths.community_cache_file(),
            config.mirror_cache_window()?,
        );
        Ok(Self {
            records: DownloadRecordStore::new(paths.downloads_file()),
            paths,
            config,
            platform,
            fetcher,
            selector,
            community,
            extractor,
            strategy,
            sync_window,
        })
    }

    /// Replaces the platform's default activation strategy.
    #[cfg(test)]
    #[must_use]
    pub fn with_strategy(mut self, strategy: Box<dyn ActivationStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    #[cfg(test)]
    #[must_use]
    pub fn selector(&self) -> &MirrorSelector<R> {
        &self.selector
    }

    #[cfg(test)]
    #[must_use]
    pub fn records(&self) -> &DownloadRecordStore {
        &self.records
    }

    /// Installs and activates `version`.
    ///
    /// A cleanup hook is installed on `cancel` for the duration of the
    /// download; it marks the record failed and removes partial files. It runs
    /// when the install fails before activation and is cleared as soon as
    /// activation succeeds.
    ///
    /// # Errors
    ///
    /// Returns `InvalidVersion` before any network access, the origin's error
    /// when every source failed, or the activation error when activation (and
    /// possibly its rollback) failed.
    pub async fn install(
        &mut self,
        version: &str,
        cancel: &CancellationContext,
    ) -> Result<InstallOutcome> {
        validate_version(version)?;
        self.paths.ensure_directories()?;

        if self.paths.is_version_installed(version) {
            info!(%version, "already installed, activating");
            self.activate(version)?;
            return Ok(InstallOutcome {
                version: version.to_string(),
                source: DownloadSource::AlreadyInstalled,
                verification: VerificationSummary::default(),
                strategy: self.strategy.name(),
            });
        }

        let filename = self.platform.artifact_filename(version);
        let origin_url = format!("{}/{version}/{filename}", self.config.origin_base());
        let candidates = self.candidate_mirrors().await;
        let companions = self.fetch_companions(&origin_url).await;

        let install_dir = self.paths.version_dir(version);
        let temp_path = self.paths.tmp.join(format!("{filename}.part"));
        self.close_stale_record(version);
        let record_id = self.records.begin(version, &install_dir, None)?;
        self.arm_cleanup(cancel, record_id, &install_dir, &temp_path);

        let result = self
            .acquire_and_commit(
                version,
                &filename,
                &origin_url,
                &candidates,
                &companions,
                &install_dir,
                &temp_path,
                record_id,
                cancel,
            )
            .await;

        if result.is_err() {
            cancel.cancel();
        }
        result
    }

    /// Activates an installed version through the platform strategy.
    ///
    /// # Errors
    ///
    /// Returns `VersionNotInstalled` or the strategy's activation error.
    pub fn activate(&self, version: &str) -> Result<()> {
        validate_version(version)?;
        activate_installed(self.strategy.as_ref(), &self.paths, version)
    }

    #[allow(clippy::too_many_arguments)]
    async fn acquire_and_commit(
        &mut self,
        version: &str,
        filename: &str,
        origin_url: &str,
        candidates: &[String],
        companions: &Companions,
        install_dir: &Path,
        temp_path: &Path,
        record_id: u64,
        cancel: &CancellationContext,
    ) -> Result<InstallOutcome> {
        let (source, url, verification) = self
            .acquire(filename, origin_url, candidates, companions, temp_path)
            .await?;

        self.promote(temp_path, install_dir, filename)?;
        self.strategy.activate(install_dir, version, &self.paths.bin)?;
        // `bin/` now points into `install_dir`; it must outlive any later failure.
        cancel.clear();

        if let Err(e) = self.paths.set_active_version(version) {
            warn!(%version, error = %e, "failed to record active version");
        }
        if let Err(e) = self.records.complete(record_id, &url, &verification) {
            warn!(%version, record = record_id, error = %e, "failed to complete download record");
        }

        info!(%version, %url, strategy = self.strategy.name(), "installed");
        Ok(InstallOutcome {
            version: version.to_string(),
            source,
            verification,
            strategy: self.strategy.name(),
        })
    }

    async fn candidate_mirrors(&mut self) -> Vec<String> {
        if !self.config.use_mirrors {
            return Vec::new();
        }
        let synced = sync_mirrors(
            &mut self.selector,
            &self.community,
            &self.fetcher,
            false,
            self.sync_window,
            Utc::now(),
        )
        .await;
        if let Err(e) = synced {
            warn!(error = %e, "failed to refresh mirror set");
        }
        let candidates = self.selector.select_best(self.config.max_retries);
        debug!(?candidates, "mirror candidates");
        candidates
    }

    async fn fetch_companions(&self, origin_url: &str) -> Companions {
        let shasum_url = format!("{origin_url}.shasum");
        let shasum = match self.fetcher.fetch_text(&shasum_url).await {
            Ok(text) => {
                let parsed = parse_shasum(&text);
                if parsed.is_none() {
                    warn!(url = %shasum_url, "unparsable checksum file, skipping checksum check");
                }
                parsed
            }
            Err(e) => {
                debug!(error = %e, "no checksum published");
                None
            }
        };

        let minisig = if self.config.minisign_public_key.is_some() {
            match self.fetcher.fetch_text(&format!("{origin_url}.minisig")).await {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!(error = %e, "signature unavailable, installing without signature check");
                    None
                }
            }
        } else {
            None
        };

        Companions { shasum, minisig }
    }

    /// Downloads a verified artifact into `temp_path`, returning where it came
    /// from.
    async fn acquire(
        &mut self,
        filename: &str,
        origin_url: &str,
        candidates: &[String],
        companions: &Companions,
        temp_path: &Path,
    ) -> Result<(DownloadSource, String, VerificationSummary)> {
        for mirror in candidates {
            let url = format!("{}/{filename}", mirror.trim_end_matches('/'));
            match self.fetch_verified(&url, temp_path, companions).await {
                Ok(summary) => return Ok((DownloadSource::Mirror(mirror.clone()), url, summary)),
                Err(e) => {
                    let Some(kind) = e.failure_kind() else {
                        return Err(e);
                    };
                    warn!(%mirror, %kind, error = %e, "mirror failed");
                    if let Err(rank_error) = self.selector.update_rank(mirror, kind) {
                        warn!(%mirror, error = %rank_error, "failed to persist mirror rank");
                    }
                }
            }
        }

        if !candidates.is_empty() {
            info!("all mirrors failed, falling back to origin");
        }
        let summary = self.fetch_verified(origin_url, temp_path, companions).await?;
        Ok((DownloadSource::Origin, origin_url.to_string(), summary))
    }

    async fn fetch_verified(
        &self,
        url: &str,
        temp_path: &Path,
        companions: &Companions,
    ) -> Result<VerificationSummary> {
        remove_if_present(temp_path);
        let result = self.download_and_verify(url, temp_path, companions).await;
        if result.is_err() {
            remove_if_present(temp_path);
        }
        result
    }

    async fn download_and_verify(
        &self,
        url: &str,
        temp_path: &Path,
        companions: &Companions,
    ) -> Result<VerificationSummary> {
        self.fetcher.download(url, temp_path).await?;

        let mut summary = VerificationSummary::default();
        match &companions.shasum {
            Some(expected) => {
                verify_checksum(temp_path, expected)?;
                summary.checksum = Some(expected.clone());
                summary.checksum_verified = true;
            }
            None => summary.checksum = Some(compute_sha256(temp_path)?),
        }

        if let (Some(signature), Some(key)) =
            (&companions.minisig, &self.config.minisign_public_key)
        {
            verify_minisign(temp_path, signature, key)?;
            summary.minisign_verified = true;
        }

        debug!(%url, ?summary, "artifact verified");
        Ok(summary)
    }

    /// Moves the verified artifact into the versions directory.
    ///
    /// The payload is staged under `tmp/` and renamed into place, so
    /// `install_dir` only ever appears complete. Tarballs are extracted with
    /// their wrapper stripped; zip files are kept as-is for the
    /// extraction-based activation to unpack.
    fn promote(&self, temp_path: &Path, install_dir: &Path, filename: &str) -> Result<()> {
        let staging = self.paths.tmp.join(format!("{filename}.staging"));
        remove_dir_if_present(&staging)?;

        let staged = self.stage(temp_path, &staging, filename);
        remove_if_present(temp_path);
        if let Err(e) = staged {
            if let Err(cleanup) = remove_dir_if_present(&staging) {
                warn!(error = %cleanup, "failed to remove staging directory");
            }
            return Err(e);
        }

        remove_dir_if_present(install_dir)?;
        std::fs::rename(&staging, install_dir).map_err(|e| {
            ZvmError::io(
                format!("failed to move {} to {}", staging.display(), install_dir.display()),
                e,
            )
        })
    }

    fn stage(&self, temp_path: &Path, staging: &Path, filename: &str) -> Result<()> {
        match self.platform.archive_kind() {
            ArchiveKind::TarXz => self.extractor.extract_tar_xz(temp_path, staging),
            ArchiveKind::Zip => {
                std::fs::create_dir_all(staging).map_err(|e| {
                    ZvmError::io(format!("failed to create {}", staging.display()), e)
                })?;
                let dest = staging.join(filename);
                std::fs::rename(temp_path, &dest).map_err(|e| {
                    ZvmError::io(
                        format!("failed to move {} to {}", temp_path.display(), dest.display()),
                        e,
                    )
                })
            }
        }
    }

    /// Marks a record left `downloading` by a killed process as failed.
    fn close_stale_record(&self, version: &str) {
        match self.records.latest(version) {
            Ok(Some(record)) if record.status == DownloadStatus::Downloading => {
                warn!(%version, record = record.id, "previous download was interrupted");
                if let Err(e) = self.records.fail(record.id) {
                    warn!(error = %e, "failed to mark stale download record failed");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to read download records"),
        }
    }

    /// Installs the hook that undoes a half-finished download.
    pub(crate) fn arm_cleanup(
        &self,
        cancel: &CancellationContext,
        record_id: u64,
        install_dir: &Path,
        temp_path: &Path,
    ) {
        let records = self.records.clone();
        let install_dir: PathBuf = install_dir.to_path_buf();
        let temp_path: PathBuf = temp_path.to_path_buf();

        cancel.install_cleanup(move || {
            if let Err(e) = records.fail(record_id) {
                warn!(error = %e, "failed to mark download record failed");
            }
            if install_dir.exists()
                && let Err(e) = std::fs::remove_dir_all(&install_dir)
            {
                warn!(path = %install_dir.display(), error = %e, "failed to remove partial install");
            }
            remove_if_present(&temp_path);
        });
    }
}

fn remove_dir_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ZvmError::io(format!("failed to remove {}", path.display()), e)),
    }
}

fn remove_if_present(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove temporary file"),
    }
}
