//! The community mirror list and full resynchronisation of the ranked set.
//!
//! The list is a plaintext document with one HTTPS base URL per line, served
//! from a well-known location. It is cached on disk as JSON with its fetch time
//! and re-fetched once the cache window has elapsed.

use std::path::PathBuf;

use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{Result, ZvmError};
use crate::toolchain::download::Fetcher;

use super::registry::{format_timestamp, is_https_url};
use super::selector::{MirrorSelector, is_expired};

/// Parses a newline-delimited mirror list.
///
/// Blank lines, `#` comments and non-HTTPS entries are skipped; trailing
/// slashes are removed and duplicates dropped, keeping first occurrence order.
#[must_use]
pub fn parse_mirror_list(text: &str) -> Vec<String> {
    let mut mirrors: Vec<String> = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let url = line.trim_end_matches('/');
        if !is_https_url(url) {
            debug!(entry = %line, "skipping non-https mirror entry");
            continue;
        }
        if !mirrors.iter().any(|m| m == url) {
            mirrors.push(url.to_string());
        }
    }
    mirrors
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CachedList {
    fetched_at: String,
    mirrors: Vec<String>,
}

/// Fetches the community list, serving it from the on-disk cache while fresh.
#[derive(Debug, Clone)]
pub struct CommunityMirrorList {
    url: String,
    cache_path: PathBuf,
    cache_window: TimeDelta,
}

impl CommunityMirrorList {
    #[must_use]
    pub fn new(url: impl Into<String>, cache_path: impl Into<PathBuf>, cache_window: TimeDelta) -> Self {
        Self {
            url: url.into(),
            cache_path: cache_path.into(),
            cache_window,
        }
    }

    /// Returns the mirror list, from cache when `force` is false and the cache
    /// is younger than the cache window.
    ///
    /// # Errors
    ///
    /// Returns a `Network` error if the list has to be fetched and cannot be.
    pub async fn fetch<F: Fetcher>(
        &self,
        fetcher: &F,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        if !force && let Some(cached) = self.read_cache(now) {
            debug!(count = cached.len(), "using cached community mirror list");
            return Ok(cached);
        }

        let text = fetcher.fetch_text(&self.url).await?;
        let mirrors = parse_mirror_list(&text);
        if let Err(e) = self.write_cache(&mirrors, now) {
            warn!(path = %self.cache_path.display(), error = %e, "failed to cache mirror list");
        }
        Ok(mirrors)
    }

    fn read_cache(&self, now: DateTime<Utc>) -> Option<Vec<String>> {
        let content = std::fs::read_to_string(&self.cache_path).ok()?;
        let cached: CachedList = serde_json::from_str(&content).ok()?;
        if is_expired(Some(&cached.fetched_at), self.cache_window, now) {
            return None;
        }
        Some(cached.mirrors)
    }

    fn write_cache(&self, mirrors: &[String], now: DateTime<Utc>) -> Result<()> {
        let cached = CachedList {
            fetched_at: format_timestamp(now),
            mirrors: mirrors.to_vec(),
        };
        let json = serde_json::to_string_pretty(&cached)
            .map_err(|e| ZvmError::config(format!("failed to serialize mirror cache: {e}")))?;
        if let Some(parent) = self.cache_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ZvmError::io(format!("failed to create {}", parent.display()), e)
            })?;
        }
        std::fs::write(&self.cache_path, json).map_err(|e| {
            ZvmError::io(format!("failed to write {}", self.cache_path.display()), e)
        })
    }
}

/// Rebuilds the ranked set from the community list when it is due.
///
/// A rebuild happens when `force` is set, the sync window has elapsed, or the
/// set is empty. It replaces every mirror with the fetched list at rank 1.
/// Returns whether a rebuild happened.
///
/// # Errors
///
/// When forced, a fetch failure is returned. Otherwise it is logged and the
/// existing ranks are kept.
pub async fn sync_mirrors<F: Fetcher, R: Rng>(
    selector: &mut MirrorSelector<R>,
    list: &CommunityMirrorList,
    fetcher: &F,
    force: bool,
    sync_window: TimeDelta,
    now: DateTime<Utc>,
) -> Result<bool> {
    let due = force || selector.mirrors().is_empty() || selector.is_sync_expired(sync_window, now);
    if !due {
        debug!("mirror ranks are fresh");
        return Ok(false);
    }

    match list.fetch(fetcher, force, now).await {
        Ok(urls) => {
            selector.replace_all(&urls, now)?;
            info!(count = urls.len(), "mirror set rebuilt from community list");
            Ok(true)
        }
        Err(e) if force => Err(e),
        Err(e) => {
            warn!(error = %e, "could not refresh community mirror list, keeping existing ranks");
            Ok(false)
        }
    }
}
