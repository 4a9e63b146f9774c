//! Mirror ranking and weighted selection.
//!
//! Each mirror carries a rank (lower is better). A failed download raises the
//! rank of the mirror that served it, and selection draws mirrors with weight
//! `1 / rank²` so a mirror at rank 4 is sixteen times less likely to be picked
//! than one at rank 1.
//!
//! ## Staleness Clocks
//!
//! Two independent windows apply: the community list cache (hours, see
//! [`super::community`]) and the sync window (days), after which the ranked set
//! is rebuilt from scratch. A missing or unparsable timestamp is always expired.

use chrono::{DateTime, TimeDelta, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::config::ConfigStore;
use crate::errors::{FailureKind, Result, ZvmError};

use super::registry::{
    Mirror, MirrorRegistry, MirrorsConfig, format_timestamp, is_https_url, parse_timestamp,
};

/// Whether a timestamp is missing, unparsable, or older than `max_age`.
#[must_use]
pub fn is_expired(timestamp: Option<&str>, max_age: TimeDelta, now: DateTime<Utc>) -> bool {
    match timestamp.and_then(parse_timestamp) {
        Some(ts) => now.signed_duration_since(ts) >= max_age,
        None => true,
    }
}

/// Ranked mirror set backed by a [`MirrorRegistry`].
///
/// The random source is a type parameter so tests can supply a seeded
/// [`StdRng`] and get a reproducible candidate order.
pub struct MirrorSelector<R: Rng = StdRng> {
    registry: MirrorRegistry,
    config: MirrorsConfig,
    rng: R,
}

impl MirrorSelector<StdRng> {
    /// Loads the registry and seeds the selector from the OS entropy source.
    ///
    /// # Errors
    ///
    /// Propagates registry load failures.
    pub fn new(registry: MirrorRegistry) -> Result<Self> {
        Self::with_rng(registry, StdRng::from_os_rng())
    }
}

impl<R: Rng> MirrorSelector<R> {
    /// Loads the registry and uses `rng` for selection.
    ///
    /// # Errors
    ///
    /// Propagates registry load failures.
    pub fn with_rng(registry: MirrorRegistry, rng: R) -> Result<Self> {
        let config = registry.load()?;
        Ok(Self {
            registry,
            config,
            rng,
        })
    }

    #[must_use]
    pub fn mirrors(&self) -> &[Mirror] {
        &self.config.mirrors
    }

    #[must_use]
    pub fn last_synced(&self) -> Option<&str> {
        self.config.last_synced.as_deref()
    }

    /// Rank of `url`, if it is in the set.
    #[must_use]
    pub fn rank_of(&self, url: &str) -> Option<u32> {
        self.config
            .mirrors
            .iter()
            .find(|m| m.url == url)
            .map(|m| m.rank)
    }

    /// Raises the rank of `url` by the penalty for `kind` and persists.
    ///
    /// An unknown URL is inserted at `1 + penalty`.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error for a non-HTTPS URL (the set is left
    /// untouched), or propagates save failures.
    pub fn update_rank(&mut self, url: &str, kind: FailureKind) -> Result<()> {
        if !is_https_url(url) {
            return Err(ZvmError::config(format!(
                "mirror URL must use https: {url}"
            )));
        }

        let penalty = kind.rank_penalty();
        match self.config.mirrors.iter_mut().find(|m| m.url == url) {
            Some(mirror) => mirror.rank = mirror.rank.saturating_add(penalty),
            None => self.config.mirrors.push(Mirror::new(url, 1 + penalty)),
        }
        debug!(%url, %kind, rank = self.rank_of(url), "mirror rank updated");

        self.registry.save(&self.config)
    }

    /// Resets every mirror to rank 1 and persists.
    ///
    /// # Errors
    ///
    /// Propagates save failures.
    pub fn reset_all(&mut self) -> Result<()> {
        for mirror in &mut self.config.mirrors {
            mirror.rank = 1;
        }
        self.registry.save(&self.config)
    }

    /// Replaces the whole set with `urls` at rank 1, stamps `now` as the sync
    /// time, and persists.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if any URL is not HTTPS; nothing is written.
    pub fn replace_all(&mut self, urls: &[String], now: DateTime<Utc>) -> Result<()> {
        let replacement = MirrorsConfig {
            last_synced: Some(format_timestamp(now)),
            mirrors: urls.iter().map(|url| Mirror::new(url.clone(), 1)).collect(),
            ..self.config.clone()
        };
        self.registry.save(&replacement)?;
        self.config = replacement;
        Ok(())
    }

    /// Whether the ranked set is due for a full rebuild.
    #[must_use]
    pub fn is_sync_expired(&self, max_age: TimeDelta, now: DateTime<Utc>) -> bool {
        is_expired(self.last_synced(), max_age, now)
    }

    /// Draws up to `max_retries` distinct HTTPS mirror URLs, weighted by
    /// `1 / rank²`, in the order they should be attempted.
    pub fn select_best(&mut self, max_retries: usize) -> Vec<String> {
        let mut pool: Vec<(&str, f64)> = self
            .config
            .mirrors
            .iter()
            .filter(|m| is_https_url(&m.url))
            .map(|m| (m.url.as_str(), selection_weight(m.rank)))
            .collect();

        let mut chosen = Vec::with_capacity(max_retries.min(pool.len()));
        while chosen.len() < max_retries && !pool.is_empty() {
            let index = pick_index(&mut self.rng, &pool);
            let (url, _) = pool.swap_remove(index);
            chosen.push(url.to_string());
        }
        chosen
    }
}

fn selection_weight(rank: u32) -> f64 {
    let rank = f64::from(rank.max(1));
    1.0 / (rank * rank)
}

/// Picks an index from `pool` proportionally to its weights, falling back to a
/// uniform pick when the total weight is not a positive finite number.
fn pick_index<R: Rng>(rng: &mut R, pool: &[(&str, f64)]) -> usize {
    let total: f64 = pool.iter().map(|(_, w)| w).sum();
    if !(total.is_finite() && total > 0.0) {
        return rng.random_range(0..pool.len());
    }

    let mut target = rng.random::<f64>() * total;
    for (index, (_, weight)) in pool.iter().enumerate() {
        if target < *weight {
            return index;
        }
        target -= weight;
    }
    pool.len() - 1
}
