//! Mirrors command for the zvm CLI.
//!
//! ## Usage
//!
//! ```bash
//! zvm mirrors list     # Show ranked mirrors
//! zvm mirrors sync     # Rebuild the set from the community list
//! zvm mirrors reset    # Reset every rank to 1
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Subcommand};

use crate::mirrors::community::sync_mirrors;
use crate::mirrors::{CommunityMirrorList, MirrorRegistry, MirrorSelector};
use crate::toolchain::HttpFetcher;

use super::load_environment;

/// Arguments for the mirrors command.
#[derive(Args)]
pub struct MirrorsArgs {
    #[command(subcommand)]
    pub command: MirrorsCommand,
}

#[derive(Subcommand)]
pub enum MirrorsCommand {
    /// Show every mirror with its rank.
    List,
    /// Fetch the community list and replace the ranked set.
    Sync,
    /// Reset every mirror to rank 1.
    Reset,
}

/// Executes the mirrors command.
///
/// # Errors
///
/// Returns an error if the mirror file cannot be written or, for `sync`, the
/// community list cannot be fetched.
pub async fn execute(args: &MirrorsArgs) -> Result<()> {
    let (paths, config) = load_environment()?;
    let mut selector = MirrorSelector::new(MirrorRegistry::new(paths.mirrors_file()))?;

    match args.command {
        MirrorsCommand::List => {
            if selector.mirrors().is_empty() {
                println!("No mirrors known. Run 'zvm mirrors sync' to fetch the community list.");
                return Ok(());
            }
            let mut mirrors = selector.mirrors().to_vec();
            mirrors.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.url.cmp(&b.url)));
            println!("Mirrors (lower rank is preferred):");
            for mirror in &mirrors {
                println!("  {:>4}  {}", mirror.rank, mirror.url);
            }
            if let Some(synced) = selector.last_synced() {
                println!();
                println!("Last synced: {synced}");
            }
        }
        MirrorsCommand::Sync => {
            let fetcher = HttpFetcher::new(Duration::from_secs(config.request_timeout_secs))?
                .with_progress(false);
            let list = CommunityMirrorList::new(
                config.community_mirrors_url.clone(),
                paths.community_cache_file(),
                config.mirror_cache_window()?,
            );
            sync_mirrors(
                &mut selector,
                &list,
                &fetcher,
                true,
                config.mirror_sync_window()?,
                Utc::now(),
            )
            .await
            .with_context(|| format!("failed to sync mirrors from {}", config.community_mirrors_url))?;
            println!("Synced {} mirrors.", selector.mirrors().len());
        }
        MirrorsCommand::Reset => {
            selector.reset_all()?;
            println!("Reset {} mirrors to rank 1.", selector.mirrors().len());
        }
    }

    Ok(())
}
