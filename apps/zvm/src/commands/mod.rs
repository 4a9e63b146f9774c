//! Command modules for the zvm CLI.
//!
//! - [`install`] - Download, verify and activate a version
//! - [`use_cmd`] - Activate an installed version
//! - [`list`] - List installed versions
//! - [`mirrors`] - Inspect, resync or reset the ranked mirror set

pub mod install;
pub mod list;
pub mod mirrors;
pub mod use_cmd;

use anyhow::{Context, Result};

use crate::config::ZvmConfig;
use crate::toolchain::ZvmPaths;

/// Resolves the home directory and loads its configuration.
fn load_environment() -> Result<(ZvmPaths, ZvmConfig)> {
    let paths = ZvmPaths::new()?;
    let config = ZvmConfig::load(&paths.config_file())
        .with_context(|| format!("failed to load {}", paths.config_file().display()))?;
    Ok((paths, config))
}
