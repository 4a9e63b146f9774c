//! List command for the zvm CLI.
//!
//! ## Output Format
//!
//! ```text
//! Installed versions:
//!   0.12.0
//! * 0.13.0    (active)
//! ```

use anyhow::Result;

use super::load_environment;

/// Executes the list command.
///
/// # Errors
///
/// Returns an error if the versions directory cannot be read.
pub fn execute() -> Result<()> {
    let (paths, _config) = load_environment()?;
    let versions = paths.list_installed_versions()?;
    let active = paths.active_version()?;

    if versions.is_empty() {
        println!("No versions installed.");
        println!();
        println!("Run 'zvm install <version>' to install one.");
        return Ok(());
    }

    println!("Installed versions:");
    for version in &versions {
        if active.as_deref() == Some(version.as_str()) {
            println!("* {version}    (active)");
        } else {
            println!("  {version}");
        }
    }

    Ok(())
}
