//! Diagnostic logging setup.
//!
//! Diagnostics go to stderr through `tracing`; user-facing progress stays on
//! stdout. The filter comes from `ZVM_LOG` when set, otherwise `zvm=warn`
//! (`zvm=debug` with `--verbose`).

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Environment variable holding an `EnvFilter` directive.
pub const LOG_ENV: &str = "ZVM_LOG";

/// Installs the global tracing subscriber. Call once, from `main`.
pub fn init(verbose: bool) {
    let default = if verbose { "zvm=debug" } else { "zvm=warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
