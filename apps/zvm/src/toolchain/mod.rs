//! Toolchain acquisition and activation.
//!
//! ## Module Structure
//!
//! - [`platform`] - OS and architecture detection, artifact naming
//! - [`paths`] - Home directory layout
//! - [`fs`] - Filesystem abstraction used by activation
//! - [`archive`] - Bounded tar.xz and zip extraction
//! - [`verify`] - SHA256 and minisign verification
//! - [`download`] - HTTP transport
//! - [`records`] - Download history
//! - [`cancel`] - Per-download cleanup hook
//! - [`activate`] - Symlink and transactional activation strategies
//! - [`orchestrator`] - Mirror-aware install pipeline

pub mod activate;
pub mod archive;
pub mod cancel;
pub mod download;
pub mod fs;
pub mod orchestrator;
pub mod paths;
pub mod platform;
pub mod records;
pub mod verify;

pub use cancel::CancellationContext;
pub use download::HttpFetcher;
pub use orchestrator::DownloadOrchestrator;
pub use paths::ZvmPaths;
pub use platform::Platform;
