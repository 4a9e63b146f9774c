//! Community mirrors: persistence, ranking, and the published mirror list.
//!
//! - [`registry`] - Ranked mirror file with schema migrations
//! - [`selector`] - Failure-driven ranking and weighted selection
//! - [`community`] - Community list fetch, cache, and full resync

pub mod community;
pub mod registry;
pub mod selector;

pub use community::CommunityMirrorList;
pub use registry::MirrorRegistry;
pub use selector::MirrorSelector;
