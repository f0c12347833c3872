//! # pet-sync
//!
//! Repository-to-directory materialization for one backend host: the shared
//! object cache, the environment synchronizer with its atomic-swap
//! discipline, the dependency installer, and explicit environment pruning.

pub mod cache;
pub mod error;
pub mod install;
pub mod prune;
pub mod sync;

#[cfg(test)]
pub(crate) mod testutil;

pub use cache::ObjectCache;
pub use error::SyncError;
pub use install::Installer;
pub use prune::{prune, PruneAction};
pub use sync::Synchronizer;
