//! Error types for pet-sync.

use std::path::PathBuf;

use thiserror::Error;

use pet_transport::TransportError;

/// All errors that can arise from cache, materialization, and install work.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Command execution failure (git, librarian-puppet).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Updating the object cache from the source repository failed.
    /// Aborts every ref of the same request; the cache itself is left as-is.
    #[error("cache update for {url} failed: {detail}")]
    FetchFailed { url: String, detail: String },

    /// Building or swapping an environment directory failed. The previous
    /// live directory stays authoritative.
    #[error("materialization of '{env}' failed: {detail}")]
    MaterializationFailed { env: String, detail: String },

    /// The dependency-resolution tool exited nonzero.
    #[error("dependency install in {path} failed: {detail}")]
    DependencyInstallFailed { path: PathBuf, detail: String },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
