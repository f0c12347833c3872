//! Error types for pet-transport.

use std::time::Duration;

use thiserror::Error;

/// All errors that can arise from executing a command through a transport.
///
/// `Spawn` and `TimedOut` mean the backend could not be executed at all;
/// the dispatcher maps them to backend-unreachable. `CommandFailed` means
/// the command ran and reported failure itself.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The process could not be started (missing binary, permissions).
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on or reading from the child process failed.
    #[error("failed waiting on '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The command exceeded the caller-configured timeout and was killed.
    #[error("'{program}' timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    /// The command ran but exited nonzero (only from `execute_checked`).
    #[error("'{program}' exited with status {status_code}: {stderr}")]
    CommandFailed {
        program: String,
        status_code: i32,
        stderr: String,
    },
}

impl TransportError {
    /// True when the failure means the backend host itself was unreachable
    /// rather than the command reporting an error.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            TransportError::Spawn { .. }
                | TransportError::Wait { .. }
                | TransportError::TimedOut { .. }
        )
    }
}
