//! Dependency installation: librarian-puppet inside a materialized
//! environment directory.

use std::path::{Path, PathBuf};

use pet_transport::Transport;

use crate::error::SyncError;

/// Runs the dependency-resolution tool in freshly materialized environments.
///
/// No retry policy; a failed install is reported and left to an operator
/// re-trigger.
#[derive(Debug, Clone)]
pub struct Installer {
    librarian_bin: String,
    /// Shared scratch dir passed via `LIBRARIAN_PUPPET_TMP` so concurrent
    /// installs reuse one module download cache.
    scratch_dir: PathBuf,
}

impl Installer {
    pub fn new(librarian_bin: &str, scratch_dir: PathBuf) -> Self {
        Self {
            librarian_bin: librarian_bin.to_owned(),
            scratch_dir,
        }
    }

    /// Run `<librarian_bin> install` with cwd set to `env_dir`.
    ///
    /// Returns the captured tool output on success; a nonzero exit or
    /// execution error becomes [`SyncError::DependencyInstallFailed`] with
    /// the output preserved in its detail.
    pub fn install(&self, transport: &Transport, env_dir: &Path) -> Result<String, SyncError> {
        tracing::info!(env = %env_dir.display(), "installing dependencies");
        let argv = vec![self.librarian_bin.clone(), "install".to_owned()];
        let env = vec![(
            "LIBRARIAN_PUPPET_TMP".to_owned(),
            self.scratch_dir.display().to_string(),
        )];
        match transport.execute_with_env(&argv, Some(env_dir), &env) {
            Ok(out) if out.success() => Ok(out.combined()),
            Ok(out) => Err(SyncError::DependencyInstallFailed {
                path: env_dir.to_path_buf(),
                detail: format!(
                    "{} install exited with status {}: {}",
                    self.librarian_bin,
                    out.status_code,
                    out.combined()
                ),
            }),
            Err(e) => Err(SyncError::DependencyInstallFailed {
                path: env_dir.to_path_buf(),
                detail: e.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
