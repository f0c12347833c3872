//! Environment synchronizer: maps repository refs to environment
//! directories and materializes each tracked ref with an atomic swap.
//!
//! ## Per-ref pipeline
//!
//! 1. Cache update under the entry lock (fetch failure marks every
//!    requested ref sync-failed; nothing else runs).
//! 2. Materialize the ref into a dot-prefixed temp directory next to the
//!    live one, then swap via rename so an external reader (a running
//!    Puppet agent) never observes a half-written tree.
//! 3. Hand the swapped-in directory to the dependency installer.
//!
//! Re-running with an unchanged upstream is a no-op reported as up-to-date.

use std::path::{Path, PathBuf};

use pet_core::types::{
    BackendSettings, EnvName, RefFilter, RefName, SyncOutcome, SyncResult, TransportSpec,
};
use pet_transport::Transport;

use crate::cache::{git_argv, ObjectCache};
use crate::error::{io_err, SyncError};
use crate::install::Installer;

/// Synchronizes one backend's environment directories with the repository.
#[derive(Debug, Clone)]
pub struct Synchronizer {
    settings: BackendSettings,
    transport: Transport,
    cache: ObjectCache,
    installer: Installer,
}

impl Synchronizer {
    /// Always executes locally: remote backends run their own synchronizer
    /// through the `backend-run` entry point.
    pub fn new(settings: BackendSettings) -> Self {
        let transport = Transport::new(TransportSpec::Local, settings.timeout);
        let cache = ObjectCache::new(&settings.cache_dir, &settings.repo_url, &settings.git_bin);
        let installer = Installer::new(
            &settings.librarian_bin,
            ObjectCache::librarian_scratch_dir(&settings.cache_dir),
        );
        Self {
            settings,
            transport,
            cache,
            installer,
        }
    }

    /// Sync the requested refs, returning one result per ref.
    ///
    /// `refresh` skips the upstream fetch when false (the cache is still
    /// cloned on first use, since nothing works without it).
    pub fn sync(&self, filter: &RefFilter, refresh: bool) -> Vec<SyncResult> {
        if refresh || !self.cache.exists() {
            if let Err(e) = self.cache.update(&self.transport) {
                tracing::error!(error = %e, "cache update failed");
                return self.fetch_failure_results(filter, &e);
            }
        }

        let available = match self.cache.refs(&self.transport) {
            Ok(refs) => refs,
            Err(e) => {
                tracing::error!(error = %e, "listing cached refs failed");
                return self.fetch_failure_results(filter, &e);
            }
        };

        let requested: Vec<RefName> = match filter {
            RefFilter::All => available.clone(),
            RefFilter::Only(refs) => refs.clone(),
        };

        requested
            .iter()
            .map(|r| self.sync_ref(r, &available))
            .collect()
    }

    /// Current environment directories under the environment root.
    /// Dot-prefixed entries (in-progress swaps) are not environments.
    pub fn local_envs(&self) -> Result<Vec<EnvName>, SyncError> {
        let root = &self.settings.environment_path;
        if !root.exists() {
            return Ok(vec![]);
        }
        let mut envs: Vec<EnvName> = std::fs::read_dir(root)
            .map_err(|e| io_err(root, e))?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| !name.starts_with('.'))
            .map(EnvName)
            .collect();
        envs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(envs)
    }

    /// Branch heads upstream currently has (for prune decisions).
    pub fn remote_refs(&self) -> Result<Vec<RefName>, SyncError> {
        self.cache.refs(&self.transport)
    }

    /// Force a cache update outside of a sync run.
    pub fn refresh_cache(&self) -> Result<(), SyncError> {
        self.cache.update(&self.transport)
    }

    pub fn environment_dir(&self, env: &EnvName) -> PathBuf {
        self.settings.environment_path.join(&env.0)
    }

    // -- internals ----------------------------------------------------------

    /// A failed cache update marks every requested ref sync-failed. With an
    /// "all known" request the refs are unknowable, so the failure is
    /// recorded once under the pseudo-ref `*`.
    fn fetch_failure_results(&self, filter: &RefFilter, err: &SyncError) -> Vec<SyncResult> {
        let detail = err.to_string();
        let refs: Vec<RefName> = match filter {
            RefFilter::Only(refs) => refs.clone(),
            RefFilter::All => vec![RefName::from("*")],
        };
        refs.into_iter()
            .map(|r| {
                SyncResult::new(
                    r,
                    SyncOutcome::SyncFailed {
                        detail: detail.clone(),
                    },
                    String::new(),
                )
            })
            .collect()
    }

    fn sync_ref(&self, r: &RefName, available: &[RefName]) -> SyncResult {
        let Some(env) = EnvName::for_ref(r) else {
            return SyncResult::new(
                r.clone(),
                SyncOutcome::Skipped {
                    reason: format!("'{r}' is not a valid environment name"),
                },
                String::new(),
            );
        };

        if !available.contains(r) {
            return SyncResult::new(
                r.clone(),
                SyncOutcome::Skipped {
                    reason: format!("ref '{r}' not present in repository"),
                },
                String::new(),
            );
        }

        let new_rev = match self.cache.rev_of(&self.transport, r) {
            Ok(Some(rev)) => rev,
            Ok(None) => {
                return SyncResult::new(
                    r.clone(),
                    SyncOutcome::Skipped {
                        reason: format!("ref '{r}' not present in repository"),
                    },
                    String::new(),
                )
            }
            Err(e) => {
                return SyncResult::new(
                    r.clone(),
                    SyncOutcome::SyncFailed {
                        detail: e.to_string(),
                    },
                    String::new(),
                )
            }
        };

        let live = self.environment_dir(&env);
        let existed = live.exists();
        let old_rev = if existed { self.head_rev(&live) } else { None };

        if old_rev.as_deref() == Some(new_rev.as_str()) {
            tracing::debug!(env = %env, "up to date");
            return SyncResult::new(r.clone(), SyncOutcome::UpToDate, String::new());
        }

        let mut diagnostics = String::new();
        match self.materialize(r, &env, &live) {
            Ok(diag) => diagnostics.push_str(&diag),
            Err(e) => {
                tracing::error!(env = %env, error = %e, "materialization failed");
                return SyncResult::new(
                    r.clone(),
                    SyncOutcome::SyncFailed {
                        detail: e.to_string(),
                    },
                    diagnostics,
                );
            }
        }

        match self.installer.install(&self.transport, &live) {
            Ok(out) => {
                if !out.is_empty() {
                    if !diagnostics.is_empty() {
                        diagnostics.push('\n');
                    }
                    diagnostics.push_str(&out);
                }
                let outcome = if existed {
                    tracing::info!(env = %env, from = %short(old_rev.as_deref()), to = %short(Some(&new_rev)), "environment updated");
                    SyncOutcome::Updated {
                        from: short(old_rev.as_deref()),
                        to: short(Some(&new_rev)),
                    }
                } else {
                    tracing::info!(env = %env, rev = %short(Some(&new_rev)), "environment created");
                    SyncOutcome::Created
                };
                SyncResult::new(r.clone(), outcome, diagnostics)
            }
            Err(e) => SyncResult::new(
                r.clone(),
                SyncOutcome::DependencyFailed {
                    detail: e.to_string(),
                },
                diagnostics,
            ),
        }
    }

    /// The commit the live environment directory is checked out at.
    /// `None` forces re-materialization.
    fn head_rev(&self, live: &Path) -> Option<String> {
        let out = self
            .transport
            .execute(
                &git_argv(&self.settings.git_bin, &["rev-parse", "HEAD"]),
                Some(live),
            )
            .ok()?;
        if out.success() {
            Some(out.stdout.trim().to_owned())
        } else {
            None
        }
    }

    /// Clone the ref from the cache into a temp dir on the same filesystem,
    /// then swap it in. Failure cleans the temp dir; the old tree stays.
    fn materialize(
        &self,
        r: &RefName,
        env: &EnvName,
        live: &Path,
    ) -> Result<String, SyncError> {
        let root = &self.settings.environment_path;
        std::fs::create_dir_all(root).map_err(|e| io_err(root, e))?;

        let tmp = root.join(format!(".{}.new.{}", env.0, std::process::id()));
        if tmp.exists() {
            std::fs::remove_dir_all(&tmp).map_err(|e| io_err(&tmp, e))?;
        }

        let clone = self.transport.execute_checked(
            &git_argv(
                &self.settings.git_bin,
                &[
                    "clone",
                    "--quiet",
                    "--branch",
                    &r.0,
                    &self.cache.entry_path().display().to_string(),
                    &tmp.display().to_string(),
                ],
            ),
            None,
        );
        let diag = match clone {
            Ok(out) => out.combined(),
            Err(e) => {
                let _ = std::fs::remove_dir_all(&tmp);
                return Err(SyncError::MaterializationFailed {
                    env: env.0.clone(),
                    detail: e.to_string(),
                });
            }
        };

        if let Err(e) = swap_dirs(&tmp, live) {
            let _ = std::fs::remove_dir_all(&tmp);
            return Err(SyncError::MaterializationFailed {
                env: env.0.clone(),
                detail: e.to_string(),
            });
        }
        Ok(diag)
    }
}

fn short(rev: Option<&str>) -> String {
    match rev {
        Some(r) => r.chars().take(7).collect(),
        None => "?".to_owned(),
    }
}

/// Replace `live` with `tmp` using renames only.
///
/// An existing live tree is first renamed aside, then the new tree renamed
/// in; if the second rename fails the old tree is renamed back, so the
/// previous materialization stays authoritative. Readers never observe a
/// partially written directory.
pub(crate) fn swap_dirs(tmp: &Path, live: &Path) -> Result<(), SyncError> {
    if !live.exists() {
        return std::fs::rename(tmp, live).map_err(|e| io_err(live, e));
    }

    let name = live
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("environment");
    let old = live.with_file_name(format!(".{}.old.{}", name, std::process::id()));
    if old.exists() {
        std::fs::remove_dir_all(&old).map_err(|e| io_err(&old, e))?;
    }

    std::fs::rename(live, &old).map_err(|e| io_err(live, e))?;
    if let Err(e) = std::fs::rename(tmp, live) {
        let _ = std::fs::rename(&old, live);
        return Err(io_err(live, e));
    }
    // Old tree removal is best-effort; a leftover never shadows the live dir.
    let _ = std::fs::remove_dir_all(&old);
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
