//! Explicit stale-environment deletion.
//!
//! Branch deletion upstream never removes an environment automatically; an
//! operator runs `pet prune` to do it. `dry_run` lists the victims without
//! touching the filesystem.

use std::collections::HashSet;
use std::path::PathBuf;

use pet_core::types::{BackendSettings, EnvName};

use crate::error::{io_err, SyncError};
use crate::sync::Synchronizer;

/// One environment directory prune decided on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneAction {
    pub env: EnvName,
    pub path: PathBuf,
    /// False under `dry_run`.
    pub deleted: bool,
}

/// Delete (or list, under `dry_run`) environment directories whose ref no
/// longer exists upstream. Refreshes the cache first so decisions reflect
/// the current remote state.
pub fn prune(settings: &BackendSettings, dry_run: bool) -> Result<Vec<PruneAction>, SyncError> {
    let sync = Synchronizer::new(settings.clone());
    sync.refresh_cache()?;

    let remote: HashSet<String> = sync
        .remote_refs()?
        .into_iter()
        .map(|r| r.0)
        .collect();

    let mut actions = Vec::new();
    for env in sync.local_envs()? {
        if remote.contains(&env.0) {
            continue;
        }
        let path = sync.environment_dir(&env);
        if dry_run {
            tracing::info!(env = %env, "would prune");
            actions.push(PruneAction {
                env,
                path,
                deleted: false,
            });
        } else {
            tracing::warn!(env = %env, path = %path.display(), "pruning environment");
            std::fs::remove_dir_all(&path).map_err(|e| io_err(&path, e))?;
            actions.push(PruneAction {
                env,
                path,
                deleted: true,
            });
        }
    }
    Ok(actions)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
