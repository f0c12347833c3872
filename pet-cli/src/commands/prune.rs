//! `pet prune` — explicit deletion of stale environment directories.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use pet_core::EXIT_OK;

use crate::commands::load_settings;

/// Arguments for `pet prune`.
#[derive(Args, Debug)]
pub struct PruneArgs {
    /// List the directories that would be deleted without deleting them.
    #[arg(long)]
    pub dry_run: bool,
}

impl PruneArgs {
    pub fn run(self, config: Option<&Path>) -> Result<i32> {
        let settings = load_settings(config)?;
        let backend = settings
            .local_backend()
            .context("no local backend configured on this host")?;

        let actions = pet_sync::prune(&backend.settings, self.dry_run)
            .context("prune failed")?;

        if actions.is_empty() {
            println!("Nothing to prune.");
        }
        for action in &actions {
            if action.deleted {
                println!("deleted {} ({})", action.env, action.path.display());
            } else {
                println!("would delete {} ({})", action.env, action.path.display());
            }
        }
        Ok(EXIT_OK)
    }
}
