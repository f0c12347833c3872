//! `pet backend-run` — the entry point a dispatcher invokes over the remote
//! shell. Runs the local pipeline against this host's own configuration and
//! prints the result vector as JSON on stdout.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use pet_core::types::{RefFilter, RefName, SyncRequest, BackendFilter};
use pet_core::{EXIT_OK, EXIT_SYNC_FAILED};
use pet_dispatch::run_local;

use crate::commands::load_settings;

/// Arguments for `pet backend-run`.
#[derive(Args, Debug)]
pub struct BackendRunArgs {
    /// Branches to sync (default: every branch in the repository).
    #[arg(value_name = "REF")]
    pub refs: Vec<String>,

    /// Trust the current object cache instead of fetching upstream.
    #[arg(long, short = 'n')]
    pub no_refresh: bool,
}

impl BackendRunArgs {
    pub fn run(self, config: Option<&Path>) -> Result<i32> {
        let settings = load_settings(config)?;
        let backend = settings
            .local_backend()
            .context("no local backend configured on this host")?;

        let request = SyncRequest {
            refs: if self.refs.is_empty() {
                RefFilter::All
            } else {
                RefFilter::Only(self.refs.iter().map(|r| RefName::from(r.as_str())).collect())
            },
            backends: BackendFilter::All,
            refresh_cache: !self.no_refresh,
        };

        let results = run_local(backend, &request);
        println!(
            "{}",
            serde_json::to_string(&results).context("failed to serialize results")?
        );

        if results.iter().all(|r| r.outcome.is_ok()) {
            Ok(EXIT_OK)
        } else {
            Ok(EXIT_SYNC_FAILED)
        }
    }
}
