//! `pet update` — one-shot sync across backends.

use std::path::Path;

use anyhow::Result;
use clap::Args;

use pet_core::types::{BackendFilter, BackendName, RefFilter, RefName, SyncRequest};
use pet_dispatch::dispatch;

use crate::commands::{load_settings, runtime};
use crate::report;

/// Arguments for `pet update`.
#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Branches to sync (default: every branch in the repository).
    #[arg(value_name = "REF")]
    pub refs: Vec<String>,

    /// Restrict the run to the named backend (repeatable).
    #[arg(long, value_name = "NAME")]
    pub backend: Vec<String>,

    /// Trust the current object cache instead of fetching upstream.
    #[arg(long, short = 'n')]
    pub no_refresh: bool,

    /// Print the aggregate report as JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

impl UpdateArgs {
    pub fn run(self, config: Option<&Path>) -> Result<i32> {
        let settings = load_settings(config)?;
        let request = SyncRequest {
            refs: if self.refs.is_empty() {
                RefFilter::All
            } else {
                RefFilter::Only(self.refs.iter().map(|r| RefName::from(r.as_str())).collect())
            },
            backends: if self.backend.is_empty() {
                BackendFilter::All
            } else {
                BackendFilter::Only(
                    self.backend
                        .iter()
                        .map(|b| BackendName::from(b.as_str()))
                        .collect(),
                )
            },
            refresh_cache: !self.no_refresh,
        };

        let aggregate = runtime()?.block_on(dispatch(&settings, &request))?;
        report::print(&aggregate, self.json)?;
        Ok(aggregate.exit_code())
    }
}
