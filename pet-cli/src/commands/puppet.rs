//! `pet puppet` — passthrough to the configured puppet binary.

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use clap::Args;

use crate::commands::load_settings;

/// Arguments for `pet puppet`.
#[derive(Args, Debug)]
pub struct PuppetArgs {
    /// Arguments handed to the puppet binary unchanged.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl PuppetArgs {
    pub fn run(self, config: Option<&Path>) -> Result<i32> {
        let settings = load_settings(config)?;
        let backend = settings
            .local_backend()
            .context("no local backend configured on this host")?;

        // Inherits stdio so interactive puppet runs behave normally.
        let status = Command::new(&backend.settings.puppet_bin)
            .args(&self.args)
            .status()
            .with_context(|| format!("failed to run '{}'", backend.settings.puppet_bin))?;
        Ok(status.code().unwrap_or(-1))
    }
}
