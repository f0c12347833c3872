pub mod backend_run;
pub mod hook;
pub mod prune;
pub mod puppet;
pub mod update;

use std::path::Path;

use anyhow::{Context, Result};
use pet_core::{config, Settings};

/// Load and resolve settings once per invocation.
pub fn load_settings(config_path: Option<&Path>) -> Result<Settings> {
    config::load(config_path).context("failed to load configuration")
}

/// Dispatch runs on a multi-thread runtime; one blocking task per backend.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")
}
