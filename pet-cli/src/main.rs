//! Pet — Puppet environment synchronization CLI.
//!
//! # Usage
//!
//! ```text
//! pet update [REF…] [--backend NAME]… [--no-refresh] [--json]
//! pet prune [--dry-run]
//! pet hook [--format github|bitbucket] [--user-agent-env VARIABLE]
//! pet backend-run [REF…] [--no-refresh]
//! pet puppet -- ARGS…
//! ```
//!
//! Exit status: 0 when every backend/ref succeeded or was skipped, 1 when at
//! least one sync or dependency install failed, 2 when at least one backend
//! was unreachable.

mod commands;
mod report;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    backend_run::BackendRunArgs, hook::HookArgs, prune::PruneArgs, puppet::PuppetArgs,
    update::UpdateArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "pet",
    version,
    about = "Synchronize Puppet environment directories with repository branches",
    long_about = None,
)]
struct Cli {
    /// Config file (default: /etc/pet.yaml, then ~/.pet.yaml).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sync environment directories on every configured backend.
    Update(UpdateArgs),

    /// Delete environment directories whose branch no longer exists upstream.
    Prune(PruneArgs),

    /// Read a repository push notification from stdin and sync its branches.
    Hook(HookArgs),

    /// Internal: run the local sync pipeline and print a JSON report
    /// (what the dispatcher invokes over the remote shell).
    #[command(name = "backend-run", hide = true)]
    BackendRun(BackendRunArgs),

    /// Run the configured puppet binary with the given arguments.
    Puppet(PuppetArgs),
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_env("PET_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = cli.config.as_deref();
    let code = match cli.command {
        Commands::Update(args) => args.run(config)?,
        Commands::Prune(args) => args.run(config)?,
        Commands::Hook(args) => args.run(config)?,
        Commands::BackendRun(args) => args.run(config)?,
        Commands::Puppet(args) => args.run(config)?,
    };
    std::process::exit(code);
}
