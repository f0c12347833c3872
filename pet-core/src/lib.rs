//! Pet core library — domain types, resolved settings, errors.
//!
//! Public API surface:
//! - [`types`] — newtypes, backends, requests, results, exit codes
//! - [`config`] — YAML load / resolve into immutable [`config::Settings`]
//! - [`error`] — [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::Settings;
pub use error::ConfigError;
pub use types::{
    AggregateReport, Backend, BackendFilter, BackendName, BackendReport, BackendSettings,
    EnvName, RefFilter, RefName, SyncOutcome, SyncRequest, SyncResult, TransportSpec,
    EXIT_OK, EXIT_SYNC_FAILED, EXIT_UNREACHABLE,
};
