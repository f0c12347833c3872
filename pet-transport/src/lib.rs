//! # pet-transport
//!
//! Command execution adapter for backends: run an argv either in the local
//! process environment or behind a remote-shell prefix, capturing exit
//! status, stdout, and stderr. Pure adapter, no state beyond its spec.
//!
//! Commands are always structured argv lists; nothing here ever builds a
//! shell string from ref names or paths.

pub mod error;
pub mod exec;

pub use error::TransportError;
pub use exec::{ExecOutput, Transport};
