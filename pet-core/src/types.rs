//! Domain types for the sync pipeline.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem
//! paths. Result/report types are serializable via serde + serde_json so a
//! remote `backend-run` can ship them back over its stdout.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for a configured backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackendName(pub String);

impl fmt::Display for BackendName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for BackendName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for BackendName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A strongly-typed branch/ref name in the source repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RefName(pub String);

impl fmt::Display for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RefName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RefName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// An environment directory name under the environment root.
///
/// Refs map to environment names by identity, but only names that pass
/// [`EnvName::is_valid`] are ever materialized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvName(pub String);

/// Names Puppet reserves for config sections; never valid environments.
const RESERVED_ENV_NAMES: [&str; 4] = ["main", "master", "agent", "user"];

impl EnvName {
    /// `^[a-z0-9_]+$` and not a Puppet-reserved section name.
    pub fn is_valid(name: &str) -> bool {
        !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            && !RESERVED_ENV_NAMES.contains(&name)
    }

    /// Map a ref to its environment name (identity mapping, validated).
    pub fn for_ref(r: &RefName) -> Option<EnvName> {
        if Self::is_valid(&r.0) {
            Some(EnvName(r.0.clone()))
        } else {
            None
        }
    }
}

impl fmt::Display for EnvName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

/// How commands reach a backend: in-process, or via a remote-shell prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSpec {
    /// Run commands directly on this host.
    Local,
    /// Prepend a remote-shell argv prefix, e.g. `["ssh", "puppet@web01"]`.
    Remote { shell: Vec<String> },
}

impl TransportSpec {
    pub fn is_local(&self) -> bool {
        matches!(self, TransportSpec::Local)
    }
}

/// Per-backend resolved settings. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSettings {
    /// Source repository URL; also the object-cache key.
    pub repo_url: String,
    /// Root of the shared object cache on the backend host.
    pub cache_dir: PathBuf,
    /// Root under which environment directories are materialized.
    pub environment_path: PathBuf,
    pub git_bin: String,
    pub librarian_bin: String,
    pub puppet_bin: String,
    /// Binary the dispatcher invokes on a remote backend (`pet backend-run`).
    pub pet_bin: String,
    /// Transport-call timeout; exceeded calls count as backend-unreachable.
    pub timeout: Option<Duration>,
}

/// One configured sync target, resolved from configuration at dispatch time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    pub name: BackendName,
    pub transport: TransportSpec,
    pub settings: BackendSettings,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Restriction on which refs a request covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefFilter {
    /// Every branch currently present in the repository.
    All,
    Only(Vec<RefName>),
}

/// Restriction on which backends a request covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendFilter {
    All,
    Only(Vec<BackendName>),
}

/// A single sync trigger: which refs, on which backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub refs: RefFilter,
    pub backends: BackendFilter,
    /// When false, trust the current cache contents and skip the fetch.
    pub refresh_cache: bool,
}

impl SyncRequest {
    /// Sync everything, everywhere.
    pub fn all() -> Self {
        Self {
            refs: RefFilter::All,
            backends: BackendFilter::All,
            refresh_cache: true,
        }
    }

    /// Sync the named refs on all backends.
    pub fn for_refs(refs: Vec<RefName>) -> Self {
        Self {
            refs: RefFilter::Only(refs),
            backends: BackendFilter::All,
            refresh_cache: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Terminal state of one (backend, ref) attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Environment directory did not exist and was materialized.
    Created,
    /// Environment directory was swapped to a newer revision.
    Updated { from: String, to: String },
    /// Upstream unchanged; directory left untouched.
    UpToDate,
    /// Ref absent or not a valid environment name; siblings unaffected.
    Skipped { reason: String },
    /// Cache fetch or materialization failed; old directory stays live.
    SyncFailed { detail: String },
    /// Environment swapped in but the dependency install failed.
    DependencyFailed { detail: String },
}

impl SyncOutcome {
    /// Success and skipped both count as OK for the aggregate verdict.
    pub fn is_ok(&self) -> bool {
        !matches!(
            self,
            SyncOutcome::SyncFailed { .. } | SyncOutcome::DependencyFailed { .. }
        )
    }

    /// Short status label for human reports.
    pub fn label(&self) -> &'static str {
        match self {
            SyncOutcome::Created => "created",
            SyncOutcome::Updated { .. } => "updated",
            SyncOutcome::UpToDate => "up-to-date",
            SyncOutcome::Skipped { .. } => "skipped",
            SyncOutcome::SyncFailed { .. } => "sync-failed",
            SyncOutcome::DependencyFailed { .. } => "dependency-failed",
        }
    }
}

/// Result of one ref on one backend. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub ref_name: RefName,
    pub outcome: SyncOutcome,
    /// Captured tool output (fetch/clone/install stdout+stderr), never
    /// discarded on failure.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub diagnostics: String,
    pub finished_at: DateTime<Utc>,
}

impl SyncResult {
    pub fn new(ref_name: RefName, outcome: SyncOutcome, diagnostics: String) -> Self {
        Self {
            ref_name,
            outcome,
            diagnostics,
            finished_at: Utc::now(),
        }
    }
}

/// What one backend reported back to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendReport {
    /// The backend ran its pipeline; per-ref results follow.
    Completed {
        backend: BackendName,
        results: Vec<SyncResult>,
    },
    /// The backend could not be executed at all (spawn/auth/timeout).
    Unreachable { backend: BackendName, error: String },
}

impl BackendReport {
    pub fn backend(&self) -> &BackendName {
        match self {
            BackendReport::Completed { backend, .. } => backend,
            BackendReport::Unreachable { backend, .. } => backend,
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregate report + exit codes
// ---------------------------------------------------------------------------

/// Exit status when every (backend, ref) result is success or skipped.
pub const EXIT_OK: i32 = 0;
/// Exit status when at least one sync or dependency install failed.
pub const EXIT_SYNC_FAILED: i32 = 1;
/// Exit status when at least one backend was unreachable (dominates).
pub const EXIT_UNREACHABLE: i32 = 2;

/// Fan-in of every backend's report for one dispatch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub backends: Vec<BackendReport>,
}

impl AggregateReport {
    pub fn new(backends: Vec<BackendReport>) -> Self {
        Self { backends }
    }

    pub fn any_unreachable(&self) -> bool {
        self.backends
            .iter()
            .any(|b| matches!(b, BackendReport::Unreachable { .. }))
    }

    pub fn any_sync_failure(&self) -> bool {
        self.backends.iter().any(|b| match b {
            BackendReport::Completed { results, .. } => {
                results.iter().any(|r| !r.outcome.is_ok())
            }
            BackendReport::Unreachable { .. } => false,
        })
    }

    /// True iff every (backend, ref) result is success or skipped.
    pub fn overall_ok(&self) -> bool {
        !self.any_unreachable() && !self.any_sync_failure()
    }

    /// Map the aggregate verdict onto the process exit-code contract.
    pub fn exit_code(&self) -> i32 {
        if self.any_unreachable() {
            EXIT_UNREACHABLE
        } else if self.any_sync_failure() {
            EXIT_SYNC_FAILED
        } else {
            EXIT_OK
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
