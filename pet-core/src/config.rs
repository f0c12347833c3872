//! YAML configuration loading and resolution.
//!
//! # File shape
//!
//! ```yaml
//! repo: git@git.example.com:ops/puppet.git
//! cachedir: /var/cache/pet
//! environmentpath: /etc/puppet/environments
//! backends:
//!   default: {}
//!   web01:
//!     remote_shell: ssh puppet@web01
//!     environmentpath: /srv/puppet/environments
//! ```
//!
//! Top-level keys are defaults; each backend entry may override any of them.
//! An absent `backends` map means one implicit local backend named `default`.
//!
//! # API pattern
//!
//! `load_at(path)` takes an explicit file; `load(override)` walks the search
//! path (`/etc/pet.yaml`, then `~/.pet.yaml`). Tests always use `load_at`.
//! The result of resolution is an immutable [`Settings`] value handed to the
//! dispatcher; nothing downstream ever re-reads a file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{io_err, ConfigError};
use crate::types::{Backend, BackendFilter, BackendName, BackendSettings, TransportSpec};

pub const SYSTEM_CONFIG_PATH: &str = "/etc/pet.yaml";
pub const USER_CONFIG_FILE: &str = ".pet.yaml";

const DEFAULT_CACHE_DIR: &str = "/var/cache/pet";
const DEFAULT_ENVIRONMENT_PATH: &str = "/etc/puppet/environments";

// ---------------------------------------------------------------------------
// Raw file shape
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
struct RawDefaults {
    repo: Option<String>,
    cachedir: Option<PathBuf>,
    environmentpath: Option<PathBuf>,
    git: Option<String>,
    librarian_puppet: Option<String>,
    puppet: Option<String>,
    pet: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawBackend {
    /// Remote-shell prefix, split on whitespace into argv. Absent or empty
    /// means the backend is local.
    remote_shell: Option<String>,
    #[serde(flatten)]
    overrides: RawDefaults,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    repo: String,
    cachedir: Option<PathBuf>,
    environmentpath: Option<PathBuf>,
    git: Option<String>,
    librarian_puppet: Option<String>,
    puppet: Option<String>,
    pet: Option<String>,
    timeout_secs: Option<u64>,
    #[serde(default)]
    backends: BTreeMap<String, RawBackend>,
}

// ---------------------------------------------------------------------------
// Resolved settings
// ---------------------------------------------------------------------------

/// Fully resolved configuration: the complete backend set for one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub backends: Vec<Backend>,
}

impl Settings {
    /// Look up one backend by name.
    pub fn backend(&self, name: &BackendName) -> Option<&Backend> {
        self.backends.iter().find(|b| &b.name == name)
    }

    /// Apply a request's backend filter, erroring on unknown names.
    pub fn select(&self, filter: &BackendFilter) -> Result<Vec<Backend>, ConfigError> {
        match filter {
            BackendFilter::All => Ok(self.backends.clone()),
            BackendFilter::Only(names) => names
                .iter()
                .map(|name| {
                    self.backend(name)
                        .cloned()
                        .ok_or_else(|| ConfigError::UnknownBackend {
                            name: name.0.clone(),
                        })
                })
                .collect(),
        }
    }

    /// The backend used for purely local operations (`prune`, `puppet`).
    /// First local backend in config order; named `default` when implicit.
    pub fn local_backend(&self) -> Option<&Backend> {
        self.backends.iter().find(|b| b.transport.is_local())
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Load and resolve the config at an explicit path.
pub fn load_at(path: &Path) -> Result<Settings, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let raw: RawConfig = serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(resolve(raw))
}

/// Load the first config found on the search path, or the override if given.
pub fn load(override_path: Option<&Path>) -> Result<Settings, ConfigError> {
    if let Some(path) = override_path {
        return load_at(path);
    }
    let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
    let searched = vec![
        PathBuf::from(SYSTEM_CONFIG_PATH),
        home.join(USER_CONFIG_FILE),
    ];
    for candidate in &searched {
        if candidate.exists() {
            return load_at(candidate);
        }
    }
    Err(ConfigError::NotFound { searched })
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

fn resolve(raw: RawConfig) -> Settings {
    let mut backends = Vec::new();
    if raw.backends.is_empty() {
        backends.push(Backend {
            name: BackendName::from("default"),
            transport: TransportSpec::Local,
            settings: settings_for(&raw, &RawDefaults::default()),
        });
    } else {
        // BTreeMap gives deterministic config order.
        for (name, entry) in &raw.backends {
            backends.push(Backend {
                name: BackendName::from(name.as_str()),
                transport: transport_for(entry),
                settings: settings_for(&raw, &entry.overrides),
            });
        }
    }
    Settings { backends }
}

fn transport_for(entry: &RawBackend) -> TransportSpec {
    match entry.remote_shell.as_deref() {
        None | Some("") => TransportSpec::Local,
        Some(shell) => TransportSpec::Remote {
            shell: shell.split_whitespace().map(str::to_owned).collect(),
        },
    }
}

fn settings_for(raw: &RawConfig, overrides: &RawDefaults) -> BackendSettings {
    BackendSettings {
        repo_url: overrides.repo.clone().unwrap_or_else(|| raw.repo.clone()),
        cache_dir: overrides
            .cachedir
            .clone()
            .or_else(|| raw.cachedir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR)),
        environment_path: overrides
            .environmentpath
            .clone()
            .or_else(|| raw.environmentpath.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ENVIRONMENT_PATH)),
        git_bin: overrides
            .git
            .clone()
            .or_else(|| raw.git.clone())
            .unwrap_or_else(|| "git".to_owned()),
        librarian_bin: overrides
            .librarian_puppet
            .clone()
            .or_else(|| raw.librarian_puppet.clone())
            .unwrap_or_else(|| "librarian-puppet".to_owned()),
        puppet_bin: overrides
            .puppet
            .clone()
            .or_else(|| raw.puppet.clone())
            .unwrap_or_else(|| "puppet".to_owned()),
        pet_bin: overrides
            .pet
            .clone()
            .or_else(|| raw.pet.clone())
            .unwrap_or_else(|| "pet".to_owned()),
        timeout: overrides
            .timeout_secs
            .or(raw.timeout_secs)
            .map(Duration::from_secs),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("pet.yaml");
        fs::write(&path, contents).expect("write config");
        path
    }

    #[test]
    fn minimal_config_yields_implicit_local_default_backend() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "repo: git@example.com:ops/puppet.git\n");
        let settings = load_at(&path).expect("load");

        assert_eq!(settings.backends.len(), 1);
        let backend = &settings.backends[0];
        assert_eq!(backend.name, BackendName::from("default"));
        assert_eq!(backend.transport, TransportSpec::Local);
        assert_eq!(backend.settings.repo_url, "git@example.com:ops/puppet.git");
        assert_eq!(backend.settings.cache_dir, PathBuf::from(DEFAULT_CACHE_DIR));
        assert_eq!(backend.settings.git_bin, "git");
        assert!(backend.settings.timeout.is_none());
    }

    #[test]
    fn backend_overrides_apply_over_top_level_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            concat!(
                "repo: git@example.com:ops/puppet.git\n",
                "environmentpath: /etc/puppet/environments\n",
                "timeout_secs: 120\n",
                "backends:\n",
                "  default: {}\n",
                "  web01:\n",
                "    remote_shell: ssh -o BatchMode=yes puppet@web01\n",
                "    environmentpath: /srv/puppet/environments\n",
            ),
        );
        let settings = load_at(&path).expect("load");
        assert_eq!(settings.backends.len(), 2);

        let local = settings.backend(&BackendName::from("default")).unwrap();
        assert!(local.transport.is_local());
        assert_eq!(
            local.settings.environment_path,
            PathBuf::from("/etc/puppet/environments")
        );

        let remote = settings.backend(&BackendName::from("web01")).unwrap();
        assert_eq!(
            remote.transport,
            TransportSpec::Remote {
                shell: vec![
                    "ssh".into(),
                    "-o".into(),
                    "BatchMode=yes".into(),
                    "puppet@web01".into()
                ]
            }
        );
        assert_eq!(
            remote.settings.environment_path,
            PathBuf::from("/srv/puppet/environments")
        );
        assert_eq!(remote.settings.timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn empty_remote_shell_means_local() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            concat!(
                "repo: url\n",
                "backends:\n",
                "  here:\n",
                "    remote_shell: \"\"\n",
            ),
        );
        let settings = load_at(&path).expect("load");
        assert!(settings.backends[0].transport.is_local());
    }

    #[test]
    fn select_unknown_backend_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "repo: url\n");
        let settings = load_at(&path).expect("load");

        let err = settings
            .select(&BackendFilter::Only(vec![BackendName::from("nope")]))
            .expect_err("unknown backend");
        assert!(matches!(err, ConfigError::UnknownBackend { name } if name == "nope"));
    }

    #[test]
    fn select_all_returns_every_backend_once() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            concat!(
                "repo: url\n",
                "backends:\n",
                "  a: {}\n",
                "  b:\n",
                "    remote_shell: ssh b\n",
            ),
        );
        let settings = load_at(&path).expect("load");
        let selected = settings.select(&BackendFilter::All).expect("select");
        let names: Vec<_> = selected.iter().map(|b| b.name.0.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn parse_error_carries_path() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "repo: [unclosed\n");
        let err = load_at(&path).expect_err("parse error");
        assert!(matches!(err, ConfigError::Parse { path: p, .. } if p == path));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = load_at(&dir.path().join("absent.yaml")).expect_err("io error");
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
