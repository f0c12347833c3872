//! Backend fan-out: one task per backend, joined into an aggregate report.
//!
//! Backends are independent deployment targets: a failure on one never
//! aborts the others, and no cross-backend ordering is promised. Each
//! backend appears at most once per dispatch even when the request names it
//! repeatedly.

use pet_core::types::{
    Backend, BackendReport, SyncRequest, SyncResult, TransportSpec,
};
use pet_core::{AggregateReport, Settings};
use pet_sync::Synchronizer;
use pet_transport::{ExecOutput, Transport};

use crate::error::DispatchError;

/// Fan a sync request out to every selected backend and collect the
/// per-backend reports. Distinct backends run concurrently on blocking
/// tasks; report order follows configuration order.
pub async fn dispatch(
    settings: &Settings,
    request: &SyncRequest,
) -> Result<AggregateReport, DispatchError> {
    let mut backends = settings.select(&request.backends)?;
    dedup_backends(&mut backends);

    let mut handles = Vec::with_capacity(backends.len());
    for backend in backends {
        let name = backend.name.clone();
        let request = request.clone();
        tracing::info!(backend = %name, "dispatching");
        handles.push((
            name,
            tokio::task::spawn_blocking(move || run_backend(&backend, &request)),
        ));
    }

    let mut reports = Vec::with_capacity(handles.len());
    for (name, handle) in handles {
        match handle.await {
            Ok(report) => reports.push(report),
            Err(e) => {
                tracing::error!(backend = %name, error = %e, "backend task failed");
                reports.push(BackendReport::Unreachable {
                    backend: name,
                    error: format!("backend task failed: {e}"),
                });
            }
        }
    }
    Ok(AggregateReport::new(reports))
}

/// One dispatch per backend per request, even if the filter repeats a name.
fn dedup_backends(backends: &mut Vec<Backend>) {
    let mut seen = std::collections::HashSet::new();
    backends.retain(|b| seen.insert(b.name.clone()));
}

/// Execute the sync pipeline for one backend: in-process for a local
/// transport, via the remote `backend-run` entry point otherwise.
fn run_backend(backend: &Backend, request: &SyncRequest) -> BackendReport {
    match &backend.transport {
        TransportSpec::Local => BackendReport::Completed {
            backend: backend.name.clone(),
            results: run_local(backend, request),
        },
        TransportSpec::Remote { .. } => run_remote(backend, request),
    }
}

/// The local pipeline; also the code path behind `pet backend-run`.
pub fn run_local(backend: &Backend, request: &SyncRequest) -> Vec<SyncResult> {
    let sync = Synchronizer::new(backend.settings.clone());
    sync.sync(&request.refs, request.refresh_cache)
}

fn run_remote(backend: &Backend, request: &SyncRequest) -> BackendReport {
    let transport = Transport::new(backend.transport.clone(), backend.settings.timeout);

    let mut argv = vec![
        backend.settings.pet_bin.clone(),
        "backend-run".to_owned(),
    ];
    if !request.refresh_cache {
        argv.push("--no-refresh".to_owned());
    }
    if let pet_core::types::RefFilter::Only(refs) = &request.refs {
        argv.extend(refs.iter().map(|r| r.0.clone()));
    }

    match transport.execute(&argv, None) {
        Ok(output) => parse_remote_report(&backend.name, &output),
        Err(e) => {
            tracing::error!(backend = %backend.name, error = %e, "backend unreachable");
            BackendReport::Unreachable {
                backend: backend.name.clone(),
                error: e.to_string(),
            }
        }
    }
}

/// A remote `backend-run` prints its result vector as JSON on stdout and
/// exits nonzero when any ref failed. Parseable output means the backend
/// ran; anything else counts as unreachable (auth prompt, garbled shell,
/// missing binary wrapped by the remote shell).
fn parse_remote_report(
    name: &pet_core::BackendName,
    output: &ExecOutput,
) -> BackendReport {
    match serde_json::from_str::<Vec<SyncResult>>(&output.stdout) {
        Ok(results) => BackendReport::Completed {
            backend: name.clone(),
            results,
        },
        Err(_) => BackendReport::Unreachable {
            backend: name.clone(),
            error: format!(
                "backend-run produced no report (status {}): {}",
                output.status_code,
                output.combined()
            ),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pet_core::types::{
        BackendFilter, BackendName, BackendSettings, RefFilter, RefName, SyncOutcome,
    };
    use pet_core::EXIT_UNREACHABLE;
    use std::path::Path;
    use tempfile::TempDir;

    fn test_settings(root: &Path, repo: &str) -> BackendSettings {
        BackendSettings {
            repo_url: repo.to_owned(),
            cache_dir: root.join("cache"),
            environment_path: root.join("environments"),
            git_bin: "git".to_owned(),
            librarian_bin: "true".to_owned(),
            puppet_bin: "puppet".to_owned(),
            pet_bin: "pet".to_owned(),
            timeout: None,
        }
    }

    fn local_backend(name: &str, root: &Path) -> Backend {
        Backend {
            name: BackendName::from(name),
            transport: TransportSpec::Local,
            settings: test_settings(root, "/nonexistent/repo.git"),
        }
    }

    #[tokio::test]
    async fn every_backend_is_attempted_exactly_once() {
        let root_a = TempDir::new().unwrap();
        let root_b = TempDir::new().unwrap();
        let settings = Settings {
            backends: vec![
                local_backend("a", root_a.path()),
                local_backend("b", root_b.path()),
            ],
        };

        let report = dispatch(&settings, &SyncRequest::all()).await.expect("dispatch");
        let mut names: Vec<_> = report
            .backends
            .iter()
            .map(|b| b.backend().0.clone())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn repeated_backend_name_dispatches_once() {
        let root = TempDir::new().unwrap();
        let settings = Settings {
            backends: vec![local_backend("a", root.path())],
        };
        let mut request = SyncRequest::all();
        request.backends = BackendFilter::Only(vec![
            BackendName::from("a"),
            BackendName::from("a"),
        ]);

        let report = dispatch(&settings, &request).await.expect("dispatch");
        assert_eq!(report.backends.len(), 1);
    }

    #[tokio::test]
    async fn unknown_backend_in_filter_is_config_error() {
        let root = TempDir::new().unwrap();
        let settings = Settings {
            backends: vec![local_backend("a", root.path())],
        };
        let mut request = SyncRequest::all();
        request.backends = BackendFilter::Only(vec![BackendName::from("ghost")]);

        let err = dispatch(&settings, &request).await.expect_err("unknown backend");
        assert!(matches!(err, DispatchError::Config(_)));
    }

    #[tokio::test]
    async fn unreachable_backend_does_not_abort_siblings() {
        let root_a = TempDir::new().unwrap();
        let root_b = TempDir::new().unwrap();
        let reachable = local_backend("a", root_a.path());
        let unreachable = Backend {
            name: BackendName::from("b"),
            transport: TransportSpec::Remote {
                shell: vec!["pet-test-no-such-ssh".to_owned()],
            },
            settings: test_settings(root_b.path(), "/nonexistent/repo.git"),
        };
        let settings = Settings {
            backends: vec![reachable, unreachable],
        };

        let request = SyncRequest::for_refs(vec![RefName::from("production")]);
        let report = dispatch(&settings, &request).await.expect("dispatch");

        assert_eq!(report.backends.len(), 2);
        assert!(matches!(
            report.backends[0],
            BackendReport::Completed { .. }
        ));
        assert!(matches!(
            report.backends[1],
            BackendReport::Unreachable { .. }
        ));
        assert_eq!(report.exit_code(), EXIT_UNREACHABLE);
    }

    #[test]
    fn remote_report_parses_result_json() {
        let results = vec![SyncResult::new(
            RefName::from("production"),
            SyncOutcome::Created,
            String::new(),
        )];
        let output = ExecOutput {
            status_code: 0,
            stdout: serde_json::to_string(&results).unwrap(),
            stderr: String::new(),
        };
        let report = parse_remote_report(&BackendName::from("web01"), &output);
        match report {
            BackendReport::Completed { results: parsed, .. } => assert_eq!(parsed, results),
            other => panic!("unexpected report: {other:?}"),
        }
    }

    #[test]
    fn garbled_remote_output_is_unreachable() {
        let output = ExecOutput {
            status_code: 127,
            stdout: String::new(),
            stderr: "bash: pet: command not found".to_owned(),
        };
        let report = parse_remote_report(&BackendName::from("web01"), &output);
        match report {
            BackendReport::Unreachable { error, .. } => {
                assert!(error.contains("command not found"));
            }
            other => panic!("unexpected report: {other:?}"),
        }
    }
}
