//! Local / remote-shell command execution with output capture and timeout.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use pet_core::types::TransportSpec;

use crate::error::TransportError;

/// How often the timeout loop polls the child for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Captured result of one command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// Process exit code; `-1` when the process died to a signal.
    pub status_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.status_code == 0
    }

    /// stdout and stderr concatenated for diagnostics capture.
    pub fn combined(&self) -> String {
        let mut out = String::new();
        if !self.stdout.trim().is_empty() {
            out.push_str(self.stdout.trim_end());
        }
        if !self.stderr.trim().is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(self.stderr.trim_end());
        }
        out
    }
}

/// Execution adapter for one backend.
#[derive(Debug, Clone)]
pub struct Transport {
    spec: TransportSpec,
    timeout: Option<Duration>,
}

impl Transport {
    pub fn new(spec: TransportSpec, timeout: Option<Duration>) -> Self {
        Self { spec, timeout }
    }

    /// A local transport with no timeout.
    pub fn local() -> Self {
        Self::new(TransportSpec::Local, None)
    }

    pub fn is_local(&self) -> bool {
        self.spec.is_local()
    }

    /// The argv actually executed: the remote-shell prefix (if any) followed
    /// by the requested command.
    fn full_argv(&self, argv: &[String]) -> Vec<String> {
        match &self.spec {
            TransportSpec::Local => argv.to_vec(),
            TransportSpec::Remote { shell } => {
                let mut full = shell.clone();
                full.extend(argv.iter().cloned());
                full
            }
        }
    }

    /// Run a command, capturing exit status and output.
    ///
    /// `cwd` applies only to local execution; remote commands run in
    /// whatever directory the remote shell lands in.
    pub fn execute(
        &self,
        argv: &[String],
        cwd: Option<&Path>,
    ) -> Result<ExecOutput, TransportError> {
        self.execute_with_env(argv, cwd, &[])
    }

    /// [`Transport::execute`] with extra environment variables for the child.
    pub fn execute_with_env(
        &self,
        argv: &[String],
        cwd: Option<&Path>,
        env: &[(String, String)],
    ) -> Result<ExecOutput, TransportError> {
        let full = self.full_argv(argv);
        let Some((program, args)) = full.split_first() else {
            return Err(TransportError::Spawn {
                program: String::new(),
                source: std::io::Error::other("empty argv"),
            });
        };

        match cwd {
            Some(dir) => tracing::debug!(command = %full.join(" "), cwd = %dir.display(), "exec"),
            None => tracing::debug!(command = %full.join(" "), "exec"),
        }

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let (Some(dir), TransportSpec::Local) = (cwd, &self.spec) {
            command.current_dir(dir);
        }
        for (key, value) in env {
            command.env(key, value);
        }

        let child = command.spawn().map_err(|e| TransportError::Spawn {
            program: program.clone(),
            source: e,
        })?;

        match self.timeout {
            None => wait_collect(child, program),
            Some(timeout) => wait_with_timeout(child, program, timeout),
        }
    }

    /// Like [`Transport::execute`], but a nonzero exit becomes
    /// [`TransportError::CommandFailed`] carrying the captured stderr.
    pub fn execute_checked(
        &self,
        argv: &[String],
        cwd: Option<&Path>,
    ) -> Result<ExecOutput, TransportError> {
        let output = self.execute(argv, cwd)?;
        if output.success() {
            Ok(output)
        } else {
            Err(TransportError::CommandFailed {
                program: argv.first().cloned().unwrap_or_default(),
                status_code: output.status_code,
                stderr: output.combined(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Child waiting
// ---------------------------------------------------------------------------

fn wait_collect(
    child: std::process::Child,
    program: &str,
) -> Result<ExecOutput, TransportError> {
    let output = child.wait_with_output().map_err(|e| TransportError::Wait {
        program: program.to_owned(),
        source: e,
    })?;
    Ok(ExecOutput {
        status_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Poll-based wait: reader threads drain the pipes (so a chatty child never
/// blocks on a full pipe buffer) while the main thread polls `try_wait`
/// against the deadline, killing the child when it expires.
fn wait_with_timeout(
    mut child: std::process::Child,
    program: &str,
    timeout: Duration,
) -> Result<ExecOutput, TransportError> {
    let stdout_handle = spawn_reader(child.stdout.take());
    let stderr_handle = spawn_reader(child.stderr.take());
    let deadline = Instant::now() + timeout;

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if Instant::now() >= deadline {
                    tracing::warn!(program, ?timeout, "command timed out, killing");
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(TransportError::TimedOut {
                        program: program.to_owned(),
                        timeout,
                    });
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                return Err(TransportError::Wait {
                    program: program.to_owned(),
                    source: e,
                })
            }
        }
    };

    Ok(ExecOutput {
        status_code: status.code().unwrap_or(-1),
        stdout: join_reader(stdout_handle),
        stderr: join_reader(stderr_handle),
    })
}

fn spawn_reader<R: Read + Send + 'static>(
    source: Option<R>,
) -> Option<std::thread::JoinHandle<String>> {
    source.map(|mut reader| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = reader.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join_reader(handle: Option<std::thread::JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
