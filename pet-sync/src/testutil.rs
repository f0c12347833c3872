//! Git repository fixtures shared by the crate's tests.
//!
//! Every test that shells out to a real `git` binary probes for it first and
//! returns early when absent, so the suite stays runnable on minimal hosts.

use std::path::{Path, PathBuf};
use std::process::Command;

use pet_core::types::BackendSettings;

pub(crate) fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub(crate) fn run_git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "pet-test")
        .env("GIT_AUTHOR_EMAIL", "pet-test@example.com")
        .env("GIT_COMMITTER_NAME", "pet-test")
        .env("GIT_COMMITTER_EMAIL", "pet-test@example.com")
        .output()
        .expect("run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Create a source repository under `root` with one commit on each branch.
/// The first branch name is the initial branch.
pub(crate) fn init_remote(root: &Path, branches: &[&str]) -> PathBuf {
    let remote = root.join("upstream");
    std::fs::create_dir_all(&remote).expect("mkdir upstream");
    run_git(&remote, &["init", "--quiet"]);
    run_git(
        &remote,
        &["symbolic-ref", "HEAD", &format!("refs/heads/{}", branches[0])],
    );
    std::fs::write(remote.join("site.pp"), "node default {}").expect("write site.pp");
    std::fs::write(remote.join("Puppetfile"), "forge 'https://forge.puppet.com'\n")
        .expect("write Puppetfile");
    run_git(&remote, &["add", "-A"]);
    run_git(&remote, &["commit", "--quiet", "-m", "initial"]);
    for branch in &branches[1..] {
        run_git(&remote, &["branch", branch]);
    }
    remote
}

/// Add a commit changing `file` on `branch`.
pub(crate) fn commit_to(remote: &Path, branch: &str, file: &str, content: &str) {
    run_git(remote, &["checkout", "--quiet", branch]);
    std::fs::write(remote.join(file), content).expect("write file");
    run_git(remote, &["add", "-A"]);
    run_git(remote, &["commit", "--quiet", "-m", "update"]);
}

/// Delete a branch upstream (for prune tests).
pub(crate) fn delete_branch(remote: &Path, branch: &str, fallback: &str) {
    run_git(remote, &["checkout", "--quiet", fallback]);
    run_git(remote, &["branch", "-D", branch]);
}

/// Backend settings rooted in a test directory, with a dependency installer
/// that always succeeds.
pub(crate) fn settings_for(root: &Path, remote: &Path) -> BackendSettings {
    BackendSettings {
        repo_url: remote.display().to_string(),
        cache_dir: root.join("cache"),
        environment_path: root.join("environments"),
        git_bin: "git".to_owned(),
        librarian_bin: "true".to_owned(),
        puppet_bin: "puppet".to_owned(),
        pet_bin: "pet".to_owned(),
        timeout: None,
    }
}
