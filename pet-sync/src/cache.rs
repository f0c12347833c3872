//! Shared on-disk object cache: one bare git mirror per repository URL.
//!
//! # Storage layout
//!
//! ```text
//! <cache_dir>/
//!   <sha256(repo_url) hex>/       (bare mirror of the repository)
//!   <sha256(repo_url) hex>.lock   (advisory lock file)
//!   librarian/                    (shared librarian-puppet scratch space)
//! ```
//!
//! # Locking
//!
//! At most one fetch/update may be in flight per cache entry: concurrent
//! fetches into the same mirror can corrupt its object store. The guard
//! combines an in-process wait set (threads of this process) with an `fs2`
//! exclusive file lock (other processes on the host). Both are released when
//! the guard drops.

use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, OnceLock};

use fs2::FileExt;
use sha2::{Digest, Sha256};

use pet_core::types::RefName;
use pet_transport::Transport;

use crate::error::{io_err, SyncError};

// ---------------------------------------------------------------------------
// In-process wait set
// ---------------------------------------------------------------------------

struct LockRegistry {
    held: Mutex<HashSet<PathBuf>>,
    released: Condvar,
}

fn registry() -> &'static LockRegistry {
    static REGISTRY: OnceLock<LockRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| LockRegistry {
        held: Mutex::new(HashSet::new()),
        released: Condvar::new(),
    })
}

/// Exclusive hold on one cache entry. Dropping releases both the in-process
/// slot and the on-disk file lock.
pub struct CacheLock {
    entry: PathBuf,
    file: File,
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        let reg = registry();
        let mut held = reg.held.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(&self.entry);
        reg.released.notify_all();
    }
}

// ---------------------------------------------------------------------------
// ObjectCache
// ---------------------------------------------------------------------------

/// Handle to the cache entry for one repository URL.
#[derive(Debug, Clone)]
pub struct ObjectCache {
    url: String,
    entry: PathBuf,
    lock_path: PathBuf,
    git_bin: String,
}

impl ObjectCache {
    pub fn new(cache_dir: &Path, url: &str, git_bin: &str) -> Self {
        let key = {
            let mut h = Sha256::new();
            h.update(url.as_bytes());
            hex::encode(h.finalize())
        };
        Self {
            url: url.to_owned(),
            entry: cache_dir.join(&key),
            lock_path: cache_dir.join(format!("{key}.lock")),
            git_bin: git_bin.to_owned(),
        }
    }

    /// The on-disk mirror directory for this entry.
    pub fn entry_path(&self) -> &Path {
        &self.entry
    }

    pub fn exists(&self) -> bool {
        self.entry.exists()
    }

    /// Acquire the per-entry update lock (blocking).
    pub fn lock(&self) -> Result<CacheLock, SyncError> {
        let reg = registry();
        {
            let mut held = reg.held.lock().unwrap_or_else(|e| e.into_inner());
            while held.contains(&self.entry) {
                held = reg
                    .released
                    .wait(held)
                    .unwrap_or_else(|e| e.into_inner());
            }
            held.insert(self.entry.clone());
        }

        let result = (|| {
            if let Some(parent) = self.lock_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
            }
            let file =
                File::create(&self.lock_path).map_err(|e| io_err(&self.lock_path, e))?;
            file.lock_exclusive()
                .map_err(|e| io_err(&self.lock_path, e))?;
            Ok(file)
        })();

        match result {
            Ok(file) => Ok(CacheLock {
                entry: self.entry.clone(),
                file,
            }),
            Err(e) => {
                // File lock failed after the in-process slot was taken.
                let mut held = reg.held.lock().unwrap_or_else(|p| p.into_inner());
                held.remove(&self.entry);
                reg.released.notify_all();
                Err(e)
            }
        }
    }

    /// Fetch the latest objects from upstream into the mirror, holding the
    /// entry lock for the duration. Clones on first use.
    pub fn update(&self, transport: &Transport) -> Result<(), SyncError> {
        let _lock = self.lock()?;
        let result = if self.exists() {
            tracing::info!(url = %self.url, "refreshing object cache");
            transport.execute_checked(
                &git_argv(
                    &self.git_bin,
                    &["fetch", "--quiet", "--prune", self.url.as_str()],
                ),
                Some(&self.entry),
            )
        } else {
            tracing::info!(url = %self.url, entry = %self.entry.display(), "cloning object cache");
            transport.execute_checked(
                &git_argv(
                    &self.git_bin,
                    &[
                        "clone",
                        "--quiet",
                        "--mirror",
                        self.url.as_str(),
                        &self.entry.display().to_string(),
                    ],
                ),
                None,
            )
        };
        result.map_err(|e| SyncError::FetchFailed {
            url: self.url.clone(),
            detail: e.to_string(),
        })?;
        Ok(())
    }

    /// Branch heads currently present in the mirror.
    pub fn refs(&self, transport: &Transport) -> Result<Vec<RefName>, SyncError> {
        let out = transport.execute_checked(
            &git_argv(
                &self.git_bin,
                &["for-each-ref", "--format=%(refname:short)", "refs/heads"],
            ),
            Some(&self.entry),
        )?;
        Ok(out
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(RefName::from)
            .collect())
    }

    /// The commit a ref points at, or `None` when the ref does not exist.
    pub fn rev_of(
        &self,
        transport: &Transport,
        r: &RefName,
    ) -> Result<Option<String>, SyncError> {
        let out = transport.execute(
            &git_argv(
                &self.git_bin,
                &["rev-parse", "--verify", "--quiet", &format!("refs/heads/{}", r.0)],
            ),
            Some(&self.entry),
        )?;
        if out.success() {
            Ok(Some(out.stdout.trim().to_owned()))
        } else {
            Ok(None)
        }
    }

    /// Shared librarian-puppet scratch directory beside the cache entries.
    pub fn librarian_scratch_dir(cache_dir: &Path) -> PathBuf {
        cache_dir.join("librarian")
    }
}

/// Build `[git_bin, args…]` as a structured argv list.
pub(crate) fn git_argv(git_bin: &str, args: &[&str]) -> Vec<String> {
    let mut argv = Vec::with_capacity(args.len() + 1);
    argv.push(git_bin.to_owned());
    argv.extend(args.iter().map(|s| s.to_string()));
    argv
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn entry_path_is_stable_per_url() {
        let dir = TempDir::new().unwrap();
        let a = ObjectCache::new(dir.path(), "git@example.com:x.git", "git");
        let b = ObjectCache::new(dir.path(), "git@example.com:x.git", "git");
        let c = ObjectCache::new(dir.path(), "git@example.com:y.git", "git");
        assert_eq!(a.entry_path(), b.entry_path());
        assert_ne!(a.entry_path(), c.entry_path());
    }

    #[test]
    fn lock_serializes_same_entry_across_threads() {
        let dir = TempDir::new().unwrap();
        let cache = ObjectCache::new(dir.path(), "git@example.com:lock.git", "git");

        let in_critical = Arc::new(AtomicBool::new(false));
        let overlap = Arc::new(AtomicBool::new(false));
        let entries = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let in_critical = in_critical.clone();
            let overlap = overlap.clone();
            let entries = entries.clone();
            handles.push(std::thread::spawn(move || {
                let _guard = cache.lock().expect("lock");
                if in_critical.swap(true, Ordering::SeqCst) {
                    overlap.store(true, Ordering::SeqCst);
                }
                // Hold the lock long enough for contention to show.
                std::thread::sleep(Duration::from_millis(30));
                in_critical.store(false, Ordering::SeqCst);
                entries.fetch_add(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.join().expect("thread");
        }

        assert!(!overlap.load(Ordering::SeqCst), "lock holders overlapped");
        assert_eq!(entries.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn distinct_entries_do_not_contend() {
        let dir = TempDir::new().unwrap();
        let a = ObjectCache::new(dir.path(), "git@example.com:a.git", "git");
        let b = ObjectCache::new(dir.path(), "git@example.com:b.git", "git");
        let _ga = a.lock().expect("lock a");
        // Must not block even while `a` is held.
        let _gb = b.lock().expect("lock b");
    }

    #[test]
    fn lock_is_reacquirable_after_release() {
        let dir = TempDir::new().unwrap();
        let cache = ObjectCache::new(dir.path(), "git@example.com:re.git", "git");
        drop(cache.lock().expect("first"));
        drop(cache.lock().expect("second"));
    }

    #[test]
    fn update_failure_is_fetch_failed() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("no-such-repo");
        let cache = ObjectCache::new(
            dir.path(),
            &missing.display().to_string(),
            "git",
        );
        let err = cache.update(&Transport::local()).expect_err("clone failure");
        assert!(matches!(err, SyncError::FetchFailed { .. }));
        assert!(!cache.exists(), "failed clone must not leave an entry");
    }
}
