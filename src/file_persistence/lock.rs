//! Named cross-process locks.
//!
//! A lock for `some/file.txt` is an advisory exclusive lock on
//! `some/file.txt.lock`. Acquisition is attempted a bounded number of times,
//! waiting on the tokio timer between attempts, and the lock is released when
//! the guard is dropped.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;
use thiserror::Error;
use tracing::debug;

/// How hard to try before giving up on a busy lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    /// Number of acquisition attempts (at least one is always made).
    pub attempts: u32,
    /// Delay between attempts.
    pub retry_delay: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            retry_delay: Duration::from_millis(200),
        }
    }
}

/// Result of a write that needs a shared-file lock.
///
/// `Skipped` means the lock stayed busy and nothing was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    Applied,
    Skipped,
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Lock {path:?} is still busy after {attempts} attempts")]
    Busy { path: PathBuf, attempts: u32 },

    #[error("IO error on lock {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

impl LockError {
    pub fn is_busy(&self) -> bool {
        matches!(self, LockError::Busy { .. })
    }
}

/// Guard for an exclusive named lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct NamedFileLock {
    file: File,
    path: PathBuf,
}

impl NamedFileLock {
    /// Lock file path guarding `target`.
    pub fn lock_path_for(target: &Path) -> PathBuf {
        let mut name = target
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        target.with_file_name(name)
    }

    /// Acquire the lock guarding `target`, retrying per `policy`.
    pub async fn acquire(target: &Path, policy: &LockPolicy) -> Result<Self, LockError> {
        let path = Self::lock_path_for(target);
        let io_err = |source| LockError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(io_err)?;

        let attempts = policy.attempts.max(1);
        for attempt in 1..=attempts {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(Self { file, path }),
                Err(e) if is_contended(&e) => {
                    debug!(
                        "Lock {:?} busy (attempt {}/{})",
                        path, attempt, attempts
                    );
                    if attempt < attempts {
                        tokio::time::sleep(policy.retry_delay).await;
                    }
                }
                Err(e) => return Err(io_err(e)),
            }
        }

        Err(LockError::Busy { path, attempts })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for NamedFileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!("Failed to release lock {:?}: {}", self.path, e);
        }
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
