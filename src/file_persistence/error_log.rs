//! Append-only error log shared between runs.
//!
//! Guarded by its own named lock so error appends never contend with
//! mutations of the dedup list.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use tracing::warn;

use super::lock::{LockOutcome, LockPolicy, NamedFileLock};

pub struct ErrorLog {
    path: PathBuf,
    lock_policy: LockPolicy,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>, lock_policy: LockPolicy) -> Self {
        Self {
            path: path.into(),
            lock_policy,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line `<timestamp> <context>: <message>`.
    ///
    /// Never fails: a busy lock or an IO error is logged and the line is
    /// dropped.
    pub async fn append(&self, context: &str, message: &str) -> LockOutcome {
        let _guard = match NamedFileLock::acquire(&self.path, &self.lock_policy).await {
            Ok(guard) => guard,
            Err(e) => {
                warn!("Skipping error log append: {}", e);
                return LockOutcome::Skipped;
            }
        };

        let line = format!(
            "{} {}: {}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            context,
            message.replace('\n', " ")
        );

        if let Err(e) = self.write_line(&line) {
            warn!("Failed to append to error log {:?}: {}", self.path, e);
            return LockOutcome::Skipped;
        }
        LockOutcome::Applied
    }

    fn write_line(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}
