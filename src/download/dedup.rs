//! Set of correlation ids that were already downloaded.
//!
//! Backed by a newline-delimited file that grows by appends. Ids are only
//! ever removed when an artifact is found corrupt and must be fetched again.
//! Every mutation of the file happens under the list's named lock.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::file_persistence::{atomic_write, ErrorLog, LockOutcome, LockPolicy, NamedFileLock};

pub struct DedupIndex {
    path: PathBuf,
    ids: HashSet<String>,
    lock_policy: LockPolicy,
    error_log: Option<ErrorLog>,
}

impl DedupIndex {
    /// Load the list at `path`. A missing file is an empty list.
    pub fn load(path: impl Into<PathBuf>, lock_policy: LockPolicy) -> Result<Self> {
        let path = path.into();
        let ids = read_ids(&path)?;
        debug!("Loaded {} processed ids from {:?}", ids.len(), path);
        Ok(Self {
            path,
            ids,
            lock_policy,
            error_log: None,
        })
    }

    /// Record skipped mutations in `error_log` in addition to the log output.
    pub fn with_error_log(mut self, error_log: ErrorLog) -> Self {
        self.error_log = Some(error_log);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, correlation_id: &str) -> bool {
        self.ids.contains(correlation_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Append every id not already present, in one write.
    pub async fn append_batch(&mut self, correlation_ids: &[String]) -> Result<LockOutcome> {
        let mut seen = HashSet::new();
        let new_ids: Vec<&String> = correlation_ids
            .iter()
            .filter(|id| !id.trim().is_empty())
            .filter(|id| !self.ids.contains(id.as_str()) && seen.insert(id.as_str()))
            .collect();
        if new_ids.is_empty() {
            return Ok(LockOutcome::Applied);
        }

        let _guard = match self.lock("append").await {
            Some(guard) => guard,
            None => return Ok(LockOutcome::Skipped),
        };

        let mut buffer = String::new();
        if needs_leading_newline(&self.path)? {
            buffer.push('\n');
        }
        for id in &new_ids {
            buffer.push_str(id.trim());
            buffer.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {:?} for append", self.path))?;
        file.write_all(buffer.as_bytes())
            .with_context(|| format!("Failed to append to {:?}", self.path))?;

        for id in new_ids {
            self.ids.insert(id.trim().to_string());
        }
        Ok(LockOutcome::Applied)
    }

    /// Rewrite the list without the given ids.
    ///
    /// The file is re-read under the lock so entries appended by another
    /// process since [`DedupIndex::load`] are preserved.
    pub async fn remove(&mut self, correlation_ids: &[String]) -> Result<LockOutcome> {
        let to_remove: HashSet<&str> = correlation_ids.iter().map(|id| id.trim()).collect();
        if to_remove.is_empty() {
            return Ok(LockOutcome::Applied);
        }

        let _guard = match self.lock("remove").await {
            Some(guard) => guard,
            None => return Ok(LockOutcome::Skipped),
        };

        let current = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {:?}", self.path));
            }
        };

        let mut kept = String::with_capacity(current.len());
        let mut removed = 0;
        for line in current.lines() {
            let id = line.trim();
            if id.is_empty() {
                continue;
            }
            if to_remove.contains(id) {
                removed += 1;
                continue;
            }
            kept.push_str(id);
            kept.push('\n');
        }

        atomic_write(&self.path, kept.as_bytes())
            .with_context(|| format!("Failed to rewrite {:?}", self.path))?;

        for id in to_remove {
            self.ids.remove(id);
        }
        info!("Removed {} ids from {:?}", removed, self.path);
        Ok(LockOutcome::Applied)
    }

    async fn lock(&self, operation: &str) -> Option<NamedFileLock> {
        match NamedFileLock::acquire(&self.path, &self.lock_policy).await {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!("Skipping dedup {}: {}", operation, e);
                if let Some(error_log) = &self.error_log {
                    error_log
                        .append(&format!("dedup {}", operation), &e.to_string())
                        .await;
                }
                None
            }
        }
    }
}

fn read_ids(path: &Path) -> Result<HashSet<String>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
    };
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn needs_leading_newline(path: &Path) -> Result<bool> {
    match fs::read(path) {
        Ok(bytes) => Ok(bytes.last().is_some_and(|b| *b != b'\n')),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to read {:?}", path)),
    }
}
