//! Durable retry history per artifact.
//!
//! The ledger is a single JSON document keyed by source id. It is loaded once
//! per run, mutated in memory by the orchestrator and saved with the atomic
//! write protocol. Loading never fails: a corrupt or missing file falls back
//! to the backup and then to an empty ledger.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::file_persistence::{atomic_write, backup_path, AtomicWriteError};

pub const LEDGER_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Failed to serialize retry ledger: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write retry ledger: {0}")]
    Write(#[from] AtomicWriteError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStatus {
    #[default]
    Pending,
    Retrying,
    Recovered,
    FailedPermanent,
}

impl RetryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryStatus::Pending => "pending",
            RetryStatus::Retrying => "retrying",
            RetryStatus::Recovered => "recovered",
            RetryStatus::FailedPermanent => "failed_permanent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryEntry {
    pub correlation_id: String,
    /// Failed attempts so far.
    pub retry_count: u32,
    pub first_failure_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub status: RetryStatus,
    pub failure_history: Vec<FailureRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LedgerStatistics {
    pub total_tracked: usize,
    /// Entries still pending or retrying.
    pub active_retries: usize,
    pub permanent_failures: usize,
    pub recovered: usize,
}

impl LedgerStatistics {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a RetryEntry>) -> Self {
        let mut stats = Self::default();
        for entry in entries {
            stats.total_tracked += 1;
            match entry.status {
                RetryStatus::Pending | RetryStatus::Retrying => stats.active_retries += 1,
                RetryStatus::Recovered => stats.recovered += 1,
                RetryStatus::FailedPermanent => stats.permanent_failures += 1,
            }
        }
        stats
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LedgerSnapshot {
    pub version: u32,
    pub last_run: Option<DateTime<Utc>>,
    pub statistics: LedgerStatistics,
    pub retries: BTreeMap<String, RetryEntry>,
}

impl Default for LedgerSnapshot {
    fn default() -> Self {
        Self {
            version: LEDGER_VERSION,
            last_run: None,
            statistics: LedgerStatistics::default(),
            retries: BTreeMap::new(),
        }
    }
}

impl LedgerSnapshot {
    /// Recompute `statistics` from the entries.
    pub fn refresh_statistics(&mut self) {
        self.statistics = LedgerStatistics::from_entries(self.retries.values());
    }
}

pub struct RetryLedger {
    path: PathBuf,
    max_retries: u32,
    snapshot: LedgerSnapshot,
}

impl RetryLedger {
    /// Open the ledger at `path`, falling back as described in
    /// [`RetryLedger::load_snapshot`].
    pub fn open(path: impl Into<PathBuf>, max_retries: u32) -> Self {
        let path = path.into();
        let snapshot = Self::load_snapshot(&path);
        debug!(
            "Retry ledger {:?} tracks {} artifacts",
            path,
            snapshot.retries.len()
        );
        Self {
            path,
            max_retries,
            snapshot,
        }
    }

    /// Load the primary file, then the `.bak` sibling, then an empty ledger.
    pub fn load_snapshot(path: &Path) -> LedgerSnapshot {
        match read_snapshot(path) {
            Ok(Some(snapshot)) => return snapshot,
            Ok(None) => debug!("No retry ledger at {:?}", path),
            Err(e) => warn!("Retry ledger unreadable, trying backup: {:#}", e),
        }

        let backup = backup_path(path);
        match read_snapshot(&backup) {
            Ok(Some(snapshot)) => {
                warn!("Loaded retry ledger from backup {:?}", backup);
                snapshot
            }
            Ok(None) => {
                info!("Starting with an empty retry ledger");
                LedgerSnapshot::default()
            }
            Err(e) => {
                warn!("Retry ledger backup unreadable, starting empty: {:#}", e);
                LedgerSnapshot::default()
            }
        }
    }

    /// Write `snapshot` to `path` with the atomic write protocol.
    pub fn save_snapshot(path: &Path, snapshot: &LedgerSnapshot) -> Result<(), LedgerError> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        atomic_write(path, &json)?;
        Ok(())
    }

    /// Stamp the run time, refresh statistics and persist.
    pub fn save(&mut self) -> Result<(), LedgerError> {
        self.snapshot.version = LEDGER_VERSION;
        self.snapshot.last_run = Some(Utc::now());
        self.snapshot.refresh_statistics();
        Self::save_snapshot(&self.path, &self.snapshot)
    }

    /// Record the outcome of one attempt for `source_id`.
    ///
    /// A failure appends to the history and increments the retry count; the
    /// entry becomes `FailedPermanent` once the count reaches the ceiling. A
    /// success marks the entry `Recovered` and leaves the count untouched.
    pub fn record_outcome(
        &mut self,
        source_id: &str,
        correlation_id: &str,
        success: bool,
        reason: &str,
    ) -> RetryStatus {
        let now = Utc::now();
        let max_retries = self.max_retries;
        let entry = self.entry_mut(source_id, correlation_id);
        entry.last_attempt_at = Some(now);

        if success {
            entry.status = RetryStatus::Recovered;
        } else {
            entry.first_failure_at.get_or_insert(now);
            entry.failure_history.push(FailureRecord {
                timestamp: now,
                reason: reason.to_string(),
            });
            entry.retry_count += 1;
            entry.status = if entry.retry_count >= max_retries {
                RetryStatus::FailedPermanent
            } else {
                RetryStatus::Retrying
            };
        }
        entry.status
    }

    /// Add `reason` to the history of the attempt already counted for
    /// `source_id`, without incrementing the retry count.
    ///
    /// A re-download belongs to the attempt charged when its corrupt file was
    /// detected, so its failure is history, not a new attempt.
    pub fn record_retry_failure(
        &mut self,
        source_id: &str,
        correlation_id: &str,
        reason: &str,
    ) -> RetryStatus {
        let now = Utc::now();
        let entry = self.entry_mut(source_id, correlation_id);
        entry.first_failure_at.get_or_insert(now);
        entry.last_attempt_at = Some(now);
        entry.failure_history.push(FailureRecord {
            timestamp: now,
            reason: reason.to_string(),
        });
        if entry.status != RetryStatus::FailedPermanent {
            entry.status = RetryStatus::Retrying;
        }
        entry.status
    }

    /// Mark an entry as permanently failed without counting a new attempt.
    ///
    /// No-op for an entry that is already `FailedPermanent`.
    pub fn mark_permanent(&mut self, source_id: &str, correlation_id: &str, reason: &str) {
        if self
            .entry(source_id)
            .is_some_and(|entry| entry.status == RetryStatus::FailedPermanent)
        {
            return;
        }
        let now = Utc::now();
        let entry = self.entry_mut(source_id, correlation_id);
        entry.first_failure_at.get_or_insert(now);
        entry.last_attempt_at = Some(now);
        entry.failure_history.push(FailureRecord {
            timestamp: now,
            reason: reason.to_string(),
        });
        entry.status = RetryStatus::FailedPermanent;
    }

    pub fn entry(&self, source_id: &str) -> Option<&RetryEntry> {
        self.snapshot.retries.get(source_id)
    }

    /// All entries ordered by source id.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &RetryEntry)> {
        self.snapshot
            .retries
            .iter()
            .map(|(id, entry)| (id.as_str(), entry))
    }

    pub fn permanent_entries(&self) -> Vec<(&str, &RetryEntry)> {
        self.entries()
            .filter(|(_, entry)| entry.status == RetryStatus::FailedPermanent)
            .collect()
    }

    pub fn snapshot(&self) -> &LedgerSnapshot {
        &self.snapshot
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn entry_mut(&mut self, source_id: &str, correlation_id: &str) -> &mut RetryEntry {
        let entry = self
            .snapshot
            .retries
            .entry(source_id.to_string())
            .or_default();
        entry.correlation_id = correlation_id.to_string();
        entry
    }
}

fn read_snapshot(path: &Path) -> Result<Option<LedgerSnapshot>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
    };
    let snapshot =
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))?;
    Ok(Some(snapshot))
}
