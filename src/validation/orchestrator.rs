//! Validate stored artifacts and re-download the corrupt ones.
//!
//! One run goes through scan, validate, map and filter, retry,
//! re-validate and record, then report. Per-artifact problems become ledger
//! outcomes; only state persistence failures abort the run.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::ledger::{RetryLedger, RetryStatus};
use super::report;
use super::validator::{ArtifactValidator, ValidationVerdict};
use crate::config::AppConfig;
use crate::download::{
    BoundedDownloader, DedupIndex, DownloadTask, Fetcher, ManifestMapper, ARTIFACT_EXTENSION,
};
use crate::file_persistence::{ErrorLog, LockOutcome};

/// How a validation run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Completion {
    /// Every artifact is valid or was recovered.
    #[default]
    Clean,
    /// At least one artifact of this run reached the retry ceiling.
    PermanentFailures,
    /// A prerequisite (manifest, document service, mapping) was missing and
    /// retries were skipped for some artifacts.
    Degraded,
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Completion::Clean => "clean",
            Completion::PermanentFailures => "permanent failures",
            Completion::Degraded => "degraded",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationSummary {
    pub total: usize,
    pub valid: usize,
    pub corrupt: usize,
    pub retried: usize,
    pub recovered: usize,
    /// Failed again but still below the retry ceiling.
    pub still_failing: usize,
    pub permanent_failures: usize,
    /// Corrupt artifacts whose file name is not in the manifest.
    pub unresolved: usize,
    pub manifest_missing: bool,
    pub fetcher_missing: bool,
    pub completion: Completion,
}

impl ValidationSummary {
    pub fn exit_code(&self) -> u8 {
        match self.completion {
            Completion::Clean => 0,
            Completion::PermanentFailures | Completion::Degraded => 1,
        }
    }

    fn finalize(&mut self) {
        self.completion = if self.manifest_missing || self.fetcher_missing || self.unresolved > 0 {
            Completion::Degraded
        } else if self.permanent_failures > 0 {
            Completion::PermanentFailures
        } else {
            Completion::Clean
        };
    }
}

/// A corrupt artifact scheduled for re-download.
struct RetryCandidate {
    source_id: String,
    correlation_id: String,
    path: PathBuf,
}

pub struct ValidationRetryOrchestrator<'a> {
    config: &'a AppConfig,
    fetcher: Option<Arc<dyn Fetcher>>,
    validator: ArtifactValidator,
}

impl<'a> ValidationRetryOrchestrator<'a> {
    /// Without a fetcher corrupt artifacts are recorded but never re-fetched.
    pub fn new(config: &'a AppConfig, fetcher: Option<Arc<dyn Fetcher>>) -> Self {
        Self {
            config,
            fetcher,
            validator: ArtifactValidator::new(config.validation.structural_scan_max_bytes),
        }
    }

    /// Scan the output directory and validate every artifact.
    ///
    /// Returns `None` when the output directory does not exist. Read-only.
    pub fn scan_and_validate(&self) -> Result<Option<Vec<ValidationVerdict>>> {
        let output_dir = &self.config.output_dir;
        if !output_dir.exists() {
            return Ok(None);
        }

        let mut verdicts = Vec::new();
        for entry in WalkDir::new(output_dir).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to scan {:?}", output_dir))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let is_artifact = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(ARTIFACT_EXTENSION));
            if is_artifact {
                verdicts.push(self.validator.validate(entry.path()));
            }
        }
        Ok(Some(verdicts))
    }

    pub async fn run(&self) -> Result<ValidationSummary> {
        let config = self.config;
        let mut summary = ValidationSummary::default();

        // Scan + Validate
        let verdicts = match self.scan_and_validate()? {
            Some(verdicts) => verdicts,
            None => {
                info!(
                    "Output directory {:?} does not exist, nothing to validate",
                    config.output_dir
                );
                return Ok(summary);
            }
        };

        let (valid, corrupt): (Vec<_>, Vec<_>) = verdicts.into_iter().partition(|v| v.ok);
        summary.total = valid.len() + corrupt.len();
        summary.valid = valid.len();
        summary.corrupt = corrupt.len();
        info!(
            "Validated {} artifacts: {} valid, {} corrupt",
            summary.total, summary.valid, summary.corrupt
        );

        let mut ledger = RetryLedger::open(config.ledger_path(), config.retry.max_retries);
        let error_log = ErrorLog::new(config.error_log_path(), config.lock_policy());

        if corrupt.is_empty() {
            return self.finish(summary, &corrupt, &mut ledger);
        }

        // Map & Filter
        let fetcher = match &self.fetcher {
            Some(fetcher) => Arc::clone(fetcher),
            None => {
                warn!("No document service configured, corrupt artifacts will not be re-fetched");
                summary.fetcher_missing = true;
                return self.finish(summary, &corrupt, &mut ledger);
            }
        };
        let mapper = match ManifestMapper::load(&config.manifest_path()) {
            Some(mapper) => mapper,
            None => {
                warn!("Manifest unavailable, skipping retries for {} artifacts", corrupt.len());
                summary.manifest_missing = true;
                return self.finish(summary, &corrupt, &mut ledger);
            }
        };

        let ceiling = ledger.max_retries();
        let mut candidates = Vec::new();
        for verdict in &corrupt {
            let document = match mapper.resolve(&verdict.path) {
                Some(document) => document,
                None => {
                    warn!("{:?} is not in the manifest, cannot re-fetch", verdict.path);
                    error_log
                        .append(
                            "unresolved artifact",
                            &format!("{} ({})", verdict.path.display(), verdict.reason),
                        )
                        .await;
                    summary.unresolved += 1;
                    continue;
                }
            };

            // Detection charges this run's attempt; the re-download below
            // does not count again.
            let at_ceiling = ledger
                .entry(&document.source_id)
                .is_some_and(|entry| entry.retry_count >= ceiling);
            if at_ceiling {
                debug!("{} already exhausted its retries", document.source_id);
                ledger.mark_permanent(
                    &document.source_id,
                    &document.correlation_id,
                    &format!("retry ceiling reached: {}", verdict.reason),
                );
                summary.permanent_failures += 1;
                continue;
            }

            let status = ledger.record_outcome(
                &document.source_id,
                &document.correlation_id,
                false,
                &verdict.reason,
            );
            if status == RetryStatus::FailedPermanent {
                warn!(
                    "{} reached the retry ceiling of {}",
                    document.source_id, ceiling
                );
                summary.permanent_failures += 1;
                continue;
            }

            candidates.push(RetryCandidate {
                source_id: document.source_id.clone(),
                correlation_id: document.correlation_id.clone(),
                path: verdict.path.clone(),
            });
        }

        if !candidates.is_empty() {
            self.prepare_retry(&candidates).await?;
        }
        ledger
            .save()
            .context("Failed to checkpoint retry ledger")?;

        // Retry
        let tasks: Vec<DownloadTask> = candidates
            .into_iter()
            .map(|candidate| DownloadTask {
                source_id: candidate.source_id,
                correlation_id: candidate.correlation_id,
                destination_path: candidate.path,
            })
            .collect();
        summary.retried = tasks.len();
        if !tasks.is_empty() {
            info!("Re-downloading {} corrupt artifacts", tasks.len());
        }

        let results = BoundedDownloader::new(config.concurrency)
            .with_progress_bar(config.progress_bar)
            .run_batch(tasks, fetcher)
            .await;

        // Re-validate & Record
        let mut recovered_ids = Vec::new();
        for result in results {
            let task = &result.task;
            let status = if result.success {
                let verdict = self.validator.validate(&task.destination_path);
                if verdict.ok {
                    recovered_ids.push(task.correlation_id.clone());
                    ledger.record_outcome(&task.source_id, &task.correlation_id, true, "")
                } else {
                    warn!("{} is still corrupt after re-download: {}", task.source_id, verdict.reason);
                    ledger.record_retry_failure(&task.source_id, &task.correlation_id, &verdict.reason)
                }
            } else {
                let reason = format!("download failed: {}", result.error_message());
                error_log
                    .append(&format!("retry {}", task.source_id), result.error_message())
                    .await;
                ledger.record_retry_failure(&task.source_id, &task.correlation_id, &reason)
            };

            match status {
                RetryStatus::Recovered => summary.recovered += 1,
                RetryStatus::FailedPermanent => summary.permanent_failures += 1,
                RetryStatus::Pending | RetryStatus::Retrying => summary.still_failing += 1,
            }
        }

        if !recovered_ids.is_empty() {
            let mut dedup = self.dedup_index()?;
            if dedup.append_batch(&recovered_ids).await? == LockOutcome::Skipped {
                warn!(
                    "Processed list was locked, {} recovered ids were not recorded",
                    recovered_ids.len()
                );
            }
        }

        self.finish(summary, &corrupt, &mut ledger)
    }

    /// Forget the candidates in the dedup list and delete their corrupt files.
    async fn prepare_retry(&self, candidates: &[RetryCandidate]) -> Result<()> {
        let ids: Vec<String> = candidates
            .iter()
            .map(|candidate| candidate.correlation_id.clone())
            .collect();
        let mut dedup = self.dedup_index()?;
        if dedup.remove(&ids).await? == LockOutcome::Skipped {
            warn!("Processed list was locked, corrupt ids stay listed until the next run");
        }

        for candidate in candidates {
            if let Err(e) = fs::remove_file(&candidate.path) {
                warn!("Failed to delete corrupt artifact {:?}: {}", candidate.path, e);
            }
        }
        Ok(())
    }

    fn dedup_index(&self) -> Result<DedupIndex> {
        let config = self.config;
        Ok(DedupIndex::load(config.dedup_list_path(), config.lock_policy())?
            .with_error_log(ErrorLog::new(config.error_log_path(), config.lock_policy())))
    }

    /// Report phase: persist the ledger and write both reports.
    fn finish(
        &self,
        mut summary: ValidationSummary,
        corrupt: &[ValidationVerdict],
        ledger: &mut RetryLedger,
    ) -> Result<ValidationSummary> {
        let config = self.config;
        summary.finalize();

        ledger.save().context("Failed to save retry ledger")?;

        let section = report::render_validation_section(Utc::now(), &summary, corrupt);
        report::append_validation_report(&config.validation_report_path(), &section)?;

        let permanent = ledger.permanent_entries();
        if !permanent.is_empty() {
            report::write_permanent_failures(&config.permanent_failures_path(), &permanent)?;
            info!(
                "{} artifacts are permanently failing, see {:?}",
                permanent.len(),
                config.permanent_failures_path()
            );
        }

        info!(
            "Validation finished ({}): {} recovered, {} still failing, {} permanent",
            summary.completion, summary.recovered, summary.still_failing, summary.permanent_failures
        );
        Ok(summary)
    }
}
