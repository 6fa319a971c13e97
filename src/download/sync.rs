//! The normal download run: list, persist the manifest, dedup, download.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::bounded::BoundedDownloader;
use super::dedup::DedupIndex;
use super::manifest::Manifest;
use super::models::{ArtifactRecord, DateRange, DownloadTask};
use crate::config::AppConfig;
use crate::document_api::{ApiFetcher, DocumentApi};
use crate::file_persistence::{ErrorLog, LockOutcome};

/// Counts for one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub listed: usize,
    /// Already in the processed list.
    pub skipped_processed: usize,
    /// Not in the processed list but present on disk; added to the list.
    pub skipped_existing: usize,
    pub downloaded: usize,
    pub failed: usize,
}

impl SyncSummary {
    /// Failed downloads are transient: they are in the error log and the
    /// next run lists them again. Only a fatal error fails a sync.
    pub fn exit_code(&self) -> u8 {
        0
    }
}

pub struct SyncRun<'a> {
    config: &'a AppConfig,
    api: Arc<dyn DocumentApi>,
}

impl<'a> SyncRun<'a> {
    pub fn new(config: &'a AppConfig, api: Arc<dyn DocumentApi>) -> Self {
        Self { config, api }
    }

    pub async fn run(&self, range: DateRange) -> Result<SyncSummary> {
        let config = self.config;
        info!("Listing documents from {} to {}", range.start, range.end);

        let documents = self
            .api
            .list_documents(range.start, range.end)
            .await
            .context("Failed to list documents")?;

        Manifest::new(range.start, range.end, documents.clone())
            .save(&config.manifest_path())
            .context("Failed to persist manifest")?;

        let error_log = ErrorLog::new(config.error_log_path(), config.lock_policy());
        let mut dedup = DedupIndex::load(config.dedup_list_path(), config.lock_policy())?
            .with_error_log(ErrorLog::new(config.error_log_path(), config.lock_policy()));

        let mut summary = SyncSummary {
            listed: documents.len(),
            ..Default::default()
        };

        // Processed list first, then the local file.
        let mut reconciled = Vec::new();
        let mut tasks: Vec<DownloadTask> = Vec::new();
        for document in &documents {
            let record = ArtifactRecord::for_document(document, &config.output_dir);
            if dedup.contains(&record.correlation_id) {
                summary.skipped_processed += 1;
                if !record.local_path.exists() {
                    debug!(
                        "{} is marked processed but not on disk, not fetching",
                        record.source_id
                    );
                }
            } else if record.local_path.exists() {
                summary.skipped_existing += 1;
                reconciled.push(record.correlation_id);
            } else {
                tasks.push(record.task());
            }
        }

        if !reconciled.is_empty() {
            info!(
                "Adding {} existing files to the processed list",
                reconciled.len()
            );
            dedup.append_batch(&reconciled).await?;
        }

        info!(
            "{} listed, {} already processed, {} already on disk, {} to download",
            summary.listed,
            summary.skipped_processed,
            summary.skipped_existing,
            tasks.len()
        );

        let fetcher = Arc::new(ApiFetcher::new(self.api.clone(), config.fetch_options));
        let results = BoundedDownloader::new(config.concurrency)
            .with_progress_bar(config.progress_bar)
            .run_batch(tasks, fetcher)
            .await;

        let mut succeeded = Vec::new();
        for result in results {
            if result.success {
                summary.downloaded += 1;
                succeeded.push(result.task.correlation_id);
            } else {
                summary.failed += 1;
                error_log
                    .append(
                        &format!("download {}", result.task.source_id),
                        result.error_message(),
                    )
                    .await;
            }
        }

        if dedup.append_batch(&succeeded).await? == LockOutcome::Skipped {
            warn!(
                "Processed list was locked, {} ids were not recorded",
                succeeded.len()
            );
        }

        info!(
            "Sync finished: {} downloaded, {} failed, {} skipped",
            summary.downloaded,
            summary.failed,
            summary.skipped_processed + summary.skipped_existing
        );
        Ok(summary)
    }
}
