//! Data models for the download side of the pipeline.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use chrono::{Duration, NaiveDate};

use crate::document_api::DocumentRef;

/// File extension of every stored artifact.
pub const ARTIFACT_EXTENSION: &str = "pdf";

/// File name an artifact for `source_id` is stored under.
///
/// Characters outside `[A-Za-z0-9._-]` are replaced with `_` so upstream
/// identifiers can never escape the output directory.
pub fn artifact_file_name(source_id: &str) -> String {
    let sanitized: String = source_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}.{}", sanitized, ARTIFACT_EXTENSION)
}

/// One downloadable document and where it lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRecord {
    pub source_id: String,
    pub correlation_id: String,
    pub local_path: PathBuf,
}

impl ArtifactRecord {
    /// Record for a listed document stored under `output_dir`.
    pub fn for_document(document: &DocumentRef, output_dir: &Path) -> Self {
        Self {
            source_id: document.source_id.clone(),
            correlation_id: document.correlation_id.clone(),
            local_path: output_dir.join(artifact_file_name(&document.source_id)),
        }
    }

    /// Download task that (re-)creates this artifact.
    pub fn task(&self) -> DownloadTask {
        DownloadTask {
            source_id: self.source_id.clone(),
            correlation_id: self.correlation_id.clone(),
            destination_path: self.local_path.clone(),
        }
    }
}

/// A single fetch to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub source_id: String,
    pub correlation_id: String,
    pub destination_path: PathBuf,
}

/// Outcome of one [`DownloadTask`].
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task: DownloadTask,
    pub success: bool,
    /// Bytes written to the destination (0 on failure).
    pub bytes_written: u64,
    /// Error message when the fetch or the write failed.
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl TaskResult {
    pub fn succeeded(task: DownloadTask, bytes_written: u64, duration_ms: u64) -> Self {
        Self {
            task,
            success: true,
            bytes_written,
            error: None,
            duration_ms,
        }
    }

    pub fn failed(task: DownloadTask, error: String, duration_ms: u64) -> Self {
        Self {
            task,
            success: false,
            bytes_written: 0,
            error: Some(error),
            duration_ms,
        }
    }

    /// Error message, or an empty string for successful results.
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or_default()
    }
}

/// Inclusive listing date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Resolve the range from optional explicit bounds.
    ///
    /// A missing end defaults to `today`; a missing start defaults to
    /// `lookback_days` before the end.
    pub fn resolve(
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        lookback_days: u32,
        today: NaiveDate,
    ) -> Result<Self> {
        let end = to.unwrap_or(today);
        let start = from.unwrap_or(end - Duration::days(i64::from(lookback_days)));
        if start > end {
            bail!("Invalid date range: {} is after {}", start, end);
        }
        Ok(Self { start, end })
    }
}
