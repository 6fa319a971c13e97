//! Download side of the pipeline.
//!
//! Listing dedup, the bounded batch downloader and the persisted manifest
//! used to map artifacts back to their source documents.

mod bounded;
mod dedup;
mod manifest;
mod models;
mod sync;

pub use bounded::{BatchHandle, BoundedDownloader, Fetcher};
pub use dedup::DedupIndex;
pub use manifest::{Manifest, ManifestMapper};
pub use models::{
    artifact_file_name, ArtifactRecord, DateRange, DownloadTask, TaskResult, ARTIFACT_EXTENSION,
};
pub use sync::{SyncRun, SyncSummary};
