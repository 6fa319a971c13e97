//! Upstream document API.
//!
//! The pipeline only needs two calls from the service: list reports in a
//! date range and fetch one report as PDF bytes.

mod client;
mod models;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::download::{DownloadTask, Fetcher};

pub use client::HttpDocumentApi;
pub use models::{ApiCredentials, DocumentRef, FetchOptions};

/// Operations the pipeline needs from the document service.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    /// List the reports in the inclusive date range, in upstream order.
    async fn list_documents(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DocumentRef>>;

    /// Fetch one report as raw PDF bytes.
    async fn fetch_document(
        &self,
        source_id: &str,
        correlation_id: &str,
        options: &FetchOptions,
    ) -> Result<Vec<u8>>;
}

/// Adapts a [`DocumentApi`] to the downloader's [`Fetcher`] capability,
/// passing the same fetch options on every call.
pub struct ApiFetcher {
    api: Arc<dyn DocumentApi>,
    options: FetchOptions,
}

impl ApiFetcher {
    pub fn new(api: Arc<dyn DocumentApi>, options: FetchOptions) -> Self {
        Self { api, options }
    }
}

#[async_trait]
impl Fetcher for ApiFetcher {
    async fn fetch(&self, task: &DownloadTask) -> Result<Vec<u8>> {
        self.api
            .fetch_document(&task.source_id, &task.correlation_id, &self.options)
            .await
    }
}
