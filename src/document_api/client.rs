//! HTTP client for the upstream document API.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder};

use super::models::{ApiCredentials, DocumentRef, FetchOptions};
use super::DocumentApi;

/// Client for the expense document service.
///
/// Handles HTTP requests for:
/// - Listing reports in a date range
/// - Downloading a single report as PDF
#[derive(Clone)]
pub struct HttpDocumentApi {
    client: Client,
    base_url: String,
    credentials: ApiCredentials,
}

impl HttpDocumentApi {
    /// Create a new HttpDocumentApi.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the document service (e.g., "https://api.example.com/v1")
    /// * `timeout_secs` - Request timeout in seconds
    /// * `credentials` - Credential bundle sent with every request
    pub fn new(base_url: String, timeout_secs: u64, credentials: ApiCredentials) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        // Ensure base_url doesn't have trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    /// Get the base URL of the document service.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn with_credentials(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("X-Api-Key", &self.credentials.api_key)
            .header("X-Chain-Id", &self.credentials.chain_id)
            .header("X-Customer-Code", &self.credentials.customer_code)
    }
}

#[async_trait]
impl DocumentApi for HttpDocumentApi {
    async fn list_documents(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DocumentRef>> {
        let url = format!("{}/documents", self.base_url);
        let start = start.format("%Y-%m-%d").to_string();
        let end = end.format("%Y-%m-%d").to_string();

        let response = self
            .with_credentials(self.client.get(&url))
            .query(&[("startDate", start.as_str()), ("endDate", end.as_str())])
            .send()
            .await
            .context("Failed to connect to document service")?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Listing documents {}..{} failed with status: {}",
                start,
                end,
                response.status()
            );
        }

        response
            .json()
            .await
            .context("Failed to parse document listing")
    }

    async fn fetch_document(
        &self,
        source_id: &str,
        correlation_id: &str,
        options: &FetchOptions,
    ) -> Result<Vec<u8>> {
        let url = format!("{}/documents/{}/pdf", self.base_url, source_id);

        let response = self
            .with_credentials(self.client.get(&url))
            .query(&[("correlationId", correlation_id)])
            .query(&options.as_query())
            .send()
            .await
            .with_context(|| format!("Failed to request document {}", source_id))?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Document {} download failed with status: {}",
                source_id,
                response.status()
            );
        }

        let mut body = Vec::with_capacity(response.content_length().unwrap_or(0) as usize);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.with_context(|| format!("Failed to read body of document {}", source_id))?;
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}
