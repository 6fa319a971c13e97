//! PDF fixtures and workspace/config builders

use super::constants::*;
use expense_pdf_sync::config::{AppConfig, CliConfig, FileConfig, LocksConfig};
use expense_pdf_sync::document_api::{ApiCredentials, ApiFetcher, FetchOptions, HttpDocumentApi};
use expense_pdf_sync::download::{artifact_file_name, Fetcher};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Smallest document that passes every structural check
pub fn valid_pdf(source_id: &str) -> Vec<u8> {
    format!(
        "%PDF-1.4\n% {}\n1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n\
         2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n\
         trailer\n<< /Root 1 0 R >>\n%%EOF\n",
        source_id
    )
    .into_bytes()
}

/// Valid header, cut off before the trailer
pub fn truncated_pdf(source_id: &str) -> Vec<u8> {
    let full = valid_pdf(source_id);
    full[..full.len() / 2].to_vec()
}

/// What a proxy returns instead of the document
pub fn html_error_page() -> Vec<u8> {
    b"<html><body><h1>502 Bad Gateway</h1></body></html>".to_vec()
}

pub fn test_credentials() -> ApiCredentials {
    ApiCredentials {
        api_key: TEST_API_KEY.to_string(),
        chain_id: TEST_CHAIN_ID.to_string(),
        customer_code: TEST_CUSTOMER_CODE.to_string(),
    }
}

/// Temporary output and state directories for one test
pub struct TestWorkspace {
    pub output_dir: PathBuf,
    pub state_dir: PathBuf,
    _temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let output_dir = temp_dir.path().join("pdf");
        let state_dir = temp_dir.path().join("state");
        fs::create_dir_all(&output_dir).expect("Failed to create output dir");
        fs::create_dir_all(&state_dir).expect("Failed to create state dir");
        Self {
            output_dir,
            state_dir,
            _temp_dir: temp_dir,
        }
    }

    /// Config for this workspace. Credentials are only set when a base URL
    /// is given; the environment is never consulted.
    pub fn config(&self, base_url: Option<&str>, max_retries: u32) -> AppConfig {
        let cli = CliConfig {
            output_dir: Some(self.output_dir.clone()),
            state_dir: Some(self.state_dir.clone()),
            concurrency: 3,
            max_retries,
            lookback_days: 7,
            api_base_url: base_url.map(str::to_string),
            api_timeout_sec: CLIENT_TIMEOUT_SECS,
            progress_bar: false,
        };
        let file_config = FileConfig {
            locks: Some(LocksConfig {
                attempts: Some(2),
                retry_delay_ms: Some(10),
            }),
            ..Default::default()
        };
        let env = move |key: &str| -> Option<String> {
            base_url?;
            match key {
                expense_pdf_sync::config::API_KEY_ENV => Some(TEST_API_KEY.to_string()),
                expense_pdf_sync::config::CHAIN_ID_ENV => Some(TEST_CHAIN_ID.to_string()),
                expense_pdf_sync::config::CUSTOMER_CODE_ENV => Some(TEST_CUSTOMER_CODE.to_string()),
                _ => None,
            }
        };
        AppConfig::resolve_with_env(&cli, Some(file_config), env).expect("Invalid test config")
    }

    pub fn artifact_path(&self, source_id: &str) -> PathBuf {
        self.output_dir.join(artifact_file_name(source_id))
    }

    pub fn write_artifact(&self, source_id: &str, content: &[u8]) -> PathBuf {
        let path = self.artifact_path(source_id);
        fs::write(&path, content).expect("Failed to write artifact");
        path
    }

    pub fn write_dedup_list(&self, config: &AppConfig, ids: &[&str]) {
        let mut content = ids.join("\n");
        content.push('\n');
        fs::write(config.dedup_list_path(), content).expect("Failed to write dedup list");
    }

    pub fn read_dedup_list(&self, config: &AppConfig) -> Vec<String> {
        fs::read_to_string(config.dedup_list_path())
            .unwrap_or_default()
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect()
    }
}

/// Fetcher backed by the HTTP client pointed at `base_url`
pub fn http_fetcher(base_url: &str) -> Arc<dyn Fetcher> {
    let api = HttpDocumentApi::new(base_url.to_string(), CLIENT_TIMEOUT_SECS, test_credentials())
        .expect("Failed to build client");
    Arc::new(ApiFetcher::new(Arc::new(api), FetchOptions::default()))
}
