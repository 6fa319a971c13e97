use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub output_dir: Option<String>,
    pub state_dir: Option<String>,
    pub concurrency: Option<usize>,
    pub lookback_days: Option<u32>,
    pub api_base_url: Option<String>,
    pub api_timeout_sec: Option<u64>,
    pub progress_bar: Option<bool>,

    // Feature configs
    pub credentials: Option<CredentialsConfig>,
    pub retry: Option<RetryConfig>,
    pub validation: Option<ValidationConfig>,
    pub locks: Option<LocksConfig>,
    pub fetch: Option<FetchConfig>,
}

/// Credential bundle. Any field left out falls back to its environment
/// variable.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CredentialsConfig {
    pub api_key: Option<String>,
    pub chain_id: Option<String>,
    pub customer_code: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: Option<u32>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ValidationConfig {
    pub structural_scan_max_bytes: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct LocksConfig {
    pub attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

/// Flags forwarded on every document fetch.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct FetchConfig {
    pub include_mileage: Option<bool>,
    pub include_image: Option<bool>,
    pub include_report: Option<bool>,
    pub include_notes: Option<bool>,
    pub image_first: Option<bool>,
    pub fail_on_image_error: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
