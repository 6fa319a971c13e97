mod file_config;

pub use file_config::{
    CredentialsConfig, FetchConfig, FileConfig, LocksConfig, RetryConfig, ValidationConfig,
};

use crate::document_api::{ApiCredentials, FetchOptions};
use crate::file_persistence::LockPolicy;
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const API_KEY_ENV: &str = "EXPENSE_API_KEY";
pub const CHAIN_ID_ENV: &str = "EXPENSE_CHAIN_ID";
pub const CUSTOMER_CODE_ENV: &str = "EXPENSE_CUSTOMER_CODE";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub output_dir: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
    pub concurrency: usize,
    pub max_retries: u32,
    pub lookback_days: u32,
    pub api_base_url: Option<String>,
    pub api_timeout_sec: u64,
    pub progress_bar: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub output_dir: PathBuf,
    pub state_dir: PathBuf,
    pub concurrency: usize,
    pub lookback_days: u32,
    pub progress_bar: bool,

    // Upstream service, absent when no base URL is configured
    pub api: Option<ApiSettings>,
    pub fetch_options: FetchOptions,

    // Feature configs (with defaults)
    pub retry: RetrySettings,
    pub validation: ValidationSettings,
    pub locks: LockSettings,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub timeout_sec: u64,
    pub credentials: ApiCredentials,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        Self::resolve_with_env(cli, file_config, |key| std::env::var(key).ok())
    }

    /// Same as [`AppConfig::resolve`] with an explicit environment lookup.
    pub fn resolve_with_env<F>(cli: &CliConfig, file_config: Option<FileConfig>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let output_dir = file
            .output_dir
            .map(PathBuf::from)
            .or_else(|| cli.output_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("output_dir must be specified via --output-dir or in config file")
            })?;

        if output_dir.exists() && !output_dir.is_dir() {
            bail!("output_dir is not a directory: {:?}", output_dir);
        }

        let state_dir = file
            .state_dir
            .map(PathBuf::from)
            .or_else(|| cli.state_dir.clone())
            .unwrap_or_else(|| output_dir.clone());

        if state_dir.exists() && !state_dir.is_dir() {
            bail!("state_dir is not a directory: {:?}", state_dir);
        }

        let concurrency = file.concurrency.unwrap_or(cli.concurrency);
        if concurrency == 0 {
            bail!("concurrency must be at least 1");
        }

        let lookback_days = file.lookback_days.unwrap_or(cli.lookback_days);
        let progress_bar = file.progress_bar.unwrap_or(cli.progress_bar);

        let retry_file = file.retry.unwrap_or_default();
        let retry = RetrySettings {
            max_retries: retry_file.max_retries.unwrap_or(cli.max_retries),
        };
        if retry.max_retries == 0 {
            bail!("max_retries must be at least 1");
        }

        let validation_file = file.validation.unwrap_or_default();
        let validation = ValidationSettings {
            structural_scan_max_bytes: validation_file
                .structural_scan_max_bytes
                .unwrap_or(DEFAULT_STRUCTURAL_SCAN_MAX_BYTES),
        };

        let locks_file = file.locks.unwrap_or_default();
        let locks = LockSettings {
            attempts: locks_file.attempts.unwrap_or(5),
            retry_delay_ms: locks_file.retry_delay_ms.unwrap_or(200),
        };

        let fetch_file = file.fetch.unwrap_or_default();
        let defaults = FetchOptions::default();
        let fetch_options = FetchOptions {
            include_mileage: fetch_file.include_mileage.unwrap_or(defaults.include_mileage),
            include_image: fetch_file.include_image.unwrap_or(defaults.include_image),
            include_report: fetch_file.include_report.unwrap_or(defaults.include_report),
            include_notes: fetch_file.include_notes.unwrap_or(defaults.include_notes),
            image_first: fetch_file.image_first.unwrap_or(defaults.image_first),
            fail_on_image_error: fetch_file
                .fail_on_image_error
                .unwrap_or(defaults.fail_on_image_error),
        };

        let credentials = resolve_credentials(file.credentials.unwrap_or_default(), &env)?;

        let api_base_url = file.api_base_url.or_else(|| cli.api_base_url.clone());
        let api_timeout_sec = file.api_timeout_sec.unwrap_or(cli.api_timeout_sec);
        let api = match (api_base_url, credentials) {
            (Some(base_url), Some(credentials)) => Some(ApiSettings {
                base_url,
                timeout_sec: api_timeout_sec,
                credentials,
            }),
            (Some(_), None) => {
                bail!(
                    "api_base_url requires credentials in the config file or via {}, {} and {}",
                    API_KEY_ENV,
                    CHAIN_ID_ENV,
                    CUSTOMER_CODE_ENV
                );
            }
            (None, _) => None,
        };

        Ok(Self {
            output_dir,
            state_dir,
            concurrency,
            lookback_days,
            progress_bar,
            api,
            fetch_options,
            retry,
            validation,
            locks,
        })
    }

    pub fn dedup_list_path(&self) -> PathBuf {
        self.state_dir.join("processed_ids.txt")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.state_dir.join("retry_ledger.json")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.state_dir.join("manifest.json")
    }

    pub fn validation_report_path(&self) -> PathBuf {
        self.state_dir.join("validation_report.txt")
    }

    pub fn permanent_failures_path(&self) -> PathBuf {
        self.state_dir.join("permanent_failures.txt")
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.state_dir.join("errors.log")
    }

    pub fn lock_policy(&self) -> LockPolicy {
        LockPolicy {
            attempts: self.locks.attempts,
            retry_delay: Duration::from_millis(self.locks.retry_delay_ms),
        }
    }
}

/// Files at or above this size skip the structural marker scan.
pub const DEFAULT_STRUCTURAL_SCAN_MAX_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Failed attempts after which an artifact is given up on.
    pub max_retries: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationSettings {
    pub structural_scan_max_bytes: u64,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            structural_scan_max_bytes: DEFAULT_STRUCTURAL_SCAN_MAX_BYTES,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LockSettings {
    pub attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            attempts: 5,
            retry_delay_ms: 200,
        }
    }
}

/// File values win over environment values field by field. All three
/// fields must end up set, or none of them.
fn resolve_credentials<F>(file: CredentialsConfig, env: &F) -> Result<Option<ApiCredentials>>
where
    F: Fn(&str) -> Option<String>,
{
    let pick = |value: Option<String>, key: &str| {
        value
            .or_else(|| env(key))
            .filter(|v| !v.trim().is_empty())
    };
    let api_key = pick(file.api_key, API_KEY_ENV);
    let chain_id = pick(file.chain_id, CHAIN_ID_ENV);
    let customer_code = pick(file.customer_code, CUSTOMER_CODE_ENV);

    match (api_key, chain_id, customer_code) {
        (Some(api_key), Some(chain_id), Some(customer_code)) => Ok(Some(ApiCredentials {
            api_key,
            chain_id,
            customer_code,
        })),
        (None, None, None) => Ok(None),
        _ => bail!("api_key, chain_id and customer_code must be provided together"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn make_temp_output_dir() -> TempDir {
        TempDir::new().unwrap()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn base_cli(dir: &TempDir) -> CliConfig {
        CliConfig {
            output_dir: Some(dir.path().to_path_buf()),
            concurrency: 4,
            max_retries: 3,
            lookback_days: 7,
            api_timeout_sec: 60,
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_cli_only() {
        let temp_dir = make_temp_output_dir();
        let cli = CliConfig {
            output_dir: Some(temp_dir.path().to_path_buf()),
            state_dir: Some(PathBuf::from("/state")),
            concurrency: 6,
            max_retries: 4,
            lookback_days: 14,
            api_base_url: None,
            api_timeout_sec: 120,
            progress_bar: true,
        };

        let config = AppConfig::resolve_with_env(&cli, None, no_env).unwrap();

        assert_eq!(config.output_dir, temp_dir.path());
        assert_eq!(config.state_dir, PathBuf::from("/state"));
        assert_eq!(config.concurrency, 6);
        assert_eq!(config.retry.max_retries, 4);
        assert_eq!(config.lookback_days, 14);
        assert!(config.progress_bar);
        assert!(config.api.is_none());
        assert_eq!(config.fetch_options, FetchOptions::default());
        assert_eq!(
            config.validation.structural_scan_max_bytes,
            DEFAULT_STRUCTURAL_SCAN_MAX_BYTES
        );
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let temp_dir = make_temp_output_dir();
        let cli = CliConfig {
            output_dir: Some(PathBuf::from("/should/be/overridden")),
            concurrency: 4,
            max_retries: 3,
            lookback_days: 7,
            ..Default::default()
        };

        let file_config = FileConfig {
            output_dir: Some(temp_dir.path().to_string_lossy().to_string()),
            concurrency: Some(10),
            retry: Some(RetryConfig {
                max_retries: Some(5),
            }),
            fetch: Some(FetchConfig {
                image_first: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve_with_env(&cli, Some(file_config), no_env).unwrap();

        // TOML values should override CLI
        assert_eq!(config.output_dir, temp_dir.path());
        assert_eq!(config.concurrency, 10);
        assert_eq!(config.retry.max_retries, 5);
        assert!(config.fetch_options.image_first);
        // CLI value used when TOML doesn't specify
        assert_eq!(config.lookback_days, 7);
        assert!(config.fetch_options.include_mileage);
    }

    #[test]
    fn test_resolve_missing_output_dir_error() {
        let cli = CliConfig::default();
        let result = AppConfig::resolve_with_env(&cli, None, no_env);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("output_dir must be specified"));
    }

    #[test]
    fn test_resolve_output_dir_not_directory_error() {
        let temp_file = tempfile::NamedTempFile::new().unwrap();
        let cli = CliConfig {
            output_dir: Some(temp_file.path().to_path_buf()),
            concurrency: 1,
            max_retries: 1,
            ..Default::default()
        };
        let result = AppConfig::resolve_with_env(&cli, None, no_env);
        assert!(result.unwrap_err().to_string().contains("not a directory"));
    }

    #[test]
    fn test_resolve_nonexistent_output_dir_is_allowed() {
        let cli = CliConfig {
            output_dir: Some(PathBuf::from("/nonexistent/path/that/should/not/exist")),
            concurrency: 1,
            max_retries: 1,
            ..Default::default()
        };
        assert!(AppConfig::resolve_with_env(&cli, None, no_env).is_ok());
    }

    #[test]
    fn test_resolve_rejects_zero_concurrency_and_retries() {
        let temp_dir = make_temp_output_dir();
        let cli = CliConfig {
            concurrency: 0,
            ..base_cli(&temp_dir)
        };
        assert!(AppConfig::resolve_with_env(&cli, None, no_env)
            .unwrap_err()
            .to_string()
            .contains("concurrency"));

        let cli = CliConfig {
            max_retries: 0,
            ..base_cli(&temp_dir)
        };
        assert!(AppConfig::resolve_with_env(&cli, None, no_env)
            .unwrap_err()
            .to_string()
            .contains("max_retries"));
    }

    #[test]
    fn test_state_paths_default_to_output_dir() {
        let temp_dir = make_temp_output_dir();
        let config = AppConfig::resolve_with_env(&base_cli(&temp_dir), None, no_env).unwrap();

        assert_eq!(config.state_dir, temp_dir.path());
        assert_eq!(
            config.dedup_list_path(),
            temp_dir.path().join("processed_ids.txt")
        );
        assert_eq!(config.ledger_path(), temp_dir.path().join("retry_ledger.json"));
        assert_eq!(config.manifest_path(), temp_dir.path().join("manifest.json"));
        assert_eq!(
            config.validation_report_path(),
            temp_dir.path().join("validation_report.txt")
        );
        assert_eq!(
            config.permanent_failures_path(),
            temp_dir.path().join("permanent_failures.txt")
        );
        assert_eq!(config.error_log_path(), temp_dir.path().join("errors.log"));
    }

    #[test]
    fn test_lock_policy_from_file() {
        let temp_dir = make_temp_output_dir();
        let file_config = FileConfig {
            locks: Some(LocksConfig {
                attempts: Some(2),
                retry_delay_ms: Some(10),
            }),
            ..Default::default()
        };
        let config =
            AppConfig::resolve_with_env(&base_cli(&temp_dir), Some(file_config), no_env).unwrap();

        let policy = config.lock_policy();
        assert_eq!(policy.attempts, 2);
        assert_eq!(policy.retry_delay, Duration::from_millis(10));
    }

    #[test]
    fn test_credentials_from_env() {
        let temp_dir = make_temp_output_dir();
        let env: HashMap<&str, &str> = HashMap::from([
            (API_KEY_ENV, "env-key"),
            (CHAIN_ID_ENV, "env-chain"),
            (CUSTOMER_CODE_ENV, "ACME"),
        ]);
        let cli = CliConfig {
            api_base_url: Some("http://localhost:9000".to_string()),
            ..base_cli(&temp_dir)
        };

        let config = AppConfig::resolve_with_env(&cli, None, |key| {
            env.get(key).map(|v| v.to_string())
        })
        .unwrap();

        let api = config.api.unwrap();
        assert_eq!(api.base_url, "http://localhost:9000");
        assert_eq!(api.timeout_sec, 60);
        assert_eq!(api.credentials.api_key, "env-key");
        assert_eq!(api.credentials.customer_code, "ACME");
    }

    #[test]
    fn test_file_credentials_override_env() {
        let temp_dir = make_temp_output_dir();
        let env: HashMap<&str, &str> = HashMap::from([
            (API_KEY_ENV, "env-key"),
            (CHAIN_ID_ENV, "env-chain"),
            (CUSTOMER_CODE_ENV, "ENV"),
        ]);
        let file_config = FileConfig {
            api_base_url: Some("http://localhost:9000".to_string()),
            credentials: Some(CredentialsConfig {
                api_key: Some("file-key".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve_with_env(&base_cli(&temp_dir), Some(file_config), |key| {
            env.get(key).map(|v| v.to_string())
        })
        .unwrap();

        let credentials = config.api.unwrap().credentials;
        assert_eq!(credentials.api_key, "file-key");
        assert_eq!(credentials.chain_id, "env-chain");
        assert_eq!(credentials.customer_code, "ENV");
    }

    #[test]
    fn test_partial_credentials_error() {
        let temp_dir = make_temp_output_dir();
        let file_config = FileConfig {
            credentials: Some(CredentialsConfig {
                api_key: Some("key".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let result = AppConfig::resolve_with_env(&base_cli(&temp_dir), Some(file_config), no_env);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("must be provided together"));
    }

    #[test]
    fn test_base_url_without_credentials_error() {
        let temp_dir = make_temp_output_dir();
        let cli = CliConfig {
            api_base_url: Some("http://localhost:9000".to_string()),
            ..base_cli(&temp_dir)
        };
        let result = AppConfig::resolve_with_env(&cli, None, no_env);
        assert!(result.unwrap_err().to_string().contains("requires credentials"));
    }
}
