use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use expense_pdf_sync::config::{AppConfig, CliConfig, FileConfig};
use expense_pdf_sync::document_api::{ApiFetcher, DocumentApi, HttpDocumentApi};
use expense_pdf_sync::download::{DateRange, Fetcher, SyncRun};
use expense_pdf_sync::validation::ValidationRetryOrchestrator;

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(name = "expense-pdf-sync")]
#[command(about = "Download expense report PDFs and repair corrupt ones")]
struct CliArgs {
    /// Path to a TOML config file. Its values override the CLI arguments.
    #[clap(long, global = true, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory the PDFs are stored in.
    #[clap(long, global = true, value_parser = parse_path)]
    pub output_dir: Option<PathBuf>,

    /// Directory for the dedup list, ledger, manifest and reports.
    /// Defaults to the output directory.
    #[clap(long, global = true, value_parser = parse_path)]
    pub state_dir: Option<PathBuf>,

    /// Maximum number of concurrent downloads.
    #[clap(long, global = true, default_value_t = 4)]
    pub concurrency: usize,

    /// Failed attempts after which an artifact is given up on.
    #[clap(long, global = true, default_value_t = 3)]
    pub max_retries: u32,

    /// Days listed when no --from is given.
    #[clap(long, global = true, default_value_t = 7)]
    pub lookback_days: u32,

    /// Base URL of the document service.
    #[clap(long, global = true)]
    pub api_base_url: Option<String>,

    /// Timeout in seconds for document service requests.
    #[clap(long, global = true, default_value_t = 120)]
    pub api_timeout_sec: u64,

    /// Disable the terminal progress bar.
    #[clap(long, global = true, default_value_t = false)]
    pub no_progress: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List documents in a date range and download the missing ones.
    Sync {
        /// First day to list (YYYY-MM-DD).
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day to list (YYYY-MM-DD), defaults to today.
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Validate stored PDFs and re-download the corrupt ones.
    Validate,

    /// Sync, then validate.
    Run {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            output_dir: self.output_dir.clone(),
            state_dir: self.state_dir.clone(),
            concurrency: self.concurrency,
            max_retries: self.max_retries,
            lookback_days: self.lookback_days,
            api_base_url: self.api_base_url.clone(),
            api_timeout_sec: self.api_timeout_sec,
            progress_bar: !self.no_progress,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli_args = CliArgs::parse();

    if let Err(e) = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
    {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match run(cli_args).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(cli_args: CliArgs) -> Result<u8> {
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    let api: Option<Arc<dyn DocumentApi>> = match &config.api {
        Some(settings) => {
            info!("Document service configured at {}", settings.base_url);
            Some(Arc::new(HttpDocumentApi::new(
                settings.base_url.clone(),
                settings.timeout_sec,
                settings.credentials.clone(),
            )?))
        }
        None => None,
    };

    match cli_args.command {
        Command::Sync { from, to } => sync(&config, api, from, to).await,
        Command::Validate => validate(&config, api).await,
        Command::Run { from, to } => {
            let sync_code = sync(&config, api.clone(), from, to).await?;
            let validate_code = validate(&config, api).await?;
            Ok(sync_code.max(validate_code))
        }
    }
}

async fn sync(
    config: &AppConfig,
    api: Option<Arc<dyn DocumentApi>>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<u8> {
    let api = api.context("sync needs a document service: set api_base_url and credentials")?;
    let range = DateRange::resolve(from, to, config.lookback_days, Local::now().date_naive())?;

    let summary = SyncRun::new(config, api).run(range).await?;
    info!(
        "Sync: {} listed, {} skipped, {} downloaded, {} failed",
        summary.listed,
        summary.skipped_processed + summary.skipped_existing,
        summary.downloaded,
        summary.failed
    );
    Ok(summary.exit_code())
}

async fn validate(config: &AppConfig, api: Option<Arc<dyn DocumentApi>>) -> Result<u8> {
    let fetcher = api.map(|api| {
        Arc::new(ApiFetcher::new(api, config.fetch_options)) as Arc<dyn Fetcher>
    });

    let summary = ValidationRetryOrchestrator::new(config, fetcher)
        .run()
        .await?;
    info!(
        "Validation: {} artifacts, {} corrupt, {} recovered, {} permanent ({})",
        summary.total,
        summary.corrupt,
        summary.recovered,
        summary.permanent_failures,
        summary.completion
    );
    Ok(summary.exit_code())
}
