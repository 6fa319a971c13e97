//! Expense PDF Sync Library
//!
//! Downloads expense-report PDFs from the document service, validates them
//! and re-fetches corrupt ones with a durable retry ledger. The modules are
//! exposed for the binary and for integration tests.

pub mod config;
pub mod document_api;
pub mod download;
pub mod file_persistence;
pub mod validation;

// Re-export commonly used types for convenience
pub use config::{AppConfig, CliConfig, FileConfig};
pub use document_api::{ApiFetcher, DocumentApi, HttpDocumentApi};
pub use download::{BoundedDownloader, DateRange, Fetcher, SyncRun, SyncSummary};
pub use validation::{Completion, ValidationRetryOrchestrator, ValidationSummary};
