//! Common test infrastructure
//!
//! Provides a mock document service, PDF fixtures and config builders.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{MockDocumentServer, TestWorkspace};
//!
//! #[tokio::test]
//! async fn test_sync() {
//!     let server = MockDocumentServer::spawn(vec![("RPT-1", "C-1")]).await;
//!     let workspace = TestWorkspace::new();
//!     let config = workspace.config(Some(&server.base_url), 3);
//! }
//! ```

mod constants;
mod fixtures;
mod server;

// Public API - this is what tests import
#[allow(unused_imports)]
pub use constants::*;
#[allow(unused_imports)]
pub use fixtures::{
    html_error_page, http_fetcher, test_credentials, truncated_pdf, valid_pdf, TestWorkspace,
};
#[allow(unused_imports)]
pub use server::{MockDocumentServer, MockResponse};
