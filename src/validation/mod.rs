//! Artifact validation and the retry state machine.

mod ledger;
mod orchestrator;
mod report;
mod validator;

pub use ledger::{
    FailureRecord, LedgerError, LedgerSnapshot, LedgerStatistics, RetryEntry, RetryLedger,
    RetryStatus, LEDGER_VERSION,
};
pub use orchestrator::{Completion, ValidationRetryOrchestrator, ValidationSummary};
pub use report::{
    append_validation_report, render_permanent_failures, render_validation_section,
    write_permanent_failures,
};
pub use validator::{ArtifactValidator, FailureKind, ValidationVerdict};
