//! Human-readable reports written after each validation run.

use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use byte_unit::Byte;
use chrono::{DateTime, SecondsFormat, Utc};

use super::ledger::RetryEntry;
use super::orchestrator::ValidationSummary;
use super::validator::ValidationVerdict;
use crate::file_persistence::atomic_write;

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// One section of the validation report: run time, counts, then every
/// corrupt artifact found by the scan.
pub fn render_validation_section(
    run_at: DateTime<Utc>,
    summary: &ValidationSummary,
    corrupt: &[ValidationVerdict],
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Validation run {} ===", timestamp(run_at));
    let _ = writeln!(
        out,
        "total: {}, valid: {}, corrupt: {}, retried: {}, recovered: {}, still failing: {}, permanent: {}, unresolved: {}",
        summary.total,
        summary.valid,
        summary.corrupt,
        summary.retried,
        summary.recovered,
        summary.still_failing,
        summary.permanent_failures,
        summary.unresolved
    );
    if summary.manifest_missing {
        let _ = writeln!(out, "manifest missing: retries skipped");
    }
    let _ = writeln!(out, "completion: {}", summary.completion);

    for verdict in corrupt {
        let _ = writeln!(
            out,
            "  {} ({:#}): {}",
            verdict.path.display(),
            Byte::from(verdict.size_bytes),
            verdict.reason
        );
    }
    out.push('\n');
    out
}

/// Append a section to the report file, creating it if needed.
pub fn append_validation_report(path: &Path, section: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open report {:?}", path))?;
    file.write_all(section.as_bytes())
        .with_context(|| format!("Failed to append to report {:?}", path))
}

/// Full listing of permanently failed artifacts with their history.
pub fn render_permanent_failures(generated_at: DateTime<Utc>, entries: &[(&str, &RetryEntry)]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Permanent failures as of {} ({} artifacts)",
        timestamp(generated_at),
        entries.len()
    );

    for (source_id, entry) in entries {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{} (correlation {})",
            source_id, entry.correlation_id
        );
        let _ = writeln!(out, "  retries: {}", entry.retry_count);
        let _ = writeln!(
            out,
            "  first failure: {}",
            entry.first_failure_at.map(timestamp).unwrap_or_else(|| "-".to_string())
        );
        let _ = writeln!(
            out,
            "  last attempt: {}",
            entry.last_attempt_at.map(timestamp).unwrap_or_else(|| "-".to_string())
        );
        for (i, failure) in entry.failure_history.iter().enumerate() {
            let _ = writeln!(
                out,
                "  {}. {} {}",
                i + 1,
                timestamp(failure.timestamp),
                failure.reason
            );
        }
    }
    out
}

/// Rewrite the permanent-failures report.
pub fn write_permanent_failures(path: &Path, entries: &[(&str, &RetryEntry)]) -> Result<()> {
    let content = render_permanent_failures(Utc::now(), entries);
    atomic_write(path, content.as_bytes())
        .with_context(|| format!("Failed to write permanent failures report {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ledger::{FailureRecord, RetryStatus};
    use crate::validation::orchestrator::Completion;
    use crate::validation::validator::FailureKind;
    use chrono::TimeZone;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_validation_section_lists_corrupt_artifacts() {
        let summary = ValidationSummary {
            total: 3,
            valid: 1,
            corrupt: 2,
            retried: 2,
            recovered: 2,
            completion: Completion::Clean,
            ..Default::default()
        };
        let corrupt = vec![ValidationVerdict {
            path: PathBuf::from("/out/RPT-1.pdf"),
            ok: false,
            size_bytes: 42,
            failure: Some(FailureKind::BadTrailer),
            reason: "BadTrailer: %%EOF marker not found".to_string(),
        }];

        let section = render_validation_section(at(8), &summary, &corrupt);
        assert!(section.starts_with("=== Validation run 2026-10-18T08:00:00Z ==="));
        assert!(section.contains("total: 3, valid: 1, corrupt: 2"));
        assert!(section.contains("completion: clean"));
        assert!(section.contains("/out/RPT-1.pdf"));
        assert!(section.contains("BadTrailer: %%EOF marker not found"));
        assert!(!section.contains("manifest missing"));
    }

    #[test]
    fn test_append_keeps_previous_sections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reports").join("validation_report.txt");

        append_validation_report(&path, "first\n").unwrap();
        append_validation_report(&path, "second\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_permanent_failures_include_history() {
        let entry = RetryEntry {
            correlation_id: "C-9".to_string(),
            retry_count: 3,
            first_failure_at: Some(at(1)),
            last_attempt_at: Some(at(3)),
            status: RetryStatus::FailedPermanent,
            failure_history: vec![
                FailureRecord {
                    timestamp: at(1),
                    reason: "BadHeader: first".to_string(),
                },
                FailureRecord {
                    timestamp: at(2),
                    reason: "download failed: 500".to_string(),
                },
            ],
        };

        let rendered = render_permanent_failures(at(4), &[("RPT-9", &entry)]);
        assert!(rendered.contains("(1 artifacts)"));
        assert!(rendered.contains("RPT-9 (correlation C-9)"));
        assert!(rendered.contains("retries: 3"));
        assert!(rendered.contains("first failure: 2026-10-18T01:00:00Z"));
        assert!(rendered.contains("last attempt: 2026-10-18T03:00:00Z"));

        let first = rendered.find("BadHeader: first").unwrap();
        let second = rendered.find("download failed: 500").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_write_permanent_failures_rewrites_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("permanent_failures.txt");
        fs::write(&path, "stale content").unwrap();

        write_permanent_failures(&path, &[]).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("(0 artifacts)"));
        assert!(!content.contains("stale"));
    }
}
