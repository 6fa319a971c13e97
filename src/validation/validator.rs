//! Structural integrity check for downloaded PDF artifacts.
//!
//! Checks run in order and stop at the first failure:
//! existence, non-empty, header signature, trailer marker and, for files
//! below the scan ceiling, the presence of a document catalog.

use std::fmt;
use std::fs::File;
use std::io::{self, ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_STRUCTURAL_SCAN_MAX_BYTES;

const HEADER_WINDOW: u64 = 512;
const TRAILER_WINDOW: u64 = 1024;
const HEADER_SIGNATURE: &[u8] = b"%PDF-";
const TRAILER_MARKER: &[u8] = b"%%EOF";
const STRUCTURE_MARKERS: [&[u8]; 2] = [b"/Catalog", b"/Pages"];

/// Why an artifact failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    NotFound,
    EmptyFile,
    BadHeader,
    BadTrailer,
    BadStructure,
    Unreadable,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NotFound => "NotFound",
            FailureKind::EmptyFile => "EmptyFile",
            FailureKind::BadHeader => "BadHeader",
            FailureKind::BadTrailer => "BadTrailer",
            FailureKind::BadStructure => "BadStructure",
            FailureKind::Unreadable => "Unreadable",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of validating one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationVerdict {
    pub path: PathBuf,
    pub ok: bool,
    pub size_bytes: u64,
    /// `None` when the artifact is valid.
    pub failure: Option<FailureKind>,
    /// Human-readable explanation, `"valid"` for passing artifacts.
    pub reason: String,
}

impl ValidationVerdict {
    fn valid(path: &Path, size_bytes: u64) -> Self {
        Self {
            path: path.to_path_buf(),
            ok: true,
            size_bytes,
            failure: None,
            reason: "valid".to_string(),
        }
    }

    fn invalid(path: &Path, size_bytes: u64, kind: FailureKind, detail: impl fmt::Display) -> Self {
        Self {
            path: path.to_path_buf(),
            ok: false,
            size_bytes,
            failure: Some(kind),
            reason: format!("{}: {}", kind, detail),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactValidator {
    structural_scan_max_bytes: u64,
}

impl Default for ArtifactValidator {
    fn default() -> Self {
        Self::new(DEFAULT_STRUCTURAL_SCAN_MAX_BYTES)
    }
}

impl ArtifactValidator {
    /// Files of `structural_scan_max_bytes` or more skip the catalog scan.
    pub fn new(structural_scan_max_bytes: u64) -> Self {
        Self {
            structural_scan_max_bytes,
        }
    }

    /// Validate the artifact at `path`. Never modifies the file and never
    /// fails: IO errors become an `Unreadable` verdict.
    pub fn validate(&self, path: &Path) -> ValidationVerdict {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return ValidationVerdict::invalid(path, 0, FailureKind::NotFound, "file does not exist");
            }
            Err(e) => return ValidationVerdict::invalid(path, 0, FailureKind::Unreadable, e),
        };

        let size = match file.metadata() {
            Ok(metadata) if metadata.is_file() => metadata.len(),
            Ok(_) => {
                return ValidationVerdict::invalid(path, 0, FailureKind::Unreadable, "not a regular file");
            }
            Err(e) => return ValidationVerdict::invalid(path, 0, FailureKind::Unreadable, e),
        };

        match self.check(&mut file, size) {
            Ok(None) => ValidationVerdict::valid(path, size),
            Ok(Some((kind, detail))) => ValidationVerdict::invalid(path, size, kind, detail),
            Err(e) => ValidationVerdict::invalid(path, size, FailureKind::Unreadable, e),
        }
    }

    fn check(&self, file: &mut File, size: u64) -> io::Result<Option<(FailureKind, &'static str)>> {
        if size == 0 {
            return Ok(Some((FailureKind::EmptyFile, "file is empty")));
        }

        let header = read_window(file, 0, HEADER_WINDOW.min(size))?;
        if !contains(&header, HEADER_SIGNATURE) {
            return Ok(Some((
                FailureKind::BadHeader,
                "%PDF- signature not found in the first 512 bytes",
            )));
        }

        let tail_len = TRAILER_WINDOW.min(size);
        let trailer = read_window(file, size - tail_len, tail_len)?;
        if !contains(&trailer, TRAILER_MARKER) {
            return Ok(Some((
                FailureKind::BadTrailer,
                "%%EOF marker not found in the last 1024 bytes",
            )));
        }

        if size < self.structural_scan_max_bytes {
            let content = read_window(file, 0, size)?;
            if !STRUCTURE_MARKERS.iter().any(|m| contains(&content, m)) {
                return Ok(Some((
                    FailureKind::BadStructure,
                    "no /Catalog or /Pages object found",
                )));
            }
        }

        Ok(None)
    }
}

fn read_window(file: &mut File, offset: u64, len: u64) -> io::Result<Vec<u8>> {
    file.seek(SeekFrom::Start(offset))?;
    let mut buffer = Vec::with_capacity(len as usize);
    file.take(len).read_to_end(&mut buffer)?;
    Ok(buffer)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}
