//! Crash-safe whole-file replacement.
//!
//! New content is written to a `.tmp` sibling and fsynced, the live file is
//! copied to a `.bak` sibling, the temp file is renamed over the live file
//! and the backup is removed. If the rename fails the backup is copied back
//! over the live path before the error is returned, so the live file is
//! never left missing or half-written.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur while replacing a file.
#[derive(Debug, Error)]
pub enum AtomicWriteError {
    #[error("Failed to write temporary file {path:?}: {source}")]
    WriteTemp { path: PathBuf, source: io::Error },

    #[error("Failed to back up {path:?}: {source}")]
    Backup { path: PathBuf, source: io::Error },

    #[error("Failed to replace {path:?}: {source} (previous contents restored)")]
    Replace { path: PathBuf, source: io::Error },

    #[error("Failed to replace {path:?}: {source}; restoring the backup also failed: {restore_error}")]
    Unrecoverable {
        path: PathBuf,
        source: io::Error,
        restore_error: io::Error,
    },
}

/// Path of the temporary file used while replacing `path`.
pub fn tmp_path(path: &Path) -> PathBuf {
    sibling_with_suffix(path, "tmp")
}

/// Path of the backup copy kept while replacing `path`.
pub fn backup_path(path: &Path) -> PathBuf {
    sibling_with_suffix(path, "bak")
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Replace the contents of `path` with `contents`.
///
/// Parent directories are created if needed.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), AtomicWriteError> {
    let tmp = tmp_path(path);
    let backup = backup_path(path);

    write_temp(&tmp, contents).map_err(|source| AtomicWriteError::WriteTemp {
        path: tmp.clone(),
        source,
    })?;

    let had_live = path.exists();
    if had_live {
        if let Err(source) = fs::copy(path, &backup) {
            let _ = fs::remove_file(&tmp);
            return Err(AtomicWriteError::Backup {
                path: path.to_path_buf(),
                source,
            });
        }
    }

    if let Err(source) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        if !had_live {
            return Err(AtomicWriteError::Replace {
                path: path.to_path_buf(),
                source,
            });
        }
        return match fs::copy(&backup, path) {
            Ok(_) => {
                let _ = fs::remove_file(&backup);
                Err(AtomicWriteError::Replace {
                    path: path.to_path_buf(),
                    source,
                })
            }
            Err(restore_error) => Err(AtomicWriteError::Unrecoverable {
                path: path.to_path_buf(),
                source,
                restore_error,
            }),
        };
    }

    if had_live {
        if let Err(e) = fs::remove_file(&backup) {
            warn!("Failed to remove backup {:?}: {}", backup, e);
        }
    }

    debug!("Wrote {} bytes to {:?}", contents.len(), path);
    Ok(())
}

fn write_temp(tmp: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = tmp.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut file = File::create(tmp)?;
    file.write_all(contents)?;
    file.sync_all()
}
