//! File-backed persistence helpers: atomic replacement, named locks and the
//! shared error log.

mod atomic;
mod error_log;
mod lock;

pub use atomic::{atomic_write, backup_path, tmp_path, AtomicWriteError};
pub use error_log::ErrorLog;
pub use lock::{LockError, LockOutcome, LockPolicy, NamedFileLock};
