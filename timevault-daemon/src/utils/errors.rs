//! Engine error taxonomy.
//!
//! Per-file errors are contained by the worker that hit them; cycle-fatal
//! errors (`is_cycle_fatal`) abort the whole run and surface a warning.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("backup target unavailable: {0}")]
    TargetUnavailable(PathBuf),

    #[error("backup target is read-only: {0}")]
    TargetReadOnly(PathBuf),

    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("no space left on backup target")]
    DiskFull,

    #[error("insufficient space for plan: need {needed} bytes, {available} available")]
    InsufficientSpace { needed: u64, available: u64 },

    #[error("failed to hash {path}: {source}")]
    Hash { path: PathBuf, source: io::Error },

    #[error("copy failed for {path}: {source}")]
    Copy { path: PathBuf, source: io::Error },

    #[error("rename failed for {path}: {source}")]
    Rename { path: PathBuf, source: io::Error },

    #[error("journal write failed: {0}")]
    Journal(#[source] io::Error),

    #[error("manifest write failed: {0}")]
    ManifestWrite(#[source] io::Error),

    #[error("refusing to overwrite a non-empty manifest with empty data")]
    ManifestEmptyOverwrite,

    #[error("cancelled")]
    Cancelled,
}

impl EngineError {
    /// Errors that abort the whole cycle rather than just one file.
    pub fn is_cycle_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::DiskFull
                | EngineError::InsufficientSpace { .. }
                | EngineError::TargetUnavailable(_)
                | EngineError::TargetReadOnly(_)
                | EngineError::Journal(_)
        )
    }

    /// Classify an I/O failure while touching the backup target.
    pub fn classify_target(path: &Path, err: io::Error) -> Self {
        use io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => EngineError::TargetUnavailable(path.to_path_buf()),
            ErrorKind::ReadOnlyFilesystem => EngineError::TargetReadOnly(path.to_path_buf()),
            ErrorKind::PermissionDenied => EngineError::PermissionDenied(path.to_path_buf()),
            ErrorKind::StorageFull | ErrorKind::QuotaExceeded => EngineError::DiskFull,
            _ => EngineError::Copy {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    /// Classify a mid-copy I/O failure. ENOSPC and a read-only target are
    /// cycle-fatal; anything else stays a per-file copy failure.
    pub fn classify_copy(src: &Path, dst: &Path, err: io::Error) -> Self {
        use io::ErrorKind;
        match err.kind() {
            ErrorKind::StorageFull | ErrorKind::QuotaExceeded => EngineError::DiskFull,
            ErrorKind::ReadOnlyFilesystem => EngineError::TargetReadOnly(dst.to_path_buf()),
            _ => EngineError::Copy {
                path: src.to_path_buf(),
                source: err,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(EngineError::DiskFull.is_cycle_fatal());
        assert!(EngineError::TargetReadOnly(PathBuf::from("/mnt")).is_cycle_fatal());
        assert!(EngineError::Journal(io::Error::other("boom")).is_cycle_fatal());
        assert!(!EngineError::PermissionDenied(PathBuf::from("/home/x")).is_cycle_fatal());
        assert!(!EngineError::Cancelled.is_cycle_fatal());
    }

    #[test]
    fn test_classify_target() {
        let err = io::Error::new(io::ErrorKind::NotFound, "gone");
        match EngineError::classify_target(Path::new("/mnt/usb"), err) {
            EngineError::TargetUnavailable(p) => assert_eq!(p, Path::new("/mnt/usb")),
            other => panic!("unexpected classification: {other:?}"),
        }

        let err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        match EngineError::classify_target(Path::new("/mnt/usb"), err) {
            EngineError::PermissionDenied(_) => {}
            other => panic!("unexpected classification: {other:?}"),
        }
    }
}
