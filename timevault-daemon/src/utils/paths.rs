//! Application constants, socket locations and the on-device backup layout.
//!
//! The layout under `<device>/timevault` is stable; restore tooling walks
//! it directly and the manifest stores absolute paths into it.

use chrono::Local;
use std::path::{Path, PathBuf};

pub const APP_NAME: &str = "timevault";

/// Runtime directory for the UI sockets (`$XDG_RUNTIME_DIR`, `/tmp` fallback).
pub fn runtime_dir() -> PathBuf {
    std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
}

/// Event broadcast socket the UI listens on.
pub fn event_socket_path() -> PathBuf {
    runtime_dir().join(format!("{APP_NAME}-ui.sock"))
}

/// Control socket the daemon listens on (cancel commands).
pub fn control_socket_path() -> PathBuf {
    runtime_dir().join(format!("{APP_NAME}-ui.sock.ctrl"))
}

pub fn pid_file_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(format!(".{APP_NAME}.pid"))
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/etc"))
        .join(APP_NAME)
        .join("config.conf")
}

/// Normalize a backup-relative path: forward slashes only, no empty, `.`
/// or `..` segments. Returns `None` for keys that would escape the backup
/// root or collapse to nothing.
pub fn normalize_rel_path(raw: &str) -> Option<String> {
    let cleaned = raw.replace('\\', "/");
    let mut segments = Vec::new();
    for seg in cleaned.split('/') {
        match seg {
            "" | "." => continue,
            ".." => return None,
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// Build the stable manifest key for a file under a source root:
/// `<root basename>/<path relative to root>`.
pub fn rel_path_for(root: &Path, file: &Path) -> Option<String> {
    let base = root.file_name()?.to_str()?;
    let rel = file.strip_prefix(root).ok()?;
    let mut key = String::from(base);
    for comp in rel.components() {
        key.push('/');
        key.push_str(comp.as_os_str().to_str()?);
    }
    normalize_rel_path(&key)
}

/// Date/time folder names for the incremental tree, captured once per cycle
/// so every versioned file of a run lands in the same directory.
#[derive(Debug, Clone)]
pub struct CycleStamp {
    pub date: String,
    pub time: String,
}

impl CycleStamp {
    pub fn now() -> Self {
        let now = Local::now();
        Self {
            date: now.format("%d-%m-%Y").to_string(),
            time: now.format("%H-%M").to_string(),
        }
    }
}

/// Paths under `<device>/timevault`.
#[derive(Debug, Clone)]
pub struct BackupLayout {
    base: PathBuf,
}

impl BackupLayout {
    pub fn new(device_root: &Path) -> Self {
        Self {
            base: device_root.join(APP_NAME),
        }
    }

    /// `<device>/timevault`
    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.base.join("backups")
    }

    /// Canonical latest copies.
    pub fn main_backup_dir(&self) -> PathBuf {
        self.backups_dir().join(".main_backup")
    }

    /// Dated snapshots of files changed after their first backup.
    pub fn incremental_dir(&self, stamp: &CycleStamp) -> PathBuf {
        self.backups_dir().join(&stamp.date).join(&stamp.time)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.base.join(".backup_manifest.json")
    }

    pub fn journal_path(&self) -> PathBuf {
        self.base.join(".backup_journal.log")
    }

    /// Written by the external summary generator; opaque to the engine.
    pub fn summary_path(&self) -> PathBuf {
        self.base.join(".backup_summary.json")
    }

    /// Scratch directory for the writability probe.
    pub fn probe_dir(&self) -> PathBuf {
        self.base.join(".perm_test")
    }

    pub fn main_dst(&self, rel_path: &str) -> PathBuf {
        self.main_backup_dir().join(rel_path)
    }

    pub fn incremental_dst(&self, stamp: &CycleStamp, rel_path: &str) -> PathBuf {
        self.incremental_dir(stamp).join(rel_path)
    }
}
