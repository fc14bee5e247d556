//! Durable per-file backup metadata, keyed by normalized relative path.
//!
//! A single JSON document on the backup device. Persistence is atomic
//! (same-directory temp file, fsync, rename, parent fsync) and guarded: a
//! timestamped backup of the previous manifest is kept, and an empty map
//! never overwrites a non-empty file.

use crate::utils::errors::EngineError;
use crate::utils::paths;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Manifest flushes are batched; one save per this many upserts, plus a
/// forced flush at cycle end.
const FLUSH_EVERY: u32 = 100;

/// Rolling `.bak.<UTC>` copies retained alongside the manifest.
const BACKUPS_KEPT: usize = 3;

/// Metadata for a single backed-up file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestEntry {
    pub dst_path: PathBuf,
    pub mtime_ns: i64,
    pub size: u64,
    pub hash: String,
}

pub struct ManifestStore {
    path: PathBuf,
    state: Mutex<ManifestState>,
}

#[derive(Default)]
struct ManifestState {
    entries: HashMap<String, ManifestEntry>,
    upserts_since_flush: u32,
}

impl ManifestStore {
    /// Load the manifest, normalizing legacy key variants. A missing or
    /// unreadable file yields an empty map; the refuse-empty-overwrite
    /// rule in [`save`](Self::save) keeps a corrupt load from clobbering
    /// good data on disk.
    pub fn load(path: PathBuf) -> Self {
        let mut entries = HashMap::new();
        match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, ManifestEntry>>(&raw) {
                Ok(parsed) => {
                    for (key, entry) in parsed {
                        match paths::normalize_rel_path(&key) {
                            Some(normalized) => {
                                entries.insert(normalized, entry);
                            }
                            None => {
                                tracing::warn!(key, "dropping manifest entry with invalid key")
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "manifest unreadable, starting empty")
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "could not read manifest, starting empty")
            }
        }

        if !entries.is_empty() {
            tracing::info!(entries = entries.len(), "manifest loaded");
        }

        Self {
            path,
            state: Mutex::new(ManifestState {
                entries,
                upserts_since_flush: 0,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, rel_path: &str) -> Option<ManifestEntry> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .get(rel_path)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> HashMap<String, ManifestEntry> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .clone()
    }

    /// Record a successful commit. Returns true when a batched flush is
    /// due.
    pub fn upsert(&self, rel_path: &str, entry: ManifestEntry) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.entries.insert(rel_path.to_string(), entry);
        state.upserts_since_flush += 1;
        if state.upserts_since_flush >= FLUSH_EVERY {
            state.upserts_since_flush = 0;
            true
        } else {
            false
        }
    }

    /// Refresh only the recorded mtime; used when a rescanned file's
    /// content turned out unchanged.
    pub fn touch_mtime(&self, rel_path: &str, mtime_ns: i64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = state.entries.get_mut(rel_path) {
            entry.mtime_ns = mtime_ns;
        }
    }

    /// Atomically persist the current state. Fails without touching the
    /// live file when the in-memory map is empty and the file is not.
    pub fn save(&self) -> Result<(), EngineError> {
        let snapshot = self.snapshot();

        let live_nonempty = fs::metadata(&self.path).map(|m| m.len() > 0).unwrap_or(false);
        if snapshot.is_empty() {
            if live_nonempty {
                return Err(EngineError::ManifestEmptyOverwrite);
            }
            // Nothing to persist and nothing on disk worth replacing
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(EngineError::ManifestWrite)?;
        }
        if live_nonempty {
            self.rotate_backups();
        }

        let payload = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| EngineError::ManifestWrite(io::Error::new(io::ErrorKind::InvalidData, e)))?;

        let tmp = PathBuf::from(format!("{}.tmp_{}", self.path.display(), std::process::id()));
        let write_result = (|| -> io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(payload.as_bytes())?;
            file.sync_all()
        })();
        if let Err(e) = write_result {
            let _ = fs::remove_file(&tmp);
            return Err(EngineError::ManifestWrite(e));
        }

        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(EngineError::ManifestWrite(e));
        }
        sync_parent_dir(&self.path);

        tracing::debug!(entries = snapshot.len(), "manifest persisted");
        Ok(())
    }

    /// Copy the live manifest to `.bak.<UTC>` and prune old backups; any
    /// failure here only costs a backup generation.
    fn rotate_backups(&self) {
        let stamp = Utc::now().format("%Y%m%d-%H%M%S");
        let bak = PathBuf::from(format!("{}.bak.{stamp}", self.path.display()));
        if let Err(e) = fs::copy(&self.path, &bak) {
            tracing::warn!(error = %e, "could not create manifest backup");
            return;
        }

        let (Some(parent), Some(name)) = (
            self.path.parent(),
            self.path.file_name().and_then(|n| n.to_str()),
        ) else {
            return;
        };
        let prefix = format!("{name}.bak.");
        let Ok(dir) = fs::read_dir(parent) else { return };

        let mut backups: Vec<String> = dir
            .flatten()
            .filter_map(|e| e.file_name().to_str().map(String::from))
            .filter(|n| n.starts_with(&prefix))
            .collect();
        backups.sort();
        backups.reverse();
        for old in backups.iter().skip(BACKUPS_KEPT) {
            if let Err(e) = fs::remove_file(parent.join(old)) {
                tracing::warn!(backup = %old, error = %e, "could not delete old manifest backup");
            } else {
                tracing::debug!(backup = %old, "deleted old manifest backup");
            }
        }
    }
}

/// POSIX needs a directory fsync for the rename to be durable.
fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            if let Err(e) = dir.sync_all() {
                tracing::debug!(error = %e, "parent directory fsync failed");
            }
        }
    }
}
