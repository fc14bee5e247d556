//! Append-only write-ahead journal for copy and link operations.
//!
//! One JSON object per line. A `started` record captures everything replay
//! needs to finish or discard the operation; a `completed` record with the
//! same id closes it. Replay runs at startup and after a suspend gap, and
//! is deliberately conservative: it never removes a live destination file.

use crate::engine::hasher;
use crate::utils::errors::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// fsync cadence for appends; the tail is also synced at cycle end.
/// Replay tolerates a truncated trailing line, which is the worst a crash
/// inside this window can leave behind.
const FSYNC_EVERY: u32 = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum JournalOp {
    Copy(CopyPayload),
    Link(LinkPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CopyPayload {
    pub src: PathBuf,
    pub dst: PathBuf,
    pub tmp: PathBuf,
    pub hash: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkPayload {
    pub src: PathBuf,
    pub dst: PathBuf,
}

/// On-disk line shape. `started` records carry `type` and `payload`,
/// `completed` records only the id.
#[derive(Debug, Serialize, Deserialize)]
struct JournalRecord {
    status: String,
    id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<serde_json::Value>,
    time: DateTime<Utc>,
}

impl JournalRecord {
    fn started(id: String, op: &JournalOp) -> Result<Self, serde_json::Error> {
        let (kind, payload) = match op {
            JournalOp::Copy(p) => ("copy", serde_json::to_value(p)?),
            JournalOp::Link(p) => ("link", serde_json::to_value(p)?),
        };
        Ok(Self {
            status: "started".to_string(),
            id,
            kind: Some(kind.to_string()),
            payload: Some(payload),
            time: Utc::now(),
        })
    }

    fn completed(id: String) -> Self {
        Self {
            status: "completed".to_string(),
            id,
            kind: None,
            payload: None,
            time: Utc::now(),
        }
    }

    fn parse_op(&self) -> Option<JournalOp> {
        let payload = self.payload.clone()?;
        match self.kind.as_deref()? {
            "copy" => serde_json::from_value(payload).ok().map(JournalOp::Copy),
            "link" => serde_json::from_value(payload).ok().map(JournalOp::Link),
            _ => None,
        }
    }
}

/// What a replay pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    /// Valid temp files renamed into their destination.
    pub recovered: usize,
    /// Corrupt temp files deleted.
    pub discarded: usize,
    /// Hardlinks recreated.
    pub relinked: usize,
    /// Entries whose destination already existed.
    pub acknowledged: usize,
}

pub struct Journal {
    path: PathBuf,
    inner: Mutex<JournalInner>,
}

#[derive(Default)]
struct JournalInner {
    file: Option<File>,
    appends_since_sync: u32,
}

impl Journal {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            inner: Mutex::new(JournalInner::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record an operation about to run. Returns the entry id the caller
    /// must close with [`append_completed`](Self::append_completed).
    pub fn append_started(&self, op: JournalOp) -> Result<String, EngineError> {
        let id = Uuid::new_v4().simple().to_string();
        let record = JournalRecord::started(id.clone(), &op)
            .map_err(|e| EngineError::Journal(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        self.append(&record)?;
        Ok(id)
    }

    pub fn append_completed(&self, id: &str) -> Result<(), EngineError> {
        self.append(&JournalRecord::completed(id.to_string()))
    }

    fn append(&self, record: &JournalRecord) -> Result<(), EngineError> {
        let mut line = serde_json::to_string(record)
            .map_err(|e| EngineError::Journal(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        line.push('\n');

        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let inner = &mut *guard;
        if inner.file.is_none() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent).map_err(EngineError::Journal)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .map_err(EngineError::Journal)?;
            inner.file = Some(file);
        }

        // One write per record keeps lines atomic on local filesystems.
        let file = inner
            .file
            .as_mut()
            .ok_or_else(|| EngineError::Journal(io::Error::other("journal file unavailable")))?;
        file.write_all(line.as_bytes()).map_err(EngineError::Journal)?;
        inner.appends_since_sync += 1;
        if inner.appends_since_sync >= FSYNC_EVERY {
            file.sync_data().map_err(EngineError::Journal)?;
            inner.appends_since_sync = 0;
        }
        Ok(())
    }

    /// Force the tail of the log to stable storage (cycle end).
    pub fn sync(&self) -> Result<(), EngineError> {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let inner = &mut *guard;
        if let Some(file) = inner.file.as_mut() {
            file.sync_data().map_err(EngineError::Journal)?;
            inner.appends_since_sync = 0;
        }
        Ok(())
    }

    /// Started entries without a matching completed entry, in log order.
    pub fn incomplete(&self) -> Vec<(String, JournalOp)> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(_) => return Vec::new(),
        };

        let mut completed: HashSet<String> = HashSet::new();
        let mut started: Vec<(String, JournalOp)> = Vec::new();
        for line in BufReader::new(file).lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalRecord>(line) {
                Ok(record) if record.status == "completed" => {
                    completed.insert(record.id);
                }
                Ok(record) if record.status == "started" => match record.parse_op() {
                    Some(op) => started.push((record.id, op)),
                    None => {
                        tracing::warn!(id = %record.id, "started entry with unusable payload")
                    }
                },
                Ok(record) => {
                    tracing::warn!(status = %record.status, "unknown journal record status")
                }
                // A crash between write and fsync can truncate the last line
                Err(e) => tracing::warn!(error = %e, "skipping unparseable journal line"),
            }
        }

        started.retain(|(id, _)| !completed.contains(id));
        started
    }

    /// Reconcile every incomplete operation against the filesystem, then
    /// sync the log. Safe to run any number of times from any on-disk
    /// state.
    pub fn replay(&self) -> Result<ReplayStats, EngineError> {
        let mut stats = ReplayStats::default();
        let incomplete = self.incomplete();
        if !incomplete.is_empty() {
            tracing::info!(count = incomplete.len(), "replaying incomplete journal entries");
        }

        for (id, op) in incomplete {
            match op {
                JournalOp::Copy(payload) => self.replay_copy(&id, &payload, &mut stats)?,
                JournalOp::Link(payload) => self.replay_link(&id, &payload, &mut stats)?,
            }
        }

        self.sync()?;
        Ok(stats)
    }

    fn replay_copy(
        &self,
        id: &str,
        payload: &CopyPayload,
        stats: &mut ReplayStats,
    ) -> Result<(), EngineError> {
        // The canonical destination is always a regular file.
        if payload.dst.is_dir() {
            if let Err(e) = std::fs::remove_dir_all(&payload.dst) {
                tracing::warn!(dst = %payload.dst.display(), error = %e, "could not clear directory at destination");
                return Ok(());
            }
        }

        if payload.tmp.exists() {
            if tmp_matches_payload(payload) {
                if let Some(parent) = payload.dst.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                match std::fs::rename(&payload.tmp, &payload.dst) {
                    Ok(()) => {
                        stats.recovered += 1;
                        tracing::info!(dst = %payload.dst.display(), "recovered interrupted copy");
                        self.append_completed(id)?;
                    }
                    Err(e) => {
                        // Leave the entry open; the next replay retries
                        tracing::warn!(dst = %payload.dst.display(), error = %e, "could not finish interrupted copy");
                    }
                }
            } else {
                match std::fs::remove_file(&payload.tmp) {
                    Ok(()) => {
                        stats.discarded += 1;
                        tracing::info!(tmp = %payload.tmp.display(), "discarded corrupt temp file");
                        self.append_completed(id)?;
                    }
                    Err(e) => {
                        tracing::warn!(tmp = %payload.tmp.display(), error = %e, "could not remove corrupt temp file");
                    }
                }
            }
        } else if payload.dst.is_file() {
            // The rename landed before the crash
            stats.acknowledged += 1;
            self.append_completed(id)?;
        }
        // Neither tmp nor dst: nothing to reconcile, the next cycle
        // re-plans the file from scratch.
        Ok(())
    }

    fn replay_link(
        &self,
        id: &str,
        payload: &LinkPayload,
        stats: &mut ReplayStats,
    ) -> Result<(), EngineError> {
        if payload.dst.exists() {
            stats.acknowledged += 1;
            self.append_completed(id)?;
            return Ok(());
        }
        if payload.src.exists() {
            if let Some(parent) = payload.dst.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            match std::fs::hard_link(&payload.src, &payload.dst) {
                Ok(()) => {
                    stats.relinked += 1;
                    tracing::info!(dst = %payload.dst.display(), "recreated interrupted hardlink");
                    self.append_completed(id)?;
                }
                Err(e) => {
                    tracing::warn!(dst = %payload.dst.display(), error = %e, "could not recreate hardlink");
                }
            }
        }
        Ok(())
    }
}

/// A temp file is only promoted when both size and content hash match the
/// journaled payload.
fn tmp_matches_payload(payload: &CopyPayload) -> bool {
    let size_ok = std::fs::metadata(&payload.tmp)
        .map(|m| m.len() == payload.size)
        .unwrap_or(false);
    if !size_ok {
        return false;
    }
    hasher::hash_file(&payload.tmp)
        .map(|h| h == payload.hash)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::hasher::hash_file;
    use std::fs;
    use std::os::unix::fs::MetadataExt;
    use tempfile::TempDir;

    fn journal_in(dir: &TempDir) -> Journal {
        Journal::new(dir.path().join(".backup_journal.log"))
    }

    fn copy_payload(dir: &TempDir, content: &[u8]) -> CopyPayload {
        let src = dir.path().join("src.txt");
        fs::write(&src, content).unwrap();
        let dst = dir.path().join("backup").join("file.txt");
        let tmp = dir.path().join("backup").join("file.txt.tmp_test");
        CopyPayload {
            hash: hash_file(&src).unwrap(),
            size: content.len() as u64,
            src,
            dst,
            tmp,
        }
    }

    #[test]
    fn test_append_and_complete_counts_lines() {
        let dir = TempDir::new().unwrap();
        let journal = journal_in(&dir);

        for i in 0..10 {
            let id = journal
                .append_started(JournalOp::Copy(CopyPayload {
                    src: PathBuf::from(format!("/src{i}")),
                    dst: PathBuf::from(format!("/dst{i}")),
                    tmp: PathBuf::from(format!("/tmp{i}")),
                    hash: "h".into(),
                    size: 1,
                }))
                .unwrap();
            journal.append_completed(&id).unwrap();
        }

        let raw = fs::read_to_string(journal.path()).unwrap();
        assert_eq!(raw.lines().filter(|l| !l.trim().is_empty()).count(), 20);
        assert!(journal.incomplete().is_empty());
    }

    #[test]
    fn test_replay_moves_valid_tmp_to_dst() {
        let dir = TempDir::new().unwrap();
        let journal = journal_in(&dir);
        let payload = copy_payload(&dir, b"hello-journal");

        fs::create_dir_all(payload.tmp.parent().unwrap()).unwrap();
        fs::write(&payload.tmp, b"hello-journal").unwrap();
        journal.append_started(JournalOp::Copy(payload.clone())).unwrap();

        let stats = journal.replay().unwrap();

        assert_eq!(stats.recovered, 1);
        assert_eq!(fs::read(&payload.dst).unwrap(), b"hello-journal");
        assert!(!payload.tmp.exists());
        assert!(journal.incomplete().is_empty());
    }

    #[test]
    fn test_replay_removes_corrupt_tmp_without_creating_dst() {
        let dir = TempDir::new().unwrap();
        let journal = journal_in(&dir);
        let payload = copy_payload(&dir, b"original");

        fs::create_dir_all(payload.tmp.parent().unwrap()).unwrap();
        fs::write(&payload.tmp, b"corrupted-content").unwrap();
        journal.append_started(JournalOp::Copy(payload.clone())).unwrap();

        let stats = journal.replay().unwrap();

        assert_eq!(stats.discarded, 1);
        assert!(!payload.tmp.exists());
        assert!(!payload.dst.exists());
        assert!(journal.incomplete().is_empty());
    }

    #[test]
    fn test_replay_acknowledges_landed_copy() {
        let dir = TempDir::new().unwrap();
        let journal = journal_in(&dir);
        let payload = copy_payload(&dir, b"landed");

        // Crash happened after the rename: dst exists, tmp is gone
        fs::create_dir_all(payload.dst.parent().unwrap()).unwrap();
        fs::write(&payload.dst, b"landed").unwrap();
        journal.append_started(JournalOp::Copy(payload.clone())).unwrap();

        let stats = journal.replay().unwrap();
        assert_eq!(stats.acknowledged, 1);
        assert!(journal.incomplete().is_empty());
    }

    #[test]
    fn test_link_replay_recreates_hardlink() {
        let dir = TempDir::new().unwrap();
        let journal = journal_in(&dir);

        let src = dir.path().join("orig").join("file.bin");
        fs::create_dir_all(src.parent().unwrap()).unwrap();
        fs::write(&src, b"link-content").unwrap();
        let dst = dir.path().join("links").join("file.bin");

        journal
            .append_started(JournalOp::Link(LinkPayload {
                src: src.clone(),
                dst: dst.clone(),
            }))
            .unwrap();

        let stats = journal.replay().unwrap();

        assert_eq!(stats.relinked, 1);
        assert!(dst.exists());
        assert_eq!(
            fs::metadata(&src).unwrap().ino(),
            fs::metadata(&dst).unwrap().ino()
        );
        assert!(journal.incomplete().is_empty());
    }

    #[test]
    fn test_replay_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let journal = journal_in(&dir);
        let payload = copy_payload(&dir, b"idempotent");

        fs::create_dir_all(payload.tmp.parent().unwrap()).unwrap();
        fs::write(&payload.tmp, b"idempotent").unwrap();
        journal.append_started(JournalOp::Copy(payload.clone())).unwrap();

        journal.replay().unwrap();
        let content_after_first = fs::read(&payload.dst).unwrap();

        // Replaying again must not disturb the recovered state
        let stats = journal.replay().unwrap();
        assert_eq!(stats, ReplayStats::default());
        assert_eq!(fs::read(&payload.dst).unwrap(), content_after_first);
        assert!(journal.incomplete().is_empty());
    }

    #[test]
    fn test_truncated_trailing_line_is_tolerated() {
        let dir = TempDir::new().unwrap();
        let journal = journal_in(&dir);

        let id = journal
            .append_started(JournalOp::Link(LinkPayload {
                src: dir.path().join("a"),
                dst: dir.path().join("b"),
            }))
            .unwrap();
        journal.append_completed(&id).unwrap();

        // Simulate a crash mid-append: a garbage partial line at the tail
        let mut raw = fs::read_to_string(journal.path()).unwrap();
        raw.push_str("{\"status\":\"started\",\"id\":\"dead");
        fs::write(journal.path(), raw).unwrap();

        assert!(journal.incomplete().is_empty());
        assert_eq!(journal.replay().unwrap(), ReplayStats::default());
    }

    #[test]
    fn test_replay_never_touches_live_dst() {
        let dir = TempDir::new().unwrap();
        let journal = journal_in(&dir);
        let payload = copy_payload(&dir, b"new-version");

        // dst already holds committed content; a stale started entry with
        // a corrupt tmp must only remove the tmp
        fs::create_dir_all(payload.dst.parent().unwrap()).unwrap();
        fs::write(&payload.dst, b"live-content").unwrap();
        fs::write(&payload.tmp, b"garbage").unwrap();
        journal.append_started(JournalOp::Copy(payload.clone())).unwrap();

        journal.replay().unwrap();

        assert_eq!(fs::read(&payload.dst).unwrap(), b"live-content");
        assert!(!payload.tmp.exists());
    }
}
