//! Hardlink-or-atomic-copy commit pipeline, journaled end to end.
//!
//! Every mutation is bracketed by journal records, and copies land through
//! a unique temp file followed by an atomic rename. A crash at any point
//! leaves either nothing or a temp file the replay can reconcile; a
//! destination is never partially written.

use crate::engine::cycle::Engine;
use crate::engine::journal::{CopyPayload, JournalOp, LinkPayload};
use crate::engine::manifest::ManifestEntry;
use crate::engine::scanner::WorkItem;
use crate::utils::errors::EngineError;
use crate::utils::paths::CycleStamp;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

/// Streamed copy granularity; the cancel flag is checked between chunks.
const COPY_CHUNK_SIZE: usize = 256 * 1024;

/// How a successful commit landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    Copied { bytes: u64 },
    Linked,
}

/// Install one work item on the backup target. New files go to the main
/// backup, modified files to the dated incremental tree; identical content
/// already on the device becomes a hardlink.
pub async fn commit(
    engine: &Arc<Engine>,
    item: &WorkItem,
    stamp: &CycleStamp,
) -> Result<Commit, EngineError> {
    if engine.cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }

    let dst = if item.is_new {
        engine.layout.main_dst(&item.rel_path)
    } else {
        engine.layout.incremental_dst(stamp, &item.rel_path)
    };

    if let Some(target) = &item.dedup_target {
        if commit_hardlink(engine, item, target, &dst)? {
            record_success(engine, item, &dst).await;
            return Ok(Commit::Linked);
        }
        // Cross-device, permissions, a directory in the way: copy instead.
        // The open link journal entry is closed by the next replay once
        // the destination exists.
        tracing::debug!(rel_path = %item.rel_path, "hardlink failed, falling back to copy");
    }

    let bytes = atomic_copy(engine, item, &dst).await?;
    record_success(engine, item, &dst).await;
    engine.dedup.insert(&item.hash, dst.clone());
    Ok(Commit::Copied { bytes })
}

/// Returns Ok(true) when the destination now shares the target's inode,
/// Ok(false) to fall through to the copy path.
fn commit_hardlink(
    engine: &Arc<Engine>,
    item: &WorkItem,
    target: &Path,
    dst: &Path,
) -> Result<bool, EngineError> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent).map_err(|e| EngineError::classify_target(parent, e))?;
    }

    let id = engine.journal.append_started(JournalOp::Link(LinkPayload {
        src: target.to_path_buf(),
        dst: dst.to_path_buf(),
    }))?;

    let linked = match std::fs::hard_link(target, dst) {
        Ok(()) => true,
        // Racing a previous partially-finished cycle: an existing regular
        // file at dst is exactly what we wanted
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dst.is_file() => true,
        Err(e) => {
            tracing::debug!(
                target = %target.display(),
                dst = %dst.display(),
                error = %e,
                "hard_link attempt failed"
            );
            false
        }
    };

    if linked {
        copy_file_attributes(&item.source, dst);
        engine.journal.append_completed(&id)?;
    }
    Ok(linked)
}

async fn atomic_copy(
    engine: &Arc<Engine>,
    item: &WorkItem,
    dst: &Path,
) -> Result<u64, EngineError> {
    if let Some(parent) = dst.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| EngineError::classify_target(parent, e))?;
    }
    // The canonical target is a file; a directory in its place goes away
    if dst.is_dir() {
        tokio::fs::remove_dir_all(dst)
            .await
            .map_err(|e| EngineError::classify_target(dst, e))?;
    }
    clean_stale_tmp(dst);

    let tmp = tmp_path_for(dst);
    let id = engine.journal.append_started(JournalOp::Copy(CopyPayload {
        src: item.source.clone(),
        dst: dst.to_path_buf(),
        tmp: tmp.clone(),
        hash: item.hash.clone(),
        size: item.size,
    }))?;

    let bytes = match stream_copy(engine, &item.source, &tmp).await {
        Ok(bytes) => bytes,
        // Immediate cancel and mid-copy I/O failures both leave the temp
        // file and the open journal entry for replay to reconcile
        Err(CopyFailure::Cancelled) => return Err(EngineError::Cancelled),
        Err(CopyFailure::Io(e)) => return Err(EngineError::classify_copy(&item.source, dst, e)),
    };

    copy_file_attributes(&item.source, &tmp);

    if dst.is_dir() {
        let _ = tokio::fs::remove_dir_all(dst).await;
    }
    tokio::fs::rename(&tmp, dst).await.map_err(|e| EngineError::Rename {
        path: dst.to_path_buf(),
        source: e,
    })?;
    sync_parent_dir(dst);

    engine.journal.append_completed(&id)?;
    Ok(bytes)
}

enum CopyFailure {
    Cancelled,
    Io(io::Error),
}

/// Chunked source → temp copy, fsynced before returning.
async fn stream_copy(engine: &Arc<Engine>, src: &Path, tmp: &Path) -> Result<u64, CopyFailure> {
    let mut reader = tokio::fs::File::open(src).await.map_err(CopyFailure::Io)?;
    let mut writer = tokio::fs::File::create(tmp).await.map_err(CopyFailure::Io)?;

    let mut buf = vec![0u8; COPY_CHUNK_SIZE];
    let mut copied = 0u64;
    loop {
        if engine.cancel.is_immediate() {
            return Err(CopyFailure::Cancelled);
        }
        let n = reader.read(&mut buf).await.map_err(CopyFailure::Io)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await.map_err(CopyFailure::Io)?;
        copied += n as u64;
    }

    writer.sync_all().await.map_err(CopyFailure::Io)?;
    Ok(copied)
}

async fn record_success(engine: &Arc<Engine>, item: &WorkItem, dst: &Path) {
    let flush_due = engine.manifest.upsert(
        &item.rel_path,
        ManifestEntry {
            dst_path: dst.to_path_buf(),
            mtime_ns: item.mtime_ns,
            size: item.size,
            hash: item.hash.clone(),
        },
    );
    if flush_due {
        engine.flush_manifest().await;
    }
}

/// Best-effort copy of permission bits and mtime onto `path`.
fn copy_file_attributes(src: &Path, path: &Path) {
    let meta = match std::fs::metadata(src) {
        Ok(m) => m,
        Err(e) => {
            tracing::debug!(src = %src.display(), error = %e, "could not stat source for attributes");
            return;
        }
    };

    if let Err(e) = std::fs::set_permissions(path, meta.permissions()) {
        tracing::debug!(path = %path.display(), error = %e, "could not copy permissions");
    }
    let mtime = filetime::FileTime::from_last_modification_time(&meta);
    if let Err(e) = filetime::set_file_mtime(path, mtime) {
        tracing::debug!(path = %path.display(), error = %e, "could not copy mtime");
    }
}

/// Remove leftover `<name>.tmp_*` debris from interrupted runs. Replay has
/// already run by the time a cycle copies, so anything still here is
/// unreferenced.
fn clean_stale_tmp(dst: &Path) {
    let (Some(parent), Some(name)) = (dst.parent(), dst.file_name().and_then(|n| n.to_str()))
    else {
        return;
    };
    let prefix = format!("{name}.tmp_");
    let Ok(dir) = std::fs::read_dir(parent) else {
        return;
    };
    for entry in dir.flatten() {
        let entry_name = entry.file_name();
        if entry_name.to_str().is_some_and(|n| n.starts_with(&prefix)) {
            tracing::debug!(tmp = %entry.path().display(), "removing stale temp file");
            let _ = std::fs::remove_file(entry.path());
        }
    }
}

/// Unique sibling temp path: `<dst>.tmp_<pid>_<uuid>`.
fn tmp_path_for(dst: &Path) -> PathBuf {
    let mut os = dst.as_os_str().to_os_string();
    os.push(format!(".tmp_{}_{}", std::process::id(), Uuid::new_v4().simple()));
    PathBuf::from(os)
}

/// POSIX needs a directory fsync for the rename to be durable.
fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = std::fs::File::open(parent) {
            if let Err(e) = dir.sync_all() {
                tracing::debug!(error = %e, "parent directory fsync failed");
            }
        }
    }
}
