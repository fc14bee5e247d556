//! Work-plan construction: walk the source roots, apply exclusion rules,
//! and decide per file between fast-path skip, copy and hardlink.
//!
//! The scanner only reads; manifest updates it wants (mtime refreshes for
//! files whose content turned out unchanged) are returned to the caller.

use crate::daemon::cancel::CancelBus;
use crate::engine::dedup::DedupIndex;
use crate::engine::hasher;
use crate::engine::manifest::ManifestStore;
use crate::utils::paths;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use walkdir::WalkDir;

/// One file the copier has to act on this cycle.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub source: PathBuf,
    /// Stable key: `<source root basename>/<relative path>`, forward
    /// slashes, unique within a cycle.
    pub rel_path: String,
    pub size: u64,
    pub mtime_ns: i64,
    /// Lowercase hex SHA-256 of the source content.
    pub hash: String,
    /// Existing backup path holding identical content, if any.
    pub dedup_target: Option<PathBuf>,
    /// Absent from the manifest: routed to the main backup instead of the
    /// dated incremental tree.
    pub is_new: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ExcludeRules {
    /// Exclude any segment starting with `.`, relative to the walked root.
    pub hidden: bool,
    /// Absolute paths excluded together with their descendants.
    pub folders: Vec<PathBuf>,
}

impl ExcludeRules {
    /// Decides per directory entry; matching directories are pruned before
    /// descent, so a single-segment check covers the whole relative path.
    fn excludes(&self, entry_path: &Path, file_name: &str, depth: usize) -> bool {
        if self.hidden && depth > 0 && file_name.starts_with('.') {
            return true;
        }
        self.folders.iter().any(|f| entry_path.starts_with(f))
    }
}

/// Live scan counter for the analyzing heartbeat.
#[derive(Debug, Default)]
pub struct ScanProgress {
    pub files_seen: AtomicU64,
}

#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Smallest-first, so many workers fill up early in the cycle.
    pub items: Vec<WorkItem>,
    /// Bytes the copy path will actually move; hardlink items cost none.
    pub bytes_planned: u64,
    /// Manifest mtime refreshes to apply (same path, same content).
    pub mtime_refreshes: Vec<(String, i64)>,
    pub unchanged: u64,
    pub unreadable: u64,
    /// Manifest entries no longer present on the source. Counted for the
    /// log only; deletion policy is deferred.
    pub missing_from_source: u64,
}

/// Produce the work plan for one cycle. Never mutates the manifest.
pub fn scan(
    roots: &[PathBuf],
    rules: &ExcludeRules,
    manifest: &ManifestStore,
    dedup: &DedupIndex,
    cancel: &CancelBus,
    progress: &ScanProgress,
) -> ScanOutcome {
    let mut out = ScanOutcome::default();
    let mut seen: HashSet<String> = HashSet::new();

    for root in roots {
        if cancel.is_cancelled() {
            break;
        }
        if !root.is_dir() {
            tracing::warn!(root = %root.display(), "skipping missing or non-directory source root");
            continue;
        }
        scan_root(root, rules, manifest, dedup, cancel, progress, &mut seen, &mut out);
    }

    if !cancel.is_cancelled() && !roots.is_empty() {
        out.missing_from_source = manifest
            .snapshot()
            .keys()
            .filter(|k| !seen.contains(*k))
            .count() as u64;
        if out.missing_from_source > 0 {
            tracing::info!(
                count = out.missing_from_source,
                "manifest entries no longer present on source"
            );
        }
    }

    out.items.sort_by_key(|item| item.size);
    out
}

#[allow(clippy::too_many_arguments)]
fn scan_root(
    root: &Path,
    rules: &ExcludeRules,
    manifest: &ManifestStore,
    dedup: &DedupIndex,
    cancel: &CancelBus,
    progress: &ScanProgress,
    seen: &mut HashSet<String>,
    out: &mut ScanOutcome,
) {
    let walker = WalkDir::new(root).follow_links(false).into_iter();
    let filtered = walker.filter_entry(|entry| {
        let name = entry.file_name().to_string_lossy();
        !rules.excludes(entry.path(), &name, entry.depth())
    });

    for entry in filtered {
        if cancel.is_cancelled() {
            return;
        }

        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                out.unreadable += 1;
                tracing::warn!(error = %e, "unreadable entry skipped");
                continue;
            }
        };
        // Regular files only; symlinks are neither followed nor backed up
        if !entry.file_type().is_file() {
            continue;
        }
        progress.files_seen.fetch_add(1, Ordering::Relaxed);

        let Some(rel_path) = paths::rel_path_for(root, entry.path()) else {
            tracing::warn!(path = %entry.path().display(), "path not representable, skipped");
            continue;
        };

        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                // Vanished or unreadable mid-scan
                out.unreadable += 1;
                tracing::warn!(path = %entry.path().display(), error = %e, "stat failed, skipped");
                continue;
            }
        };
        let size = meta.len();
        let mtime_ns = mtime_ns(&meta);
        seen.insert(rel_path.clone());

        let known = manifest.get(&rel_path);
        if let Some(prev) = &known {
            if mtime_ns <= prev.mtime_ns {
                // Fast path: untouched since the last commit, not even hashed
                out.unchanged += 1;
                continue;
            }
        }

        let hash = match hasher::hash_file(entry.path()) {
            Ok(h) => h,
            Err(e) => {
                out.unreadable += 1;
                tracing::warn!(path = %entry.path().display(), error = %e, "hash failed, file skipped this cycle");
                continue;
            }
        };

        if let Some(prev) = &known {
            if prev.hash == hash {
                // mtime moved but content did not; just refresh the record
                out.mtime_refreshes.push((rel_path, mtime_ns));
                out.unchanged += 1;
                continue;
            }
        }

        let dedup_target = dedup.lookup(&hash);
        if dedup_target.is_none() {
            out.bytes_planned += size;
        }

        out.items.push(WorkItem {
            source: entry.path().to_path_buf(),
            rel_path,
            size,
            mtime_ns,
            hash,
            dedup_target,
            is_new: known.is_none(),
        });
    }
}

pub fn mtime_ns(meta: &std::fs::Metadata) -> i64 {
    use std::os::unix::fs::MetadataExt;
    meta.mtime() * 1_000_000_000 + meta.mtime_nsec()
}
