//! Engine context and the per-cycle state machine.
//!
//! A cycle runs Preflight → Planning → Running → Finalizing, then the
//! scheduler sleeps until the next one. Any state reacts to the cancel
//! bus; preflight failures block with a classified backoff instead of
//! failing the daemon.

use crate::config::Config;
use crate::daemon::cancel::CancelBus;
use crate::engine::copier::{self, Commit};
use crate::engine::dedup::DedupIndex;
use crate::engine::journal::Journal;
use crate::engine::manifest::ManifestStore;
use crate::engine::preflight;
use crate::engine::scanner::{self, ExcludeRules, ScanOutcome, ScanProgress};
use crate::engine::workers;
use crate::ipc::sender::EventSender;
use crate::ipc::{BackupStatus, UiEvent};
use crate::utils::errors::EngineError;
use crate::utils::paths::{BackupLayout, CycleStamp};
use crate::utils::progress::{format_bytes, RunCounters};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Shared engine context, passed to workers by `Arc`.
pub struct Engine {
    pub config: Config,
    pub layout: BackupLayout,
    pub manifest: ManifestStore,
    pub dedup: DedupIndex,
    pub journal: Journal,
    pub cancel: CancelBus,
    pub events: EventSender,
    pub counters: RunCounters,
}

impl Engine {
    pub fn new(config: Config, events: EventSender) -> Self {
        let layout = BackupLayout::new(&config.device_path);
        let manifest = ManifestStore::load(layout.manifest_path());
        let journal = Journal::new(layout.journal_path());
        Self {
            config,
            layout,
            manifest,
            dedup: DedupIndex::default(),
            journal,
            cancel: CancelBus::new(),
            events,
            counters: RunCounters::default(),
        }
    }

    /// Journal replay plus a manifest flush; used at startup and after a
    /// suspend gap is detected.
    pub async fn replay_and_flush(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        let replayed = tokio::task::spawn_blocking(move || {
            let stats = engine.journal.replay()?;
            engine.manifest.save()?;
            Ok::<_, EngineError>(stats)
        })
        .await;

        match replayed {
            Ok(Ok(stats)) => tracing::info!(
                recovered = stats.recovered,
                discarded = stats.discarded,
                relinked = stats.relinked,
                acknowledged = stats.acknowledged,
                "journal replay complete"
            ),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "journal replay failed");
                self.events
                    .send(UiEvent::warning(format!("Backup recovery failed: {e}")))
                    .await;
            }
            Err(e) => tracing::error!(error = %e, "journal replay task failed"),
        }
    }

    /// Persist the manifest off the async path. Failures keep the previous
    /// manifest intact and surface a warning; they never stop the cycle.
    pub async fn flush_manifest(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        match tokio::task::spawn_blocking(move || engine.manifest.save()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "manifest flush failed");
                self.events
                    .send(UiEvent::warning(format!(
                        "Could not persist backup manifest: {e}"
                    )))
                    .await;
            }
            Err(e) => tracing::error!(error = %e, "manifest flush task failed"),
        }
    }
}

/// What one cycle did.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub planned_files: usize,
    pub planned_bytes: u64,
    pub copied_files: usize,
    pub copied_bytes: u64,
    pub linked_files: usize,
    pub failed_files: usize,
    pub aborted: Option<String>,
    pub cancelled: bool,
}

enum ItemResult {
    Copied(u64),
    Linked,
    Failed,
    Fatal(String),
    Cancelled,
}

/// Drives the cycle loop until shutdown.
pub struct Scheduler {
    engine: Arc<Engine>,
    shutdown: CancellationToken,
    workers: usize,
}

impl Scheduler {
    pub fn new(engine: Arc<Engine>, shutdown: CancellationToken) -> Self {
        Self {
            engine,
            shutdown,
            workers: workers::INITIAL_WORKERS,
        }
    }

    pub async fn run(mut self) {
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            self.engine.cancel.reset();

            if !self.wait_for_target().await {
                break;
            }

            let report = self.run_cycle().await;
            tracing::info!(
                planned = report.planned_files,
                copied = report.copied_files,
                linked = report.linked_files,
                failed = report.failed_files,
                bytes = report.copied_bytes,
                cancelled = report.cancelled,
                aborted = report.aborted.as_deref().unwrap_or(""),
                "cycle finished"
            );

            if self.shutdown.is_cancelled() {
                break;
            }

            // A cancel only ever applies to the cycle it interrupted
            self.engine.cancel.reset();

            // Sleeping; a manual cancel just wakes the sleeper early
            tokio::select! {
                _ = tokio::time::sleep(self.engine.config.interval) => {}
                _ = self.shutdown.cancelled() => break,
                _ = self.engine.cancel.cancelled() => {}
            }
        }

        // Leave nothing volatile behind on the way out
        self.engine.flush_manifest().await;
        if let Err(e) = self.engine.journal.sync() {
            tracing::warn!(error = %e, "final journal sync failed");
        }
    }

    /// Run exactly one preflight + cycle; used by `--once`.
    pub async fn run_once(mut self) -> CycleReport {
        self.engine.cancel.reset();
        if !self.wait_for_target().await {
            return CycleReport::default();
        }
        let report = self.run_cycle().await;
        self.engine.flush_manifest().await;
        if let Err(e) = self.engine.journal.sync() {
            tracing::warn!(error = %e, "final journal sync failed");
        }
        report
    }

    /// Blocked state: retry preflight with a classified backoff until the
    /// target is usable. Returns false when shutdown fired.
    async fn wait_for_target(&self) -> bool {
        loop {
            let engine = Arc::clone(&self.engine);
            let checked =
                tokio::task::spawn_blocking(move || preflight::check_target(&engine.layout)).await;

            let err = match checked {
                Ok(Ok(())) => return true,
                Ok(Err(e)) => e,
                Err(e) => {
                    tracing::error!(error = %e, "preflight task failed");
                    EngineError::TargetUnavailable(self.engine.layout.base_dir().to_path_buf())
                }
            };

            // Read-only mounts retry slower than plain disconnects
            let backoff = match &err {
                EngineError::TargetReadOnly(_) => Duration::from_secs(60),
                _ => Duration::from_secs(30),
            };
            tracing::warn!(error = %err, backoff_secs = backoff.as_secs(), "preflight failed");
            self.engine.events.send(UiEvent::warning(err.to_string())).await;

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = self.shutdown.cancelled() => return false,
                _ = self.engine.cancel.cancelled() => {
                    // Cancelling → Idle → straight back into Preflight
                    self.engine.cancel.reset();
                }
            }
        }
    }

    async fn run_cycle(&mut self) -> CycleReport {
        let engine = Arc::clone(&self.engine);
        let mut report = CycleReport::default();
        let stamp = CycleStamp::now();

        // ---- Planning -------------------------------------------------
        engine
            .events
            .send(UiEvent::analyzing("Analyzing files".to_string(), 0))
            .await;

        let roots = engine.config.folders.clone();
        if roots.is_empty() {
            tracing::info!("no backup folders configured, nothing to do");
            self.finalize(&report).await;
            return report;
        }

        let snapshot = engine.manifest.snapshot();
        engine.dedup.rebuild(snapshot.values());
        drop(snapshot);

        let outcome = self.scan_with_heartbeat(roots).await;
        for (rel_path, mtime_ns) in &outcome.mtime_refreshes {
            engine.manifest.touch_mtime(rel_path, *mtime_ns);
        }

        report.planned_files = outcome.items.len();
        report.planned_bytes = outcome.bytes_planned;
        engine
            .counters
            .start_run(report.planned_files, report.planned_bytes);

        if engine.cancel.is_cancelled() {
            report.cancelled = true;
            self.finalize(&report).await;
            return report;
        }
        if outcome.items.is_empty() {
            tracing::info!(
                unchanged = outcome.unchanged,
                unreadable = outcome.unreadable,
                "nothing to back up"
            );
            self.finalize(&report).await;
            return report;
        }

        // ---- Running --------------------------------------------------
        if let Err(e) = preflight::ensure_space(engine.layout.base_dir(), outcome.bytes_planned) {
            tracing::warn!(error = %e, "cycle aborted before dispatch");
            engine.events.send(UiEvent::warning(e.to_string())).await;
            report.aborted = Some(e.to_string());
            self.finalize(&report).await;
            return report;
        }

        self.workers = workers::effective_workers(engine.config.disk_type, self.workers).await;
        tracing::info!(
            workers = self.workers,
            files = report.planned_files,
            bytes = report.planned_bytes,
            "dispatching work plan"
        );

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let abort = CancellationToken::new();
        let active: Arc<Mutex<HashMap<usize, String>>> = Arc::new(Mutex::new(HashMap::new()));

        let progress_stop = CancellationToken::new();
        let progress_task = tokio::spawn(broadcast_progress(
            Arc::clone(&engine),
            Arc::clone(&active),
            progress_stop.clone(),
        ));

        let mut handles = Vec::with_capacity(outcome.items.len());
        for (idx, item) in outcome.items.into_iter().enumerate() {
            let engine = Arc::clone(&engine);
            let semaphore = Arc::clone(&semaphore);
            let abort = abort.clone();
            let active = Arc::clone(&active);
            let stamp = stamp.clone();

            handles.push(tokio::spawn(async move {
                // Admission: an aborted or cancelled cycle starts nothing new
                let permit = tokio::select! {
                    acquired = semaphore.acquire_owned() => match acquired {
                        Ok(permit) => permit,
                        Err(_) => return ItemResult::Cancelled,
                    },
                    _ = abort.cancelled() => return ItemResult::Cancelled,
                    _ = engine.cancel.cancelled() => return ItemResult::Cancelled,
                };
                if engine.cancel.is_cancelled() || abort.is_cancelled() {
                    return ItemResult::Cancelled;
                }

                active
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(idx, item.rel_path.clone());

                let result = copier::commit(&engine, &item, &stamp).await;

                active
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&idx);
                drop(permit);

                match result {
                    Ok(Commit::Copied { bytes }) => {
                        engine.counters.add_done(bytes);
                        engine
                            .events
                            .send(UiEvent::file_activity(
                                "File backed up",
                                item.rel_path.clone(),
                                format_bytes(bytes),
                            ))
                            .await;
                        ItemResult::Copied(bytes)
                    }
                    Ok(Commit::Linked) => {
                        engine.counters.add_done(0);
                        engine
                            .events
                            .send(UiEvent::file_activity(
                                "File hardlinked",
                                item.rel_path.clone(),
                                format_bytes(0),
                            ))
                            .await;
                        ItemResult::Linked
                    }
                    Err(EngineError::Cancelled) => ItemResult::Cancelled,
                    Err(e) => {
                        engine.counters.add_failed();
                        tracing::warn!(rel_path = %item.rel_path, error = %e, "file backup failed");
                        engine
                            .events
                            .send(UiEvent::warning(format!(
                                "Failed to back up {}: {e}",
                                item.rel_path
                            )))
                            .await;
                        if e.is_cycle_fatal() {
                            abort.cancel();
                            ItemResult::Fatal(e.to_string())
                        } else {
                            ItemResult::Failed
                        }
                    }
                }
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(ItemResult::Copied(bytes)) => {
                    report.copied_files += 1;
                    report.copied_bytes += bytes;
                }
                Ok(ItemResult::Linked) => report.linked_files += 1,
                Ok(ItemResult::Failed) => report.failed_files += 1,
                Ok(ItemResult::Fatal(reason)) => {
                    report.failed_files += 1;
                    report.aborted.get_or_insert(reason);
                }
                Ok(ItemResult::Cancelled) => {}
                Err(e) => {
                    if !e.is_cancelled() {
                        // A panicking worker is contained and logged as a
                        // copy failure; siblings are unaffected
                        tracing::error!(error = %e, "worker task panicked");
                        engine.counters.add_failed();
                        report.failed_files += 1;
                    }
                }
            }
        }
        report.cancelled = engine.cancel.is_cancelled();

        progress_stop.cancel();
        let _ = progress_task.await;

        // ---- Finalizing -----------------------------------------------
        self.finalize(&report).await;
        report
    }

    /// Scan in a blocking task while emitting an analyzing heartbeat.
    async fn scan_with_heartbeat(&self, roots: Vec<std::path::PathBuf>) -> ScanOutcome {
        let engine = Arc::clone(&self.engine);
        let progress = Arc::new(ScanProgress::default());

        let scan_progress = Arc::clone(&progress);
        let scan_engine = Arc::clone(&engine);
        let rules = ExcludeRules {
            hidden: engine.config.exclude_hidden,
            folders: engine.config.exclude_folders.clone(),
        };
        let mut scan_task = tokio::task::spawn_blocking(move || {
            scanner::scan(
                &roots,
                &rules,
                &scan_engine.manifest,
                &scan_engine.dedup,
                &scan_engine.cancel,
                &scan_progress,
            )
        });

        loop {
            tokio::select! {
                finished = &mut scan_task => {
                    return finished.unwrap_or_else(|e| {
                        tracing::error!(error = %e, "scan task failed");
                        ScanOutcome::default()
                    });
                }
                _ = tokio::time::sleep(Duration::from_secs(1)) => {
                    let seen = progress.files_seen.load(std::sync::atomic::Ordering::Relaxed);
                    engine
                        .events
                        .send(UiEvent::analyzing(format!("Analyzing files ({seen} scanned)"), seen))
                        .await;
                }
            }
        }
    }

    async fn finalize(&self, report: &CycleReport) {
        let engine = &self.engine;
        engine.flush_manifest().await;
        if let Err(e) = engine.journal.sync() {
            tracing::warn!(error = %e, "journal sync failed");
            engine
                .events
                .send(UiEvent::warning(format!("Backup journal not durable: {e}")))
                .await;
        }

        let status = if report.aborted.is_some() {
            BackupStatus::Failed
        } else {
            BackupStatus::Completed
        };
        let snapshot = engine.counters.snapshot();
        engine
            .events
            .send(UiEvent::progress(status, &snapshot, None))
            .await;

        self.spawn_summary();
    }

    /// Fire-and-forget external summary generator.
    fn spawn_summary(&self) {
        let Some(command) = self.engine.config.summary_command.clone() else {
            return;
        };
        let base_dir = self.engine.layout.base_dir().to_path_buf();
        match tokio::process::Command::new(&command).arg(&base_dir).spawn() {
            Ok(_) => tracing::debug!(command = %command, "summary generator spawned"),
            Err(e) => {
                tracing::warn!(command = %command, error = %e, "could not spawn summary generator")
            }
        }
    }
}

/// Once a second, tell the UI where the run stands.
async fn broadcast_progress(
    engine: Arc<Engine>,
    active: Arc<Mutex<HashMap<usize, String>>>,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            _ = stop.cancelled() => return,
        }

        let snapshot = engine.counters.snapshot();
        let current_file = active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .next()
            .cloned();
        engine
            .events
            .send(UiEvent::progress(BackupStatus::Running, &snapshot, current_file))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiskType;
    use crate::engine::hasher;
    use std::fs;
    use std::os::unix::fs::MetadataExt;
    use std::path::Path;
    use tempfile::TempDir;

    const HELLO_HASH: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn test_engine(dir: &TempDir, folders: Vec<std::path::PathBuf>) -> Arc<Engine> {
        let config = Config {
            device_path: dir.path().join("device"),
            // HDD skips the one-second CPU sample, keeping tests fast
            disk_type: DiskType::Hdd,
            device_name: None,
            folders,
            exclude_hidden: false,
            exclude_folders: vec![],
            automatic: false,
            summary_command: None,
            interval: Duration::from_secs(1),
        };
        fs::create_dir_all(dir.path().join("device")).unwrap();
        let events = EventSender::new(dir.path().join("no-ui.sock"));
        Arc::new(Engine::new(config, events))
    }

    fn scheduler_for(engine: &Arc<Engine>) -> Scheduler {
        Scheduler::new(Arc::clone(engine), CancellationToken::new())
    }

    fn bump_mtime(path: &Path, seconds_forward: i64) {
        let meta = fs::metadata(path).unwrap();
        let new = filetime::FileTime::from_unix_time(meta.mtime() + seconds_forward, 0);
        filetime::set_file_mtime(path, new).unwrap();
    }

    #[tokio::test]
    async fn test_initial_backup_lands_in_main_backup() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("home");
        fs::create_dir_all(&home).unwrap();
        fs::write(home.join("notes.txt"), b"hello").unwrap();

        let engine = test_engine(&dir, vec![home]);
        let mut scheduler = scheduler_for(&engine);
        let report = scheduler.run_cycle().await;

        assert_eq!(report.planned_files, 1);
        assert_eq!(report.copied_files, 1);
        assert_eq!(report.copied_bytes, 5);
        assert!(report.aborted.is_none());

        let dst = engine.layout.main_dst("home/notes.txt");
        assert_eq!(fs::read(&dst).unwrap(), b"hello");

        let entry = engine.manifest.get("home/notes.txt").unwrap();
        assert_eq!(entry.size, 5);
        assert_eq!(entry.hash, HELLO_HASH);
        assert_eq!(entry.dst_path, dst);

        // No incremental directory for a first-time file
        let dated: Vec<_> = fs::read_dir(engine.layout.backups_dir())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name() != ".main_backup")
            .collect();
        assert!(dated.is_empty());

        // The manifest survived finalization
        assert!(engine.layout.manifest_path().exists());
        assert!(engine.journal.incomplete().is_empty());
    }

    #[tokio::test]
    async fn test_unchanged_second_cycle_copies_nothing() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("home");
        fs::create_dir_all(&home).unwrap();
        fs::write(home.join("notes.txt"), b"hello").unwrap();

        let engine = test_engine(&dir, vec![home]);
        let mut scheduler = scheduler_for(&engine);
        scheduler.run_cycle().await;
        let manifest_before = engine.manifest.snapshot();

        let report = scheduler.run_cycle().await;

        assert_eq!(report.planned_files, 0);
        assert_eq!(report.copied_files, 0);
        assert_eq!(report.linked_files, 0);
        assert_eq!(engine.counters.snapshot().bytes_done, 0);
        assert_eq!(engine.manifest.snapshot(), manifest_before);
    }

    #[tokio::test]
    async fn test_modification_creates_incremental_version() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("home");
        fs::create_dir_all(&home).unwrap();
        let source = home.join("notes.txt");
        fs::write(&source, b"hello").unwrap();

        let engine = test_engine(&dir, vec![home]);
        let mut scheduler = scheduler_for(&engine);
        scheduler.run_cycle().await;

        fs::write(&source, b"hello world").unwrap();
        bump_mtime(&source, 10);
        let report = scheduler.run_cycle().await;

        assert_eq!(report.copied_files, 1);
        assert_eq!(report.copied_bytes, 11);

        // The canonical copy is untouched; the new content is versioned
        let main_dst = engine.layout.main_dst("home/notes.txt");
        assert_eq!(fs::read(&main_dst).unwrap(), b"hello");

        let entry = engine.manifest.get("home/notes.txt").unwrap();
        assert_ne!(entry.dst_path, main_dst);
        assert_eq!(fs::read(&entry.dst_path).unwrap(), b"hello world");
        assert_eq!(entry.hash, hasher::hash_file(&source).unwrap());
        assert!(entry.dst_path.starts_with(engine.layout.backups_dir()));
    }

    #[tokio::test]
    async fn test_move_becomes_hardlink() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("home");
        fs::create_dir_all(&home).unwrap();
        fs::write(home.join("notes.txt"), b"hello").unwrap();

        let engine = test_engine(&dir, vec![home.clone()]);
        let mut scheduler = scheduler_for(&engine);
        scheduler.run_cycle().await;
        let canonical_before = engine.dedup.lookup(HELLO_HASH).unwrap();

        fs::rename(home.join("notes.txt"), home.join("memo.txt")).unwrap();
        let report = scheduler.run_cycle().await;

        assert_eq!(report.linked_files, 1);
        assert_eq!(report.copied_files, 0);
        assert_eq!(engine.counters.snapshot().bytes_done, 0);

        let old_dst = engine.layout.main_dst("home/notes.txt");
        let new_dst = engine.layout.main_dst("home/memo.txt");
        assert_eq!(
            fs::metadata(&old_dst).unwrap().ino(),
            fs::metadata(&new_dst).unwrap().ino()
        );
        // The canonical mapping still points at the original object
        assert_eq!(engine.dedup.lookup(HELLO_HASH).unwrap(), canonical_before);
    }

    #[tokio::test]
    async fn test_empty_folder_list_is_a_noop_cycle() {
        let dir = TempDir::new().unwrap();
        let engine = test_engine(&dir, vec![]);
        let mut scheduler = scheduler_for(&engine);

        let report = scheduler.run_cycle().await;
        assert_eq!(report.planned_files, 0);
        assert!(report.aborted.is_none());
    }

    #[tokio::test]
    async fn test_graceful_cancel_before_dispatch_skips_everything() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("home");
        fs::create_dir_all(&home).unwrap();
        fs::write(home.join("notes.txt"), b"hello").unwrap();

        let engine = test_engine(&dir, vec![home]);
        engine.cancel.raise(crate::daemon::cancel::CancelMode::Graceful);

        let mut scheduler = scheduler_for(&engine);
        let report = scheduler.run_cycle().await;

        assert!(report.cancelled);
        assert_eq!(report.copied_files, 0);
        assert!(!engine.layout.main_dst("home/notes.txt").exists());
    }

    #[tokio::test]
    async fn test_per_file_failure_does_not_stop_siblings() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("home");
        fs::create_dir_all(home.join("sub")).unwrap();
        fs::write(home.join("good.txt"), b"fine").unwrap();
        fs::write(home.join("sub/bad.txt"), b"blocked").unwrap();

        let engine = test_engine(&dir, vec![home.clone()]);

        // A regular file squatting where bad.txt's destination directory
        // belongs makes that one item fail while its sibling proceeds
        let blocked_parent = engine.layout.main_dst("home/sub");
        fs::create_dir_all(blocked_parent.parent().unwrap()).unwrap();
        fs::write(&blocked_parent, b"not a directory").unwrap();

        let mut scheduler = scheduler_for(&engine);
        let report = scheduler.run_cycle().await;

        assert_eq!(report.copied_files, 1);
        assert_eq!(report.failed_files, 1);
        assert!(report.aborted.is_none());
        assert!(engine.layout.main_dst("home/good.txt").exists());
        assert!(engine.manifest.get("home/sub/bad.txt").is_none());
    }

    #[tokio::test]
    async fn test_mtime_refresh_applied_after_scan() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("home");
        fs::create_dir_all(&home).unwrap();
        let source = home.join("notes.txt");
        fs::write(&source, b"hello").unwrap();

        let engine = test_engine(&dir, vec![home]);
        let mut scheduler = scheduler_for(&engine);
        scheduler.run_cycle().await;
        let recorded = engine.manifest.get("home/notes.txt").unwrap();

        // Touch without changing content
        bump_mtime(&source, 10);
        let report = scheduler.run_cycle().await;

        assert_eq!(report.planned_files, 0);
        let refreshed = engine.manifest.get("home/notes.txt").unwrap();
        assert!(refreshed.mtime_ns > recorded.mtime_ns);
        assert_eq!(refreshed.hash, recorded.hash);
        assert_eq!(refreshed.dst_path, recorded.dst_path);
    }
}
