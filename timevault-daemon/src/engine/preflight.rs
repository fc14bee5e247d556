//! Target reachability, writability and free-space checks.
//!
//! Runs before every cycle. A failing check blocks the scheduler, which
//! retries with a cadence derived from the error classification.

use crate::utils::errors::EngineError;
use crate::utils::paths::BackupLayout;
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

const PROBE_CONTENT: &[u8] = b"perm-check";

/// Free-space headroom demanded beyond the planned copy bytes.
pub const FREE_SPACE_HEADROOM: u64 = 5 * 1024 * 1024 * 1024;

/// Verify the backup device is mounted, the backup root is creatable and
/// the target accepts writes.
pub fn check_target(layout: &BackupLayout) -> Result<(), EngineError> {
    let base = layout.base_dir();
    let device_root = base.parent().unwrap_or(base);
    if !device_root.exists() {
        return Err(EngineError::TargetUnavailable(device_root.to_path_buf()));
    }

    fs::create_dir_all(layout.backups_dir()).map_err(|e| EngineError::classify_target(base, e))?;
    probe_writable(layout).map_err(|e| EngineError::classify_target(base, e))
}

/// Create, write, read back and delete a probe file under
/// `<backup_root>/.perm_test`, then try to remove the probe directory
/// (another daemon instance racing us there is tolerated).
fn probe_writable(layout: &BackupLayout) -> std::io::Result<()> {
    let probe_dir = layout.probe_dir();
    fs::create_dir_all(&probe_dir)?;

    let probe = probe_dir.join(format!(".perm_{}", std::process::id()));
    {
        let mut file = fs::File::create(&probe)?;
        file.write_all(PROBE_CONTENT)?;
    }

    let mut readback = Vec::new();
    fs::File::open(&probe)?.read_to_end(&mut readback)?;
    if readback != PROBE_CONTENT {
        return Err(std::io::Error::new(
            ErrorKind::InvalidData,
            "probe readback mismatch",
        ));
    }

    fs::remove_file(&probe)?;
    match fs::remove_dir(&probe_dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::DirectoryNotEmpty => Ok(()),
        Err(e) => Err(e),
    }
}

/// Available bytes on the filesystem holding `path`.
pub fn available_space(path: &Path) -> Result<u64, EngineError> {
    let stat = nix::sys::statvfs::statvfs(path).map_err(|e| {
        EngineError::classify_target(path, std::io::Error::from(e))
    })?;
    Ok(stat.blocks_available() as u64 * stat.fragment_size() as u64)
}

/// The planned copy bytes plus a fixed headroom must fit, or the cycle
/// aborts before any copy starts.
pub fn ensure_space(path: &Path, planned_bytes: u64) -> Result<(), EngineError> {
    let available = available_space(path)?;
    let needed = planned_bytes.saturating_add(FREE_SPACE_HEADROOM);
    if available < needed {
        return Err(EngineError::InsufficientSpace { needed, available });
    }
    Ok(())
}
