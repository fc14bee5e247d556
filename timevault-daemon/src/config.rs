//! Configuration management for the backup daemon.
//!
//! The configuration lives in an INI file owned by the external UI; the
//! engine only ever reads it. Sections: `DEVICE_INFO`, `BACKUP_FOLDERS`,
//! `EXCLUDE`, `EXCLUDE_FOLDER`, `BACKUP`.

use anyhow::Context;
use config::FileFormat;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Sleep between cycles unless overridden on the command line.
const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

/// Storage class of the backup device; caps the worker pool for spinning
/// media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskType {
    Ssd,
    Hdd,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Mount point of the backup device.
    pub device_path: PathBuf,

    pub disk_type: DiskType,

    /// Informational only, used in log output.
    pub device_name: Option<String>,

    /// Source roots to back up; an empty list makes every cycle a no-op.
    pub folders: Vec<PathBuf>,

    /// Exclude any path with a dot-prefixed segment relative to its root.
    pub exclude_hidden: bool,

    /// Absolute paths excluded together with all their descendants.
    pub exclude_folders: Vec<PathBuf>,

    /// Whether the supervised daemon should run at all; the engine itself
    /// runs whenever invoked.
    pub automatic: bool,

    /// Optional external summary generator, spawned fire-and-forget at the
    /// end of each cycle with the backup base directory as its argument.
    pub summary_command: Option<String>,

    pub interval: Duration,
}

impl Config {
    /// Load the daemon configuration from an INI file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.to_path_buf()).format(FileFormat::Ini))
            .build()
            .with_context(|| format!("could not read configuration at {}", path.display()))?;

        let device_path = settings
            .get_string("device_info.path")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .context("DEVICE_INFO.path is not configured")?;

        let disk_type = match settings.get_string("device_info.disk_type") {
            Ok(value) if value.trim().eq_ignore_ascii_case("hdd") => DiskType::Hdd,
            _ => DiskType::Ssd,
        };

        Ok(Self {
            device_path,
            disk_type,
            device_name: settings
                .get_string("device_info.name")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            folders: parse_folder_list(settings.get_string("backup_folders.folders").ok()),
            exclude_hidden: parse_bool(settings.get_string("exclude.exclude_hidden_itens").ok()),
            exclude_folders: parse_folder_list(settings.get_string("exclude_folder.folders").ok()),
            automatic: parse_bool(settings.get_string("backup.automatically_backup").ok()),
            summary_command: settings
                .get_string("backup.summary_command")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            interval: DEFAULT_INTERVAL,
        })
    }
}

fn parse_folder_list(raw: Option<String>) -> Vec<PathBuf> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .collect()
    })
    .unwrap_or_default()
}

fn parse_bool(raw: Option<String>) -> bool {
    matches!(
        raw.as_deref().map(str::trim),
        Some(v) if v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes") || v == "1"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("config.conf");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_full_config() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "[DEVICE_INFO]\n\
             path = /media/user/usb\n\
             disk_type = hdd\n\
             name = Backup Drive\n\
             [BACKUP_FOLDERS]\n\
             folders = /home/user/docs, /home/user/pics\n\
             [EXCLUDE]\n\
             exclude_hidden_itens = true\n\
             [EXCLUDE_FOLDER]\n\
             folders = /home/user/docs/tmp\n\
             [BACKUP]\n\
             automatically_backup = true\n",
        );

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.device_path, PathBuf::from("/media/user/usb"));
        assert_eq!(config.disk_type, DiskType::Hdd);
        assert_eq!(config.device_name.as_deref(), Some("Backup Drive"));
        assert_eq!(
            config.folders,
            vec![PathBuf::from("/home/user/docs"), PathBuf::from("/home/user/pics")]
        );
        assert!(config.exclude_hidden);
        assert_eq!(config.exclude_folders, vec![PathBuf::from("/home/user/docs/tmp")]);
        assert!(config.automatic);
        assert!(config.summary_command.is_none());
    }

    #[test]
    fn test_minimal_config_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[DEVICE_INFO]\npath = /mnt/backup\n");

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.disk_type, DiskType::Ssd);
        assert!(config.folders.is_empty());
        assert!(!config.exclude_hidden);
        assert!(config.exclude_folders.is_empty());
        assert!(!config.automatic);
        assert_eq!(config.interval, Duration::from_secs(300));
    }

    #[test]
    fn test_missing_device_path_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[BACKUP]\nautomatically_backup = false\n");
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn test_folder_list_parsing() {
        assert!(parse_folder_list(None).is_empty());
        assert!(parse_folder_list(Some(" , ,".into())).is_empty());
        assert_eq!(
            parse_folder_list(Some("/a, /b ,/c".into())),
            vec![PathBuf::from("/a"), PathBuf::from("/b"), PathBuf::from("/c")]
        );
    }
}
