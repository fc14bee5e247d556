//! Local IPC: progress/event broadcasting and the control channel.
//!
//! Both sockets are UNIX streams under the runtime directory. The engine
//! connects to the event socket per event (the UI owns the listener) and
//! listens on the control socket for cancel commands.

pub mod control;
pub mod sender;

use crate::utils::progress::ProgressSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupStatus {
    Running,
    Completed,
    Failed,
}

/// Events the engine emits to the UI, one JSON object per line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    /// Scan-phase heartbeat.
    Analyzing {
        description: String,
        processed: u64,
        timestamp: DateTime<Utc>,
    },

    /// Copy-phase progress; also ends a cycle with a completed/failed
    /// status.
    BackupProgress {
        /// Fraction complete in `[0, 1]`.
        progress: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        current_file: Option<String>,
        files_completed: usize,
        total_files: usize,
        bytes_processed: u64,
        total_bytes: u64,
        eta: String,
        status: BackupStatus,
        timestamp: DateTime<Utc>,
    },

    /// One finished file, for the UI activity feed.
    FileActivity {
        title: String,
        description: String,
        size: String,
        status: String,
        timestamp: DateTime<Utc>,
    },

    /// A recoverable problem worth the user's attention.
    Warning {
        description: String,
        timestamp: DateTime<Utc>,
    },
}

impl UiEvent {
    pub fn analyzing(description: String, processed: u64) -> Self {
        UiEvent::Analyzing {
            description,
            processed,
            timestamp: Utc::now(),
        }
    }

    pub fn progress(
        status: BackupStatus,
        snapshot: &ProgressSnapshot,
        current_file: Option<String>,
    ) -> Self {
        UiEvent::BackupProgress {
            progress: snapshot.progress(),
            current_file,
            files_completed: snapshot.files_done,
            total_files: snapshot.files_planned,
            bytes_processed: snapshot.bytes_done,
            total_bytes: snapshot.bytes_planned,
            eta: snapshot.eta(),
            status,
            timestamp: Utc::now(),
        }
    }

    pub fn file_activity(title: &str, description: String, size: String) -> Self {
        UiEvent::FileActivity {
            title: title.to_string(),
            description,
            size,
            status: "completed".to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn warning(description: String) -> Self {
        UiEvent::Warning {
            description,
            timestamp: Utc::now(),
        }
    }
}
