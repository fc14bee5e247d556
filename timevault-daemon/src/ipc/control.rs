//! Control socket: newline-terminated JSON commands from the UI.
//!
//! The only required command is cancel:
//! `{"command":"cancel","mode":"graceful"|"immediate"}`. Unknown fields
//! are ignored, anything else answers `unknown_command`.

use crate::daemon::cancel::{CancelBus, CancelMode};
use serde::Deserialize;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Deserialize)]
struct ControlRequest {
    command: String,
    #[serde(default)]
    mode: Option<String>,
}

pub struct ControlListener {
    socket_path: PathBuf,
    cancel: CancelBus,
    shutdown: CancellationToken,
}

impl ControlListener {
    pub fn new(socket_path: PathBuf, cancel: CancelBus, shutdown: CancellationToken) -> Self {
        Self {
            socket_path,
            cancel,
            shutdown,
        }
    }

    /// Accept loop; runs until shutdown. A stale socket file from a
    /// previous run is replaced.
    pub async fn run(self) {
        let _ = std::fs::remove_file(&self.socket_path);
        let listener = match UnixListener::bind(&self.socket_path) {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(path = %self.socket_path.display(), error = %e, "could not bind control socket");
                return;
            }
        };
        tracing::info!(path = %self.socket_path.display(), "control socket listening");

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            let cancel = self.cancel.clone();
                            tokio::spawn(handle_connection(stream, cancel));
                        }
                        Err(e) => tracing::warn!(error = %e, "control socket accept failed"),
                    }
                }
                _ = self.shutdown.cancelled() => break,
            }
        }

        let _ = std::fs::remove_file(&self.socket_path);
        tracing::debug!("control socket closed");
    }
}

async fn handle_connection(stream: UnixStream, cancel: CancelBus) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(&line, &cancel);
        if writer.write_all(response.as_bytes()).await.is_err() {
            break;
        }
        if writer.write_all(b"\n").await.is_err() {
            break;
        }
    }
}

fn handle_line(line: &str, cancel: &CancelBus) -> &'static str {
    match serde_json::from_str::<ControlRequest>(line) {
        Ok(request) if request.command == "cancel" => {
            let mode = match request.mode.as_deref() {
                Some("immediate") => CancelMode::Immediate,
                _ => CancelMode::Graceful,
            };
            cancel.raise(mode);
            r#"{"result":"ok"}"#
        }
        _ => r#"{"result":"unknown_command"}"#,
    }
}
