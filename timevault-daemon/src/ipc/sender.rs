//! Per-event client connection to the UI broadcast socket.
//!
//! The engine is the client here: one connection per event, one
//! newline-terminated JSON object, then close. A missing or unresponsive
//! UI never affects the engine, so failures are only debug-logged.

use crate::ipc::UiEvent;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

const SEND_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct EventSender {
    socket_path: PathBuf,
}

impl EventSender {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    pub async fn send(&self, event: UiEvent) {
        let mut payload = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                tracing::debug!(error = %e, "could not serialize UI event");
                return;
            }
        };
        payload.push('\n');

        let attempt = tokio::time::timeout(SEND_TIMEOUT, async {
            let mut stream = UnixStream::connect(&self.socket_path).await?;
            stream.write_all(payload.as_bytes()).await?;
            stream.shutdown().await
        })
        .await;

        match attempt {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "UI event not delivered"),
            Err(_) => tracing::debug!("UI event send timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncBufReadExt;
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn test_send_without_listener_is_silent() {
        let dir = tempfile::TempDir::new().unwrap();
        let sender = EventSender::new(dir.path().join("nobody-home.sock"));
        // Must not error or block
        sender.send(UiEvent::warning("lost".into())).await;
    }

    #[tokio::test]
    async fn test_send_delivers_one_json_line() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ui.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let sender = EventSender::new(path);
        let send_task = tokio::spawn(async move {
            sender.send(UiEvent::analyzing("Scanning".into(), 7)).await;
        });

        let (stream, _) = listener.accept().await.unwrap();
        let mut lines = tokio::io::BufReader::new(stream).lines();
        let line = lines.next_line().await.unwrap().unwrap();

        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "analyzing");
        assert_eq!(value["processed"], 7);

        send_task.await.unwrap();
    }
}
