//! OS signal handling.
//!
//! SIGTERM asks for a graceful stop (running copies finish), SIGINT for an
//! immediate one (copies abort between chunks, replay reconciles), SIGHUP
//! is ignored.

use crate::daemon::cancel::{CancelBus, CancelMode};
use tokio::signal;
use tracing::info;

/// Wait for a terminating signal and raise the matching cancel mode.
/// Returns once the process should shut down.
pub async fn wait_for_signal(cancel: &CancelBus) {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut hangup = signal::unix::signal(signal::unix::SignalKind::hangup())
            .expect("Failed to install SIGHUP handler");

        loop {
            tokio::select! {
                _ = signal::ctrl_c() => {
                    info!("Received SIGINT, requesting immediate cancellation");
                    cancel.raise(CancelMode::Immediate);
                    return;
                }
                _ = terminate.recv() => {
                    info!("Received SIGTERM, requesting graceful cancellation");
                    cancel.raise(CancelMode::Graceful);
                    return;
                }
                _ = hangup.recv() => {
                    tracing::debug!("SIGHUP ignored");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        info!("Received Ctrl+C, requesting immediate cancellation");
        cancel.raise(CancelMode::Immediate);
    }
}
