//! Suspend/resume detection via wall-clock gaps.
//!
//! Copies that were mid-flight when the lid closed look exactly like a
//! crash; a large gap between wall-clock samples triggers the same
//! reconciliation as startup (journal replay + manifest flush).

use crate::engine::cycle::Engine;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SAMPLE_INTERVAL: Duration = Duration::from_secs(5);
const GAP_THRESHOLD: Duration = Duration::from_secs(30);

pub fn spawn(engine: Arc<Engine>, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last = SystemTime::now();
        loop {
            tokio::select! {
                _ = tokio::time::sleep(SAMPLE_INTERVAL) => {}
                _ = shutdown.cancelled() => return,
            }

            let now = SystemTime::now();
            let gap = now.duration_since(last).unwrap_or_default();
            last = now;

            if gap > GAP_THRESHOLD {
                tracing::info!(
                    gap_secs = gap.as_secs(),
                    "wall-clock gap detected, reconciling after resume"
                );
                engine.replay_and_flush().await;
            }
        }
    })
}
