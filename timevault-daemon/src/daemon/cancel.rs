//! Cooperative cancellation shared by the scheduler, workers and IPC.
//!
//! Two severity levels: graceful stops admitting new files and lets
//! running copies finish; immediate also aborts in-progress copies between
//! chunks, leaving temp files for journal replay. Raising only escalates;
//! the scheduler resets the bus when a new cycle begins.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CancelMode {
    None,
    Graceful,
    Immediate,
}

#[derive(Clone)]
pub struct CancelBus {
    tx: Arc<watch::Sender<CancelMode>>,
}

impl CancelBus {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(CancelMode::None);
        Self { tx: Arc::new(tx) }
    }

    /// Escalate to `mode`; a lower or equal mode is a no-op.
    pub fn raise(&self, mode: CancelMode) {
        let changed = self.tx.send_if_modified(|current| {
            if mode > *current {
                *current = mode;
                true
            } else {
                false
            }
        });
        if changed {
            tracing::info!(?mode, "cancellation raised");
        }
    }

    /// Called at cycle start; cancellation never carries across cycles.
    pub fn reset(&self) {
        self.tx.send_replace(CancelMode::None);
    }

    pub fn mode(&self) -> CancelMode {
        *self.tx.borrow()
    }

    pub fn is_cancelled(&self) -> bool {
        self.mode() != CancelMode::None
    }

    pub fn is_immediate(&self) -> bool {
        self.mode() == CancelMode::Immediate
    }

    /// Resolves once any cancellation is raised (already-raised included).
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|m| *m != CancelMode::None).await;
    }
}

impl Default for CancelBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raise_escalates_only() {
        let bus = CancelBus::new();
        assert_eq!(bus.mode(), CancelMode::None);

        bus.raise(CancelMode::Graceful);
        assert_eq!(bus.mode(), CancelMode::Graceful);
        assert!(bus.is_cancelled());
        assert!(!bus.is_immediate());

        // Immediate escalates past graceful
        bus.raise(CancelMode::Immediate);
        assert!(bus.is_immediate());

        // ...but never downgrades within a cycle
        bus.raise(CancelMode::Graceful);
        assert!(bus.is_immediate());
    }

    #[test]
    fn test_reset_clears_mode() {
        let bus = CancelBus::new();
        bus.raise(CancelMode::Immediate);
        bus.reset();
        assert_eq!(bus.mode(), CancelMode::None);
        assert!(!bus.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiters() {
        let bus = CancelBus::new();
        let waiter = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.cancelled().await })
        };
        bus.raise(CancelMode::Graceful);
        waiter.await.unwrap();

        // An already-raised bus resolves immediately
        bus.cancelled().await;
    }
}
