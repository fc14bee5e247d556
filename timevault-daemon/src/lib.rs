//! Timevault backup daemon library.
//!
//! An always-on engine that incrementally mirrors selected folders onto an
//! external device: journaled atomic copies, content-addressed hardlink
//! dedup, adaptive parallelism, and a small UNIX-socket control/progress
//! IPC.

pub mod config;
pub mod daemon;
pub mod engine;
pub mod ipc;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use engine::cycle::{Engine, Scheduler};
pub use utils::errors::EngineError;
pub type Result<T> = std::result::Result<T, EngineError>;
