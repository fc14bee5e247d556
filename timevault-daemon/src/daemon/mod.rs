//! Daemon process concerns: cancellation, signals, pid file, resume.

pub mod cancel;
pub mod pidfile;
pub mod resume;
pub mod shutdown;
