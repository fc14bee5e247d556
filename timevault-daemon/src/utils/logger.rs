//! Logging setup using tracing.
//!
//! `RUST_LOG` wins when set; otherwise the level from the command line or
//! configuration applies to the daemon while noisy dependencies stay at
//! warn.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init(level: &str) -> anyhow::Result<()> {
    let fallback = format!("warn,timevault_daemon={level}");
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&fallback))
        .unwrap_or_else(|_| EnvFilter::new("warn,timevault_daemon=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
