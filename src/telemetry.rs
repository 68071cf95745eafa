//! Tracing initialization.
//!
//! Structured logging via `tracing-subscriber` with env-filter control
//! (`RUST_LOG=srg=debug,info`). Kept separate from `main` so tests and
//! embedded uses can opt in.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the tracing subscriber. Safe to call once per process; a
/// second call returns an error from `try_init`, which callers may ignore
/// in test setups.
pub fn init_telemetry() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}
