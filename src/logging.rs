//! Logging setup
//!
//! The library only emits `tracing` events. Applications that have no
//! subscriber of their own can install the default one here.

use std::env;

use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Install a global fmt subscriber with its level taken from `RUST_LOG`
///
/// Falls back to `INFO` when the variable is missing or not a plain level.
/// Fails if a global subscriber is already installed.
pub fn init() -> Result<()> {
    let level = level_from_env(env::var("RUST_LOG").ok().as_deref());

    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install global tracing subscriber")?;

    Ok(())
}

fn level_from_env(value: Option<&str>) -> Level {
    value.and_then(|s| s.parse().ok()).unwrap_or(Level::INFO)
}
