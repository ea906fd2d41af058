//! Tracing initialization.
//!
//! Centralized so every binary in the workspace logs identically.

use crate::ColorWhen;
use anyhow::Result;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` is honored via `EnvFilter`; without it, `info` and up are
/// shown. ANSI output follows the shared color policy.
pub fn init_tracing(color: ColorWhen) -> Result<()> {
    // ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_ansi(color.stderr())
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
