//! Process-wide tracing setup.
//!
//! `RUST_LOG` controls the filter (default `info`); `LOG_FORMAT=json` emits
//! newline-delimited JSON with event fields flattened for log shippers.

use std::env;

use tracing::warn;
use tracing_subscriber::EnvFilter;

pub fn configure_logging() -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_new(env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stdout);

    let json = env::var("LOG_FORMAT").is_ok_and(|format| format == "json");
    let result = if json {
        builder.json().flatten_event(true).try_init()
    } else {
        builder.try_init()
    };

    // A second initialization (tests, embedded use) keeps the existing
    // subscriber rather than failing the caller.
    if let Err(e) = result {
        warn!("Logging already initialized, keeping existing subscriber: {e}");
    }
    Ok(())
}
