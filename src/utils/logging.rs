//! Structured logging setup.
//!
//! The crate itself only emits `tracing` events; installing a subscriber
//! is the host application's call. This module wires one up from a
//! [`LoggingConfig`] for hosts that don't bring their own.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};

/// Install a global `tracing` subscriber according to `config`. The
/// `RUST_LOG` environment variable, when set, overrides the configured
/// level.
///
/// # Errors
/// `Config` if a global subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string().to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let installed = if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| ProtocolError::Config(format!("failed to install subscriber: {e}")))
}

/// Like [`init`], but ignores an already-installed subscriber. Handy in
/// tests, where many cases race to initialize logging.
pub fn init_for_tests(config: &LoggingConfig) {
    let _ = init(config);
}
