//! Subscriber setup for the `tracing` events the stores emit.
//!
//! `RUST_LOG`, when set, takes precedence over the level passed in.

use tracing_subscriber::{EnvFilter, fmt};

use crate::settings::Settings;

pub fn init() {
    init_with_level("info")
}

/// Installs the global subscriber. Panics if one is already installed.
pub fn init_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt().with_env_filter(filter).with_target(true).with_line_number(true).init();
}

/// Uses the configured `log_level`.
pub fn init_from(settings: &Settings) {
    init_with_level(&settings.log_level)
}

/// Safe to call from every test; only the first call installs anything.
pub fn init_test() {
    let _ = fmt().with_env_filter(EnvFilter::new("debug")).with_test_writer().try_init();
}
