//! Structured logging setup, shared by the server binary and any tooling
//! that links against this crate directly (tests, one-off scripts).

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Settings;

/// Initialize the global `tracing` subscriber from the process settings.
///
/// Safe to call more than once per process in tests — a second call is a
/// no-op rather than a panic, since `tracing_subscriber::fmt().try_init()`
/// is used instead of `init()`.
pub fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_new(&settings.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = fmt().with_env_filter(filter).with_target(true);

    let result = if settings.log_json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already initialized, skipping");
    }
}
