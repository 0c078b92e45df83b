//! Test-only helpers for installing a `tracing` subscriber in unit tests.

use std::sync::Once;

static INIT: Once = Once::new();

/// Installs a `tracing` subscriber that prints to stdout, filtered by `RUST_LOG` (or
/// `debug` by default). Safe to call from every test; only the first call takes
/// effect.
pub fn init_test_logger() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "debug".into()))
            .with_test_writer()
            .init();
    });
}
