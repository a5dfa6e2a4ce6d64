//! Tracing subscriber setup for binaries and tests.

use std::sync::Once;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

static INIT_ONCE: Once = Once::new();

/// Install a fmt subscriber writing to stderr
///
/// `RUST_LOG` wins over `default_filter` (e.g. `"rowbound=debug"`). Later
/// calls, or a subscriber installed elsewhere, leave the existing one in
/// place.
pub fn init_tracing(default_filter: &str) {
    INIT_ONCE.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .finish()
            .try_init();
        if installed.is_err() {
            log::debug!(target: "rowbound::config", "tracing subscriber already installed");
        }
    });
}
