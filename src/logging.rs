//! sentinelmc/src/logging.rs
//! Logging initialization.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static LOG_INIT: Once = Once::new();

/// Initializes the global tracing subscriber once. `debug` raises the
/// default filter so the per-byte client stream dump is emitted;
/// otherwise only `info` and above are shown.
pub fn init_logging(debug: bool) {
    LOG_INIT.call_once(|| {
        let default = if debug { "debug" } else { "info" };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}
