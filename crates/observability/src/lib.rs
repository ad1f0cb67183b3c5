//! Process-wide tracing setup shared by the maintenance binary and tests.

use tracing_subscriber::EnvFilter;

/// Initialize JSON logging with an env-configurable filter.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    init_with_default("info");
}

/// Like [`init`], with an explicit default directive used when `RUST_LOG` is
/// unset (maintenance commands pass `warn` unless `--verbose`).
pub fn init_with_default(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
