//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over the default `info`.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
            .with_target(false)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    }
}
