//! JSON log output for the engine's `tracing` events.
//!
//! The engine logs command outcomes at `info`, swallowed side-channel
//! failures at `warn`, ledger postings at `debug` and unrecoverable
//! inconsistencies at `error` with `inconsistency = true`.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "info";

/// Install the JSON subscriber, filtered by `RUST_LOG`.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    install(filter);
}

/// Install the JSON subscriber with explicit filter directives, ignoring
/// `RUST_LOG`. Returns `false` if a global subscriber was already set.
pub fn init_with_filter(directives: &str) -> bool {
    install(EnvFilter::new(directives))
}

fn install(filter: EnvFilter) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_a_no_op() {
        init_with_filter("stockflow=debug");
        assert!(!init_with_filter("info"));
        init();
        ::tracing::info!(sku = "SKU-1", "still logging");
    }
}
