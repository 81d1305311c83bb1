//! Tracing setup shared by the `infusion` binary and unit tests.
//!
//! The calculator view and share link are the program's output and go to
//! stdout. Diagnostics (config source, rejected documents, unknown slugs)
//! go to stderr through `tracing`.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "warn";

/// Install the stderr subscriber with [`DEFAULT_FILTER`]
pub fn init() {
    init_with_filter(DEFAULT_FILTER)
}

/// Install the stderr subscriber, falling back to `directives` (e.g.
/// `"infusion_core=debug"`) when `RUST_LOG` is unset or unparseable
pub fn init_with_filter(directives: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Route debug output through the test harness; repeat calls are no-ops
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("infusion_core=debug"))
        .try_init();
}
