//! Diagnostic tracing for the harness itself.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: harness diagnostics via `RUST_LOG`, output to stderr.
//!   Never written into run logs.
//!
//! - **Run logs (`logdir`, `harness`)**: `run_<i>.log` files holding the merged output
//!   of each training invocation. Always written, unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG` env var. Defaults to `warn` if unset.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=trials=debug trials run federated
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
