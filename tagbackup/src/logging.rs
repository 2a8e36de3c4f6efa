//! Diagnostic logging to stderr.
//!
//! Skipped entries, run summaries and failures are reported here; the record
//! file and the tag store are the only product output.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `info` so skip warnings and run summaries
/// are visible without configuration.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=tagbackup=debug tagbackup restore
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
