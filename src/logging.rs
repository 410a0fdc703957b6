//! Structured logging through `tracing`.
//!
//! Library code only emits events; the binary (or a test) installs the
//! subscriber once with [`init`].

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Level selected by the number of `-v` flags.
pub fn level_for(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Installs a fmt subscriber. `RUST_LOG`, when set, overrides `verbosity`.
///
/// Calling it twice is harmless: the second subscriber is discarded.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_for(verbosity).to_string().to_ascii_lowercase()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity > 0)
        .with_thread_names(verbosity > 1)
        .try_init();
}
