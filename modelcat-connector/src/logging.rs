//! Tracing subscriber setup for the binaries.

use tracing_subscriber::EnvFilter;

/// Default filter for a `-v` count: warn, then info, then debug.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Install the global subscriber, writing to stderr. `RUST_LOG` wins over
/// the verbosity flag. Calling this twice is harmless.
pub fn init_logging(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!(verbosity, "Logging initialised");
    }
}
