//! Subscriber setup for the binaries.

use tracing_subscriber::EnvFilter;

/// Installs a stderr `fmt` subscriber filtered by `RUST_LOG`.
///
/// Falls back to `medrag=info` (or `debug` when `verbose`) plus `warn` for
/// everything else. Safe to call more than once; later calls are ignored.
pub fn init_tracing(verbose: bool) {
    let fallback = if verbose {
        "warn,medrag=debug,doc_extract=debug"
    } else {
        "warn,medrag=info,doc_extract=info"
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
