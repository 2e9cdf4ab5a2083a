//! Structured logging using **tracing**.
//!
//! The CLI installs a JSON subscriber on stderr so stdout stays reserved for
//! reports. Library code emits events through the `tracing` macros directly.

/// Initializes the global tracing subscriber.
///
/// Call once at startup. Filtering follows `RUST_LOG`
/// (e.g. `RUST_LOG=macrostat_core=debug`).
pub fn init_structured_logging() {
    // try_init: a second call (e.g. from tests) must not panic
    let _ = tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_level(true)
        .with_target(true)
        .with_current_span(true)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}
