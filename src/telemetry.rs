//! Telemetry initialization.
//!
//! Controlled by `ITSQ_LOG`:
//! - unset → no-op (tracing disabled, zero overhead)
//! - `"json"` → JSON events to stderr
//! - any other value → used as an `EnvFilter` directive, compact output
//!   to stderr (e.g. `ITSQ_LOG=debug`, `ITSQ_LOG=itsq=trace`)

use tracing_subscriber::EnvFilter;

/// Initialize tracing based on `ITSQ_LOG`. Call once from `main`.
pub fn init() {
    let Ok(value) = std::env::var("ITSQ_LOG") else {
        return;
    };
    if value.is_empty() {
        return;
    }

    if value == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::new("info"))
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .compact()
            .with_env_filter(EnvFilter::new(value))
            .with_writer(std::io::stderr)
            .init();
    }
}
