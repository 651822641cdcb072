//! itsq library crate — re-exports for integration tests.
//!
//! The primary interface is the `itsq` binary. This lib.rs exposes the
//! engine modules so that integration tests can exercise classification,
//! parsing, phase assignment, and the migration engine directly without
//! going through the CLI.

pub mod cancel;
pub mod classify;
pub mod config;
pub mod consistency;
pub mod migrate;
pub mod model;
pub mod parse;
pub mod phases;
pub mod resolve;

// Private modules only used by the binary — not re-exported.
// doctor, format, prompt, telemetry
