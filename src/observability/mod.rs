//! # Observability
//!
//! Structured logging for the rotation tooling. Library code only emits `tracing`
//! events and spans; the binary installs the subscriber through [`init_logging`].

pub mod logging;

pub use logging::{build_subscriber, init_logging};
