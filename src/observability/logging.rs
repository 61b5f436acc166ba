//! # Structured Logging
//!
//! Span macros for rotation phases and credential store calls, plus subscriber
//! setup for the command line tool.
//!
//! Secrets never appear in span fields: client secrets, tokens and private keys
//! are held as [`SecretString`](crate::credhub::SecretString), which redacts itself.

use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Create a tracing span for one rotation phase of a deployment.
///
/// ```rust,ignore
/// let span = rotation_span!("prepare", "/bosh/cf", phase = %phase);
/// ```
#[macro_export]
macro_rules! rotation_span {
    ($operation:expr, $prefix:expr) => {
        tracing::info_span!(
            "rotation",
            operation = %$operation,
            prefix = %$prefix
        )
    };
    ($operation:expr, $prefix:expr, $($field:tt)*) => {
        tracing::info_span!(
            "rotation",
            operation = %$operation,
            prefix = %$prefix,
            $($field)*
        )
    };
}

/// Create a tracing span for a credential store request.
#[macro_export]
macro_rules! store_span {
    ($operation:expr) => {
        tracing::debug_span!(
            "credential_store",
            operation = %$operation,
            attempt = tracing::field::Empty
        )
    };
    ($operation:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "credential_store",
            operation = %$operation,
            attempt = tracing::field::Empty,
            $($field)*
        )
    };
}

/// Build the stderr fmt subscriber without installing it.
///
/// `RUST_LOG` wins when set; otherwise the level is `info`, or `debug` when verbose.
pub fn build_subscriber(verbose: bool) -> impl tracing::Subscriber + Send + Sync {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish()
}

/// Install [`build_subscriber`] as the global default.
///
/// Only the binary calls this. An already installed subscriber is left in place.
pub fn init_logging(verbose: bool) {
    if tracing::subscriber::set_global_default(build_subscriber(verbose)).is_err() {
        tracing::debug!("Logging subscriber already installed");
    }
}
