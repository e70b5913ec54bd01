//! Logging setup for the provider binary.
//!
//! All output goes to **stderr**: stdout carries the handshake line the host
//! reads to find the gRPC address.
//!
//! `RUST_LOG` controls filtering, for example:
//!
//! ```bash
//! # Follow every poll of a baseline job
//! RUST_LOG=ome_provider::baseline=debug ./ome-provider
//!
//! # Also show HTTP calls made to OME
//! RUST_LOG=ome_provider=debug ./ome-provider
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default directive when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVE: &str = "info";

fn filter_or(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn stderr_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
}

/// Install the global subscriber at the [`DEFAULT_DIRECTIVE`] level.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default(DEFAULT_DIRECTIVE);
}

/// Install the global subscriber, using `default_level` when `RUST_LOG` is
/// not set.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    tracing_subscriber::registry()
        .with(filter_or(default_level))
        .with(stderr_layer())
        .init();
}

/// Try to install the global subscriber.
///
/// Returns `false` when one is already installed, which happens when tests
/// or embedding hosts set their own.
pub fn try_init_logging() -> bool {
    tracing_subscriber::registry()
        .with(filter_or(DEFAULT_DIRECTIVE))
        .with(stderr_layer())
        .try_init()
        .is_ok()
}
