//! Tracing subscriber setup for the binary.

use clap::ValueEnum;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

/// Directives used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "incident_sync=info,notify=info,warn";

/// Directives used with `--verbose` when `RUST_LOG` is unset.
pub const VERBOSE_FILTER: &str = "incident_sync=debug,notify=debug,info";

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human readable
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Filter from `RUST_LOG`, falling back to the built-in directives.
#[must_use]
pub fn filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER })
    })
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(verbose: bool, format: LogFormat) -> Result<(), TryInitError> {
    let layer = match format {
        LogFormat::Text => fmt::layer().with_target(false).boxed(),
        LogFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter(verbose))
        .try_init()
}
