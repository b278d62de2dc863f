//! Error types for the sync engine.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while talking to the incident API or persisting state.
#[derive(Debug, Error)]
pub enum SyncError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status
    #[error("PagerDuty returned {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    /// The response body did not have the expected shape
    #[error("Unexpected PagerDuty response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Fetching incidents took longer than the configured bound
    #[error("Fetching incidents timed out after {0:?}")]
    Timeout(Duration),

    /// Configured names could not be resolved to provider ids
    #[error("Could not resolve {kind} from PagerDuty: {source}")]
    Resolve {
        kind: &'static str,
        #[source]
        source: Box<SyncError>,
    },

    /// Configured names matched nothing in PagerDuty
    #[error("No PagerDuty {kind} named {}", .names.join(", "))]
    Unresolved {
        kind: &'static str,
        names: Vec<String>,
    },

    /// Cursor persistence failed
    #[error(transparent)]
    Cursor(#[from] CursorError),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Errors raised by a cursor store.
#[derive(Debug, Error)]
pub enum CursorError {
    /// Reading or writing the cursor file failed
    #[error("Cursor file {path} is not accessible: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The stored cursor is not an RFC 3339 timestamp
    #[error("Cursor file {path} holds an invalid timestamp {value:?}: {source}")]
    Parse {
        path: PathBuf,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema
    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The title template does not compile
    #[error("Invalid title template: {0}")]
    Template(#[from] Box<handlebars::TemplateError>),

    /// A value is out of range or missing
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Convenience alias used across the crate.
pub type Result<T, E = SyncError> = std::result::Result<T, E>;
