//! Error types for the notification system.

use thiserror::Error;

/// Errors that can occur when sending notifications.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Spawning or waiting on the notification helper failed
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The notification helper exited unsuccessfully
    #[error("{program} exited with {status}: {stderr}")]
    Helper {
        program: &'static str,
        status: std::process::ExitStatus,
        stderr: String,
    },

    /// The notification helper did not finish in time
    #[error("{program} did not finish within {after:?}")]
    Timeout {
        program: &'static str,
        after: std::time::Duration,
    },

    /// Channel is not configured
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}
