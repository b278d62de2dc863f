//! Notification event types for the incident notifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Application name shown as the title of informational notifications.
pub const APP_TITLE: &str = "PagerDuty Notifier";

/// Severity levels for notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational - normal operations
    Info,
    /// Warning - something needs attention
    Warning,
    /// Critical - immediate action required
    Critical,
}

impl Severity {
    /// Get display name for this severity.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "Info",
            Self::Warning => "Warning",
            Self::Critical => "Critical",
        }
    }

    /// Urgency level understood by freedesktop notification daemons.
    #[must_use]
    pub const fn desktop_urgency(&self) -> &'static str {
        match self {
            Self::Info => "low",
            Self::Warning => "normal",
            Self::Critical => "critical",
        }
    }
}

/// Events that can trigger notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifyEvent {
    // =========================================================================
    // Incident alerts
    // =========================================================================
    /// An incident passed the filters and should be shown to the user
    Incident {
        id: String,
        title: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        /// High-urgency incidents get a warning icon
        #[serde(default)]
        urgent: bool,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Control events
    // =========================================================================
    /// Notifications were paused, optionally for a fixed number of minutes
    Paused {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minutes: Option<u64>,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// Notifications were resumed
    Resumed {
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// The configuration file could not be loaded
    ConfigProblem {
        path: String,
        message: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// Manual test notification
    Test {
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
}

impl NotifyEvent {
    /// Get the title line for this event.
    #[must_use]
    pub fn title(&self) -> String {
        match self {
            Self::Incident { title, .. } => title.clone(),
            Self::Paused { .. } | Self::Resumed { .. } => APP_TITLE.to_string(),
            Self::ConfigProblem { path, .. } => path.clone(),
            Self::Test { .. } => "Incident 123".to_string(),
        }
    }

    /// Get the body text for this event.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Incident { message, .. } | Self::ConfigProblem { message, .. } => {
                message.clone()
            }
            Self::Paused {
                minutes: Some(minutes),
                ..
            } => format!("Pausing notifications for {minutes} minutes"),
            Self::Paused { minutes: None, .. } => "Pausing notifications".to_string(),
            Self::Resumed { .. } => "Unpausing notifications".to_string(),
            Self::Test { .. } => "P2, deadletter queue, something ..".to_string(),
        }
    }

    /// Link associated with the event, if any.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Incident { url, .. } => url.as_deref(),
            _ => None,
        }
    }

    /// Get the severity for this event.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::Incident { urgent, .. } => {
                if *urgent {
                    Severity::Critical
                } else {
                    Severity::Warning
                }
            }
            Self::ConfigProblem { .. } => Severity::Warning,
            Self::Paused { .. } | Self::Resumed { .. } | Self::Test { .. } => Severity::Info,
        }
    }

    /// Get the timestamp for this event.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Incident { timestamp, .. }
            | Self::Paused { timestamp, .. }
            | Self::Resumed { timestamp }
            | Self::ConfigProblem { timestamp, .. }
            | Self::Test { timestamp } => *timestamp,
        }
    }
}
