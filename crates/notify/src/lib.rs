//! Notification sink for the incident notifier.
//!
//! This crate turns incident alerts and control events into user-visible
//! notifications. It knows nothing about PagerDuty: callers hand it fully
//! formatted [`NotifyEvent`]s.
//!
//! # Usage
//!
//! ```no_run
//! use notify::{Notifier, NotifyEvent};
//!
//! # async fn example() {
//! let notifier = Notifier::from_env();
//!
//! notifier
//!     .notify_and_wait(NotifyEvent::Incident {
//!         id: "PABC123".to_string(),
//!         title: "Incident triggered at 10:42".to_string(),
//!         message: "disk full".to_string(),
//!         url: None,
//!         urgent: true,
//!         timestamp: chrono::Utc::now(),
//!     })
//!     .await;
//! # }
//! ```
//!
//! # Configuration
//!
//! - `NOTIFY_DISABLED`: Set to "true" to disable all notifications
//! - `NOTIFY_CONSOLE`: `text` or `json` to also print every notification to stdout
//!
//! When no desktop helper is available the console channel is enabled
//! automatically so headless runs still surface alerts.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channels;
pub mod error;
pub mod events;

pub use channels::console::{ConsoleChannel, ConsoleFormat};
pub use channels::desktop::{DesktopChannel, Platform};
pub use channels::NotifyChannel;
pub use error::ChannelError;
pub use events::{NotifyEvent, Severity, APP_TITLE};

use std::sync::Arc;
use tracing::{info, warn};

/// Environment variable to disable all notifications.
const ENV_NOTIFY_DISABLED: &str = "NOTIFY_DISABLED";

/// Environment variable selecting console output.
const ENV_NOTIFY_CONSOLE: &str = "NOTIFY_CONSOLE";

/// Central notification dispatcher.
///
/// The `Notifier` manages multiple notification channels and dispatches
/// events to all enabled channels.
pub struct Notifier {
    channels: Vec<Arc<dyn NotifyChannel>>,
    disabled: bool,
}

impl Notifier {
    /// Create a new notifier from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let disabled = std::env::var(ENV_NOTIFY_DISABLED)
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        if disabled {
            info!("Notifications disabled via NOTIFY_DISABLED");
            return Self::disabled();
        }

        let channels = default_channels(
            DesktopChannel::detect(),
            std::env::var(ENV_NOTIFY_CONSOLE).ok().as_deref(),
        );

        info!(
            channel_count = channels.len(),
            "Notification system initialized"
        );

        Self {
            channels,
            disabled: false,
        }
    }

    /// Create a notifier with specific channels.
    #[must_use]
    pub fn with_channels(channels: Vec<Arc<dyn NotifyChannel>>) -> Self {
        Self {
            channels,
            disabled: false,
        }
    }

    /// Create a disabled notifier (for testing or when notifications are off).
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            channels: vec![],
            disabled: true,
        }
    }

    /// Check if any notification channels are enabled.
    #[must_use]
    pub fn has_channels(&self) -> bool {
        !self.disabled && !self.channels.is_empty()
    }

    /// Get the number of enabled channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        if self.disabled {
            0
        } else {
            self.channels.len()
        }
    }

    /// Send a notification and wait for all channels to complete.
    ///
    /// Channels are driven one after another, so consecutive calls are
    /// delivered in call order. Failures are logged and returned.
    pub async fn notify_and_wait(
        &self,
        event: NotifyEvent,
    ) -> Vec<(String, Result<(), ChannelError>)> {
        if self.disabled || self.channels.is_empty() {
            return vec![];
        }

        let mut results = vec![];

        for channel in &self.channels {
            if !channel.enabled() {
                continue;
            }
            let channel_name = channel.name().to_string();
            let result = channel.send(&event).await;
            if let Err(e) = &result {
                warn!(channel = %channel_name, error = %e, "Failed to send notification");
            }
            results.push((channel_name, result));
        }

        results
    }
}

/// Desktop when its helper exists, plus console when requested or when there
/// is no desktop.
fn default_channels(
    desktop: DesktopChannel,
    console: Option<&str>,
) -> Vec<Arc<dyn NotifyChannel>> {
    let mut channels: Vec<Arc<dyn NotifyChannel>> = vec![];

    if desktop.enabled() {
        info!("Desktop notifications enabled");
        channels.push(Arc::new(desktop));
    }

    let console = match console {
        Some("json") => Some(ConsoleFormat::Json),
        Some(_) => Some(ConsoleFormat::Text),
        None if channels.is_empty() => Some(ConsoleFormat::Text),
        None => None,
    };
    if let Some(format) = console {
        info!(?format, "Console notifications enabled");
        channels.push(Arc::new(ConsoleChannel::new(format)));
    }

    channels
}

impl Default for Notifier {
    fn default() -> Self {
        Self::from_env()
    }
}
