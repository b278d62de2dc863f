//! Desktop notification channel.
//!
//! Shells out to the platform notification helper: `osascript` on macOS and
//! `notify-send` on Linux desktops. Other platforms, and hosts where the
//! helper is not on `PATH`, leave the channel disabled.

use std::ffi::OsString;
use std::fmt::Write as _;
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::ChannelError;
use crate::events::{NotifyEvent, Severity, APP_TITLE};
use crate::NotifyChannel;

/// Icon used by freedesktop daemons for urgent incidents.
const WARNING_ICON: &str = "dialog-warning";

/// How long a helper may run before it is killed.
pub const HELPER_TIMEOUT: Duration = Duration::from_secs(10);

/// Platforms with a supported notification helper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// macOS Notification Center via AppleScript
    MacOs,
    /// freedesktop.org notification daemon via `notify-send`
    Linux,
    /// No known helper
    Unsupported,
}

impl Platform {
    /// Detect the platform this binary was built for.
    #[must_use]
    pub fn current() -> Self {
        match std::env::consts::OS {
            "macos" => Self::MacOs,
            "linux" => Self::Linux,
            _ => Self::Unsupported,
        }
    }

    const fn program(self) -> Option<&'static str> {
        match self {
            Self::MacOs => Some("osascript"),
            Self::Linux => Some("notify-send"),
            Self::Unsupported => None,
        }
    }
}

/// Desktop notification channel.
pub struct DesktopChannel {
    platform: Platform,
}

impl DesktopChannel {
    /// Create a desktop channel for the current platform and `PATH`.
    #[must_use]
    pub fn detect() -> Self {
        Self::detect_in(Platform::current(), std::env::var_os("PATH"))
    }

    /// Create a channel for `platform` if its helper is found in `path`.
    #[must_use]
    pub fn detect_in(platform: Platform, path: Option<OsString>) -> Self {
        let Some(program) = platform.program() else {
            debug!(
                os = std::env::consts::OS,
                "Desktop notifications disabled (unsupported platform)"
            );
            return Self::for_platform(Platform::Unsupported);
        };

        let cwd = std::env::current_dir().unwrap_or_default();
        match which::which_in(program, path, cwd) {
            Ok(found) => {
                debug!(helper = %found.display(), "Found notification helper");
                Self::for_platform(platform)
            }
            Err(e) => {
                warn!(
                    program,
                    error = %e,
                    "Notification helper not found, desktop notifications disabled"
                );
                Self::for_platform(Platform::Unsupported)
            }
        }
    }

    /// Create a desktop channel for a specific platform.
    #[must_use]
    pub const fn for_platform(platform: Platform) -> Self {
        Self { platform }
    }

    /// Build the helper arguments for an event.
    fn arguments(&self, event: &NotifyEvent) -> Vec<String> {
        match self.platform {
            Platform::MacOs => vec!["-e".to_string(), apple_script(event)],
            Platform::Linux => {
                let mut args = vec![
                    format!("--app-name={APP_TITLE}"),
                    format!("--urgency={}", event.severity().desktop_urgency()),
                ];
                if event.severity() == Severity::Critical {
                    args.push(format!("--icon={WARNING_ICON}"));
                }
                args.push(event.title());
                let body = match event.url() {
                    Some(url) => format!("{}\n{url}", event.message()),
                    None => event.message(),
                };
                args.push(body);
                args
            }
            Platform::Unsupported => Vec::new(),
        }
    }
}

/// Render an AppleScript `display notification` statement.
fn apple_script(event: &NotifyEvent) -> String {
    let mut script = format!(
        "display notification \"{}\" with title \"{}\"",
        escape_apple_string(&event.message()),
        escape_apple_string(&event.title()),
    );
    if let Some(url) = event.url() {
        let _ = write!(script, " subtitle \"{}\"", escape_apple_string(url));
    }
    if event.severity() == Severity::Critical {
        script.push_str(" sound name \"Basso\"");
    }
    script
}

/// Run a helper, killing it once `limit` has passed.
async fn run_helper(
    program: &'static str,
    args: Vec<String>,
    limit: Duration,
) -> Result<Output, ChannelError> {
    let output = Command::new(program).args(args).kill_on_drop(true).output();
    match tokio::time::timeout(limit, output).await {
        Ok(result) => result.map_err(|source| ChannelError::Spawn { program, source }),
        Err(_) => Err(ChannelError::Timeout {
            program,
            after: limit,
        }),
    }
}

/// Escape a string for use inside an AppleScript string literal.
fn escape_apple_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[async_trait]
impl NotifyChannel for DesktopChannel {
    fn name(&self) -> &'static str {
        "desktop"
    }

    fn enabled(&self) -> bool {
        self.platform.program().is_some()
    }

    async fn send(&self, event: &NotifyEvent) -> Result<(), ChannelError> {
        let program = self
            .platform
            .program()
            .ok_or_else(|| ChannelError::NotConfigured(std::env::consts::OS.to_string()))?;

        debug!(channel = "desktop", program, title = %event.title(), "Sending notification");

        let output = run_helper(program, self.arguments(event), HELPER_TIMEOUT).await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(
                channel = "desktop",
                program,
                status = %output.status,
                stderr = %stderr,
                "Notification helper failed"
            );
            Err(ChannelError::Helper {
                program,
                status: output.status,
                stderr,
            })
        }
    }
}
