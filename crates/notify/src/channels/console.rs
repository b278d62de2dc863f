//! Console notification channel for headless runs.

use std::fmt::Write as _;

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::events::NotifyEvent;
use crate::NotifyChannel;

/// Output format for the console channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsoleFormat {
    /// One human readable line per event
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Writes notifications to stdout.
#[derive(Debug, Default)]
pub struct ConsoleChannel {
    format: ConsoleFormat,
}

impl ConsoleChannel {
    /// Create a console channel with the given output format.
    #[must_use]
    pub const fn new(format: ConsoleFormat) -> Self {
        Self { format }
    }

    fn render(&self, event: &NotifyEvent) -> Result<String, ChannelError> {
        match self.format {
            ConsoleFormat::Json => Ok(serde_json::to_string(event)?),
            ConsoleFormat::Text => {
                let mut line = format!(
                    "[{}] {}: {}",
                    event.severity().as_str(),
                    event.title(),
                    event.message()
                );
                if let Some(url) = event.url() {
                    let _ = write!(line, " <{url}>");
                }
                Ok(line)
            }
        }
    }
}

#[async_trait]
impl NotifyChannel for ConsoleChannel {
    fn name(&self) -> &'static str {
        "console"
    }

    fn enabled(&self) -> bool {
        true
    }

    async fn send(&self, event: &NotifyEvent) -> Result<(), ChannelError> {
        println!("{}", self.render(event)?);
        Ok(())
    }
}
