//! Pause/resume state machine and control channel.

use chrono::{DateTime, Duration, Utc};
use notify::NotifyEvent;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Whether incidents are currently being delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PauseState {
    #[default]
    Active,
    Paused {
        /// `None` pauses until resumed by hand.
        resume_at: Option<DateTime<Utc>>,
    },
}

/// Result of a control action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Paused { minutes: Option<u64> },
    Resumed,
    /// Action did not change the state
    Unchanged,
}

impl Transition {
    /// Info notification announcing the transition, if any.
    pub fn event(self, now: DateTime<Utc>) -> Option<NotifyEvent> {
        match self {
            Self::Paused { minutes } => Some(NotifyEvent::Paused {
                minutes,
                timestamp: now,
            }),
            Self::Resumed => Some(NotifyEvent::Resumed { timestamp: now }),
            Self::Unchanged => None,
        }
    }
}

/// Owns the [`PauseState`]. Only the scheduler task mutates it.
#[derive(Debug, Clone, Default)]
pub struct PauseController {
    state: PauseState,
    /// Automatic resume delay; `None` pauses indefinitely.
    timeout: Option<Duration>,
}

impl PauseController {
    /// `timeout_minutes == 0` pauses indefinitely, as does a value too large
    /// to represent.
    #[must_use]
    pub fn new(timeout_minutes: u64) -> Self {
        let timeout = i64::try_from(timeout_minutes)
            .ok()
            .filter(|m| *m > 0)
            .and_then(Duration::try_minutes);
        Self {
            state: PauseState::Active,
            timeout,
        }
    }

    #[must_use]
    pub const fn state(&self) -> PauseState {
        self.state
    }

    #[must_use]
    pub const fn is_paused(&self) -> bool {
        matches!(self.state, PauseState::Paused { .. })
    }

    fn timeout_minutes(&self) -> Option<u64> {
        self.timeout
            .map(|t| u64::try_from(t.num_minutes()).unwrap_or(0))
    }

    /// Pause delivery. Pausing while paused keeps the existing deadline.
    pub fn pause(&mut self, now: DateTime<Utc>) -> Transition {
        if self.is_paused() {
            debug!("Already paused");
            return Transition::Unchanged;
        }
        let resume_at = self.timeout.and_then(|t| now.checked_add_signed(t));
        self.state = PauseState::Paused { resume_at };
        info!(resume_at = ?resume_at, "Pausing notifications");
        Transition::Paused {
            minutes: self.timeout_minutes(),
        }
    }

    /// Resume delivery. Resuming while active does nothing.
    pub fn resume(&mut self) -> Transition {
        if !self.is_paused() {
            debug!("Not paused");
            return Transition::Unchanged;
        }
        self.state = PauseState::Active;
        info!("Unpausing notifications");
        Transition::Resumed
    }

    /// Pause when active, resume when paused.
    pub fn toggle(&mut self, now: DateTime<Utc>) -> Transition {
        if self.is_paused() {
            self.resume()
        } else {
            self.pause(now)
        }
    }

    /// Whether a timed pause has run out at `now`.
    #[must_use]
    pub fn resume_due(&self, now: DateTime<Utc>) -> bool {
        matches!(self.state, PauseState::Paused { resume_at: Some(at) } if now >= at)
    }

    /// Apply a control event.
    pub fn apply(&mut self, event: ControlEvent, now: DateTime<Utc>) -> Transition {
        match event {
            ControlEvent::Pause => self.pause(now),
            ControlEvent::Resume => self.resume(),
            ControlEvent::Toggle => self.toggle(now),
        }
    }
}

/// User actions delivered to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    Pause,
    Resume,
    Toggle,
}

/// Sending half of the control channel.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<ControlEvent>,
}

impl ControlHandle {
    /// Create a handle and the receiver the scheduler listens on.
    #[must_use]
    pub fn channel() -> (Self, mpsc::Receiver<ControlEvent>) {
        let (tx, rx) = mpsc::channel(16);
        (Self { tx }, rx)
    }

    /// Queue an event. Returns `false` once the scheduler has stopped.
    pub async fn send(&self, event: ControlEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    pub async fn pause(&self) -> bool {
        self.send(ControlEvent::Pause).await
    }

    pub async fn resume(&self) -> bool {
        self.send(ControlEvent::Resume).await
    }

    pub async fn toggle(&self) -> bool {
        self.send(ControlEvent::Toggle).await
    }
}
