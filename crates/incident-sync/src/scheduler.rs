//! Background loop driving sync cycles.
//!
//! A single task owns the sync context and pause state. Control events are
//! received on the same task, so they are serialized with ticks.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use notify::Notifier;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::format::AlertFormatter;
use crate::pause::{ControlEvent, PauseController, PauseState, Transition};
use crate::sync::SyncContext;

/// Default time between cycles.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A cycle ran and `kept` incidents were notified
    Ran { fetched: usize, kept: usize },
    /// Paused; nothing fetched
    Skipped,
    /// A timed pause ended; the cycle waits for the next tick
    AutoResumed,
    /// The fetch failed; retried on the next tick
    Failed,
}

/// Owns everything one polling loop needs.
pub struct Scheduler {
    context: SyncContext,
    pause: PauseController,
    notifier: Arc<Notifier>,
    formatter: AlertFormatter,
    control: mpsc::Receiver<ControlEvent>,
    interval: Duration,
    clear_on_unpause: bool,
}

impl Scheduler {
    #[must_use]
    pub fn new(
        context: SyncContext,
        pause: PauseController,
        notifier: Arc<Notifier>,
        formatter: AlertFormatter,
        control: mpsc::Receiver<ControlEvent>,
    ) -> Self {
        Self {
            context,
            pause,
            notifier,
            formatter,
            control,
            interval: DEFAULT_INTERVAL,
            clear_on_unpause: true,
        }
    }

    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub const fn with_clear_on_unpause(mut self, clear: bool) -> Self {
        self.clear_on_unpause = clear;
        self
    }

    #[must_use]
    pub const fn pause_state(&self) -> PauseState {
        self.pause.state()
    }

    #[must_use]
    pub const fn context(&self) -> &SyncContext {
        &self.context
    }

    /// One scheduler step at `now`.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        if self.pause.resume_due(now) {
            let transition = self.pause.resume();
            self.announce(transition, now).await;
            return TickOutcome::AutoResumed;
        }

        if self.pause.is_paused() {
            debug!("Paused, skipping sync cycle");
            return TickOutcome::Skipped;
        }

        match self.context.run().await {
            Ok(report) => {
                for incident in &report.kept {
                    self.notifier
                        .notify_and_wait(self.formatter.alert(incident))
                        .await;
                }
                TickOutcome::Ran {
                    fetched: report.fetched,
                    kept: report.kept.len(),
                }
            }
            Err(e) => {
                error!(error = %e, "Cannot list incidents from PagerDuty");
                TickOutcome::Failed
            }
        }
    }

    /// Apply a user action.
    pub async fn handle_control(&mut self, event: ControlEvent, now: DateTime<Utc>) -> Transition {
        debug!(?event, "Control event");
        let transition = self.pause.apply(event, now);
        self.announce(transition, now).await;
        transition
    }

    /// Notify about a pause transition and clear the backlog on resume.
    async fn announce(&mut self, transition: Transition, now: DateTime<Utc>) {
        if transition == Transition::Resumed && self.clear_on_unpause {
            self.context.fast_forward(now);
        }
        if let Some(event) = transition.event(now) {
            self.notifier.notify_and_wait(event).await;
        }
    }

    /// Run until `shutdown` is cancelled. The first cycle starts immediately.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut control_open = true;

        info!(interval = ?self.interval, "Scheduler started");

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    info!("Scheduler stopping");
                    break;
                }
                event = self.control.recv(), if control_open => match event {
                    Some(event) => {
                        self.handle_control(event, Utc::now()).await;
                    }
                    None => {
                        debug!("Control channel closed");
                        control_open = false;
                    }
                },
                _ = ticker.tick() => {
                    let outcome = self.tick(Utc::now()).await;
                    debug!(?outcome, "Tick");
                }
            }
        }
    }
}
