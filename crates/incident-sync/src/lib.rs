//! PagerDuty incident sync and filter engine.
//!
//! Polls PagerDuty for incidents created since a persisted cursor, runs them
//! through include/exclude rules and hands the survivors to the
//! [`notify`] crate as desktop notifications.
//!
//! # Pieces
//!
//! - [`cursor`]: the persisted "last seen" timestamp
//! - [`source`] and [`pagerduty`]: paginated incident listing
//! - [`filter`]: include/exclude rule evaluation
//! - [`sync`]: one fetch, filter and advance pass
//! - [`pause`]: pause/resume state and control events
//! - [`scheduler`]: the polling loop
//! - [`format`]: notification titles and messages
//! - [`config`], [`logging`], [`error`]: ambient plumbing

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod cursor;
pub mod error;
pub mod filter;
pub mod format;
pub mod logging;
pub mod model;
pub mod pagerduty;
pub mod pause;
pub mod scheduler;
pub mod source;
pub mod sync;

#[cfg(test)]
mod test_utils;

pub use config::Config;
pub use cursor::{CursorStore, CursorStoreExt, FileCursorStore, MemoryCursorStore};
pub use error::{ConfigError, CursorError, Result, SyncError};
pub use filter::{keep, FilterRule, Filters, RuleSet, Scope};
pub use format::{clean_message, AlertFormatter, DisplayZone};
pub use model::{Incident, IncidentStatus, Reference, Urgency};
pub use pagerduty::PagerDutyClient;
pub use pause::{ControlEvent, ControlHandle, PauseController, PauseState, Transition};
pub use scheduler::{Scheduler, TickOutcome};
pub use source::{incidents_since, IncidentQuery, IncidentSource, Page, ResolvedScope};
pub use sync::{CycleReport, SyncContext};
