//! One fetch, filter and advance pass.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use tracing::{debug, info, instrument, warn};

use crate::cursor::{CursorStore, CursorStoreExt};
use crate::error::{Result, SyncError};
use crate::filter::Filters;
use crate::model::Incident;
use crate::source::{incidents_since, IncidentSource, ResolvedScope};

/// Upper bound on one fetch, pagination included.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Outcome of a cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Incidents returned by the source
    pub fetched: usize,
    /// Incidents that passed the filters, in creation order
    pub kept: Vec<Incident>,
    /// Cursor after the cycle
    pub cursor: DateTime<Utc>,
}

/// State carried from one cycle to the next.
pub struct SyncContext {
    source: Arc<dyn IncidentSource>,
    store: Arc<dyn CursorStore>,
    filters: Filters,
    scope: ResolvedScope,
    cursor: DateTime<Utc>,
    fetch_timeout: Duration,
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("scope", &self.scope)
            .field("cursor", &self.cursor)
            .field("fetch_timeout", &self.fetch_timeout)
            .finish_non_exhaustive()
    }
}

impl SyncContext {
    /// Build a context, reading the starting cursor from `store`.
    pub fn new(
        source: Arc<dyn IncidentSource>,
        store: Arc<dyn CursorStore>,
        filters: Filters,
        scope: ResolvedScope,
        now: DateTime<Utc>,
    ) -> Self {
        let cursor = store.read(now);
        info!(cursor = %cursor, "Starting from cursor");
        Self {
            source,
            store,
            filters,
            scope,
            cursor,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Lower bound of the next fetch.
    #[must_use]
    pub const fn cursor(&self) -> DateTime<Utc> {
        self.cursor
    }

    #[must_use]
    pub const fn filters(&self) -> &Filters {
        &self.filters
    }

    /// Fetch incidents since the cursor, filter them and advance the cursor.
    ///
    /// The cursor moves to one second past the last incident seen and is
    /// persisted once, before returning. A fetch error leaves it untouched.
    #[instrument(skip(self), fields(since = %self.cursor))]
    pub async fn run(&mut self) -> Result<CycleReport> {
        let query = self.scope.query(self.cursor);
        let fetch = incidents_since(self.source.as_ref(), &query).try_collect::<Vec<_>>();
        let incidents = tokio::time::timeout(self.fetch_timeout, fetch)
            .await
            .map_err(|_| SyncError::Timeout(self.fetch_timeout))??;

        let fetched = incidents.len();
        let mut last_seen = None;
        let mut kept = Vec::new();

        for incident in incidents {
            last_seen = Some(incident.created_at);
            info!(incident = %incident.id, summary = %incident.summary, "Incident");
            debug!(
                service = %incident.service.name,
                teams = ?incident.teams.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
                "Incident scope"
            );
            if self.filters.keep(&incident) {
                kept.push(incident);
            }
        }

        if let Some(last_seen) = last_seen {
            self.advance(last_seen + chrono::Duration::seconds(1));
        }

        info!(fetched, kept = kept.len(), cursor = %self.cursor, "Sync cycle complete");

        Ok(CycleReport {
            fetched,
            kept,
            cursor: self.cursor,
        })
    }

    /// Move the cursor to `now`, dropping anything raised before it.
    pub fn fast_forward(&mut self, now: DateTime<Utc>) {
        info!(cursor = %now, "Skipping incidents raised while paused");
        self.advance(now);
    }

    /// Advance to `candidate` (never backwards) and persist.
    fn advance(&mut self, candidate: DateTime<Utc>) {
        self.cursor = self.cursor.max(candidate);
        if let Err(e) = self.store.store(self.cursor) {
            warn!(error = %e, cursor = %self.cursor, "Failed to persist cursor");
        }
    }
}
