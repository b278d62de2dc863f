//! Shared fakes for unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notify::{ChannelError, NotifyChannel, NotifyEvent};

use crate::error::{Result, SyncError};
use crate::model::{Incident, Reference};
use crate::source::{IncidentQuery, IncidentSource, Page};

/// Incident on `service` created at `at`.
pub fn incident_at(id: &str, service: &str, at: DateTime<Utc>) -> Incident {
    Incident::new(id, format!("{id} summary"), at, Reference::new("S1", service))
}

/// In-memory incident source honouring `since`, offset and limit.
#[derive(Default)]
pub struct FakeSource {
    incidents: Mutex<Vec<Incident>>,
    failure: Mutex<Option<String>>,
    offsets: Mutex<Vec<u32>>,
    queries: Mutex<Vec<IncidentQuery>>,
}

impl FakeSource {
    pub fn new(incidents: Vec<Incident>) -> Self {
        Self {
            incidents: Mutex::new(incidents),
            ..Self::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        let source = Self::default();
        source.fail_with(Some(message));
        source
    }

    pub fn fail_with(&self, message: Option<&str>) {
        *self.failure.lock().unwrap() = message.map(str::to_string);
    }

    pub fn push(&self, incident: Incident) {
        self.incidents.lock().unwrap().push(incident);
    }

    pub fn offsets(&self) -> Vec<u32> {
        self.offsets.lock().unwrap().clone()
    }

    pub fn queries(&self) -> Vec<IncidentQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl IncidentSource for FakeSource {
    async fn fetch_page(
        &self,
        query: &IncidentQuery,
        offset: u32,
        limit: u32,
    ) -> Result<Page<Incident>> {
        self.offsets.lock().unwrap().push(offset);
        self.queries.lock().unwrap().push(query.clone());
        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(SyncError::Other(message));
        }

        let matching: Vec<_> = self
            .incidents
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.created_at >= query.since)
            .cloned()
            .collect();
        let start = (offset as usize).min(matching.len());
        let end = (start + limit as usize).min(matching.len());

        Ok(Page {
            items: matching[start..end].to_vec(),
            more: end < matching.len(),
        })
    }
}

/// Channel remembering every event it was given.
#[derive(Default)]
pub struct RecordingChannel {
    events: Mutex<Vec<NotifyEvent>>,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<NotifyEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events().iter().map(NotifyEvent::message).collect()
    }
}

#[async_trait]
impl NotifyChannel for RecordingChannel {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn enabled(&self) -> bool {
        true
    }

    async fn send(&self, event: &NotifyEvent) -> std::result::Result<(), ChannelError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}
