//! Incident data types as returned by the PagerDuty REST API.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Incident lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Triggered,
    Acknowledged,
    Resolved,
}

impl IncidentStatus {
    /// Every status; the notifier always asks for all of them.
    pub const ALL: [Self; 3] = [Self::Triggered, Self::Acknowledged, Self::Resolved];

    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Triggered => "triggered",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
        }
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incident urgency. Anything PagerDuty adds later is treated as low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    High,
    #[default]
    #[serde(other)]
    Low,
}

/// Reference to a service or team attached to an incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub id: String,
    /// Display name (`summary` in the API).
    #[serde(rename = "summary")]
    pub name: String,
}

impl Reference {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A PagerDuty incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    /// Incident number shown in the UI (`#42`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_number: Option<u64>,
    pub summary: String,
    pub status: IncidentStatus,
    #[serde(default)]
    pub urgency: Urgency,
    pub created_at: DateTime<Utc>,
    pub service: Reference,
    #[serde(default)]
    pub teams: Vec<Reference>,
    #[serde(default)]
    pub html_url: String,
}

impl Incident {
    /// Create an incident with the fields the sync engine looks at.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        summary: impl Into<String>,
        created_at: DateTime<Utc>,
        service: Reference,
    ) -> Self {
        Self {
            id: id.into(),
            incident_number: None,
            summary: summary.into(),
            status: IncidentStatus::Triggered,
            urgency: Urgency::Low,
            created_at,
            service,
            teams: Vec::new(),
            html_url: String::new(),
        }
    }

    /// Attach a team.
    #[must_use]
    pub fn with_team(mut self, team: Reference) -> Self {
        self.teams.push(team);
        self
    }

    /// Set the status.
    #[must_use]
    pub const fn with_status(mut self, status: IncidentStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the urgency.
    #[must_use]
    pub const fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }

    /// Set the detail URL.
    #[must_use]
    pub fn with_html_url(mut self, url: impl Into<String>) -> Self {
        self.html_url = url.into();
        self
    }

    /// Whether the incident should be shown with a warning icon.
    #[must_use]
    pub fn is_urgent(&self) -> bool {
        self.urgency == Urgency::High
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_api_incident() {
        let json = r#"{
            "id": "PT4KHLK",
            "type": "incident",
            "incident_number": 1234,
            "summary": "[#1234] The server is on fire.",
            "status": "acknowledged",
            "urgency": "high",
            "created_at": "2015-10-06T21:30:42Z",
            "html_url": "https://subdomain.pagerduty.com/incidents/PT4KHLK",
            "service": {"id": "PIJ90N7", "type": "service_reference", "summary": "My Mail Service"},
            "teams": [{"id": "PQ9K7I8", "type": "team_reference", "summary": "Engineering"}]
        }"#;

        let incident: Incident = serde_json::from_str(json).unwrap();
        assert_eq!(incident.id, "PT4KHLK");
        assert_eq!(incident.incident_number, Some(1234));
        assert_eq!(incident.status, IncidentStatus::Acknowledged);
        assert!(incident.is_urgent());
        assert_eq!(incident.service.name, "My Mail Service");
        assert_eq!(incident.teams[0].name, "Engineering");
        assert_eq!(incident.created_at.to_rfc3339(), "2015-10-06T21:30:42+00:00");
    }

    #[test]
    fn test_unknown_urgency_is_low() {
        let urgency: Urgency = serde_json::from_str("\"suppressed\"").unwrap();
        assert_eq!(urgency, Urgency::Low);
    }

    #[test]
    fn test_missing_teams_default_empty() {
        let json = r#"{
            "id": "P1",
            "summary": "s",
            "status": "triggered",
            "created_at": "2024-01-01T00:00:00Z",
            "service": {"id": "S1", "summary": "svc"}
        }"#;
        let incident: Incident = serde_json::from_str(json).unwrap();
        assert!(incident.teams.is_empty());
        assert_eq!(incident.urgency, Urgency::Low);
    }
}
