//! Turning kept incidents into notification events.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use handlebars::{
    Context as HbsContext, Handlebars, Helper, HelperDef, HelperResult, Output, RenderContext,
    RenderError, RenderErrorReason,
};
use notify::NotifyEvent;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::model::Incident;

/// `[#1234] rest of summary`
static TICKET_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[#(\d+)\] (.+)").unwrap());

const TITLE_TEMPLATE: &str = "title";

/// Zone used to print wall-clock times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayZone {
    /// The machine's local zone
    #[default]
    Local,
    /// A named IANA zone
    Named(Tz),
}

impl DisplayZone {
    /// Resolve an optional IANA name. Unknown names are logged and fall back
    /// to local time.
    pub fn from_name(name: Option<&str>) -> Self {
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            None => Self::Local,
            Some(name) => match name.parse::<Tz>() {
                Ok(tz) => Self::Named(tz),
                Err(e) => {
                    warn!(timezone = name, error = %e, "Unknown timezone, using local time");
                    Self::Local
                }
            },
        }
    }

    /// `HH:MM` of `at` in this zone.
    #[must_use]
    pub fn hh_mm(&self, at: DateTime<Utc>) -> String {
        match self {
            Self::Local => at.with_timezone(&chrono::Local).format("%H:%M").to_string(),
            Self::Named(tz) => at.with_timezone(tz).format("%H:%M").to_string(),
        }
    }
}

/// `{{format created_at}}`: RFC 3339 string to `HH:MM` in the display zone.
struct FormatHelper {
    zone: DisplayZone,
}

impl HelperDef for FormatHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc HbsContext,
        _: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let raw = h
            .param(0)
            .and_then(|p| p.value().as_str())
            .ok_or_else(|| {
                RenderError::from(RenderErrorReason::Other(
                    "format expects a timestamp string".to_string(),
                ))
            })?;
        let at = DateTime::parse_from_rfc3339(raw).map_err(|e| {
            RenderError::from(RenderErrorReason::Other(format!(
                "format cannot parse {raw:?}: {e}"
            )))
        })?;
        out.write(&self.zone.hh_mm(at.with_timezone(&Utc)))?;
        Ok(())
    }
}

/// Builds titles and messages for incident notifications.
pub struct AlertFormatter {
    handlebars: Handlebars<'static>,
    templated: bool,
    zone: DisplayZone,
}

impl std::fmt::Debug for AlertFormatter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertFormatter")
            .field("templated", &self.templated)
            .field("zone", &self.zone)
            .finish_non_exhaustive()
    }
}

impl Default for AlertFormatter {
    fn default() -> Self {
        Self {
            handlebars: Handlebars::new(),
            templated: false,
            zone: DisplayZone::Local,
        }
    }
}

impl AlertFormatter {
    /// Compile the optional title template. An empty template means the
    /// default title.
    ///
    /// # Errors
    /// Returns [`ConfigError::Template`] when the template does not parse.
    pub fn new(template: Option<&str>, zone: DisplayZone) -> Result<Self, ConfigError> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.register_helper("format", Box::new(FormatHelper { zone }));

        let template = template.filter(|t| !t.trim().is_empty());
        if let Some(source) = template {
            handlebars
                .register_template_string(TITLE_TEMPLATE, source)
                .map_err(Box::new)?;
        }

        Ok(Self {
            handlebars,
            templated: template.is_some(),
            zone,
        })
    }

    /// `Incident <status> at <HH:MM>`
    #[must_use]
    pub fn default_title(&self, incident: &Incident) -> String {
        format!(
            "Incident {} at {}",
            incident.status,
            self.zone.hh_mm(incident.created_at)
        )
    }

    /// Title from the template, or the default title when there is none or it
    /// fails to render.
    pub fn title(&self, incident: &Incident) -> String {
        if !self.templated {
            return self.default_title(incident);
        }
        match self.handlebars.render(TITLE_TEMPLATE, incident) {
            Ok(title) => title,
            Err(e) => {
                debug!(incident = %incident.id, error = %e, "Title template failed, using default");
                self.default_title(incident)
            }
        }
    }

    /// Notification event for a kept incident.
    pub fn alert(&self, incident: &Incident) -> NotifyEvent {
        NotifyEvent::Incident {
            id: incident.id.clone(),
            title: self.title(incident),
            message: clean_message(&incident.summary),
            url: Some(incident.html_url.clone()).filter(|u| !u.is_empty()),
            urgent: incident.is_urgent(),
            timestamp: incident.created_at,
        }
    }
}

/// Drop the `[#N] ` ticket reference and every square bracket.
pub fn clean_message(summary: &str) -> String {
    let text = TICKET_PREFIX
        .captures(summary)
        .and_then(|c| c.get(2))
        .map_or(summary, |m| m.as_str());
    text.chars().filter(|c| !matches!(c, '[' | ']')).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IncidentStatus, Reference, Urgency};
    use chrono::TimeZone;

    fn incident() -> Incident {
        Incident::new(
            "PABC",
            "[#42] [prod] timeout connecting to db",
            Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap(),
            Reference::new("S1", "PaymentsAPI"),
        )
        .with_status(IncidentStatus::Acknowledged)
    }

    fn utc() -> DisplayZone {
        DisplayZone::Named(chrono_tz::UTC)
    }

    #[test]
    fn test_clean_message() {
        assert_eq!(clean_message("[#7] disk full"), "disk full");
        assert_eq!(clean_message("[#42] [prod] timeout"), "prod timeout");
        assert_eq!(clean_message("no ticket [here]"), "no ticket here");
        assert_eq!(clean_message(""), "");
    }

    #[test]
    fn test_default_title() {
        let formatter = AlertFormatter::new(None, utc()).unwrap();
        assert_eq!(formatter.title(&incident()), "Incident acknowledged at 14:05");
    }

    #[test]
    fn test_named_zone() {
        let zone = DisplayZone::from_name(Some("Europe/Copenhagen"));
        assert_eq!(zone, DisplayZone::Named(chrono_tz::Europe::Copenhagen));
        assert_eq!(zone.hh_mm(incident().created_at), "15:05");
    }

    #[test]
    fn test_unknown_zone_is_local() {
        assert_eq!(DisplayZone::from_name(Some("Mars/Olympus")), DisplayZone::Local);
        assert_eq!(DisplayZone::from_name(Some("")), DisplayZone::Local);
        assert_eq!(DisplayZone::from_name(None), DisplayZone::Local);
    }

    #[test]
    fn test_template_title() {
        let formatter = AlertFormatter::new(
            Some("{{service.summary}} {{status}} {{format created_at}}"),
            utc(),
        )
        .unwrap();
        assert_eq!(formatter.title(&incident()), "PaymentsAPI acknowledged 14:05");
    }

    #[test]
    fn test_template_does_not_html_escape() {
        let formatter = AlertFormatter::new(Some("{{summary}}"), utc()).unwrap();
        let incident = incident().with_urgency(Urgency::High);
        assert_eq!(
            formatter.title(&Incident {
                summary: "a & b".to_string(),
                ..incident
            }),
            "a & b"
        );
    }

    #[test]
    fn test_render_failure_falls_back() {
        let formatter = AlertFormatter::new(Some("{{format summary}}"), utc()).unwrap();
        assert_eq!(formatter.title(&incident()), "Incident acknowledged at 14:05");
    }

    #[test]
    fn test_invalid_template_is_rejected() {
        assert!(matches!(
            AlertFormatter::new(Some("{{#if}}"), utc()),
            Err(ConfigError::Template(_))
        ));
    }

    #[test]
    fn test_alert_event() {
        let formatter = AlertFormatter::new(None, utc()).unwrap();
        let incident = incident()
            .with_urgency(Urgency::High)
            .with_html_url("https://example.pagerduty.com/incidents/PABC");

        match formatter.alert(&incident) {
            NotifyEvent::Incident {
                id,
                title,
                message,
                url,
                urgent,
                ..
            } => {
                assert_eq!(id, "PABC");
                assert_eq!(title, "Incident acknowledged at 14:05");
                assert_eq!(message, "prod timeout connecting to db");
                assert_eq!(
                    url.as_deref(),
                    Some("https://example.pagerduty.com/incidents/PABC")
                );
                assert!(urgent);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_alert_without_url() {
        let formatter = AlertFormatter::default();
        assert_eq!(formatter.alert(&incident()).url(), None);
    }
}
