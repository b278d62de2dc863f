//! PagerDuty REST API v2 client.
//!
//! Lists incidents for the sync cycle and resolves configured team, user and
//! service names to ids at startup.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SyncError};
use crate::model::Incident;
use crate::source::{IncidentQuery, IncidentSource, Page, ResolvedScope, PAGE_LIMIT};

/// Public REST endpoint.
pub const DEFAULT_API_URL: &str = "https://api.pagerduty.com";

const ACCEPT_V2: &str = "application/vnd.pagerduty+json;version=2";

/// PagerDuty REST client.
#[derive(Debug, Clone)]
pub struct PagerDutyClient {
    client: reqwest::Client,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct Team {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct User {
    id: String,
    name: String,
    #[serde(default)]
    email: String,
}

#[derive(Debug, Deserialize)]
struct Service {
    id: String,
    name: String,
}

impl PagerDutyClient {
    /// Create a client for the public API.
    ///
    /// # Errors
    /// Returns error if the token is not a valid header value or the HTTP
    /// client cannot be built.
    pub fn new(token: &str) -> Result<Self> {
        Self::with_url(token, DEFAULT_API_URL)
    }

    /// Create a client against a custom API URL.
    ///
    /// # Errors
    /// Same as [`PagerDutyClient::new`].
    pub fn with_url(token: &str, api_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Token token={token}"))
            .map_err(|_| SyncError::Other("Invalid PagerDuty API token".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_V2));

        let client = reqwest::Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// GET `path` and return the array under `key` plus the `more` flag.
    async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        key: &str,
        params: &[(&str, String)],
    ) -> Result<Page<T>> {
        let url = format!("{}/{path}", self.api_url);
        let response = self.client.get(&url).query(params).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, path, "PagerDuty API request failed");
            return Err(SyncError::Api { status, body });
        }

        let mut body: Value = response.json().await?;
        let more = body.get("more").and_then(Value::as_bool).unwrap_or(false);
        let items = match body.get_mut(key) {
            Some(items) => serde_json::from_value(items.take())?,
            None => Vec::new(),
        };

        Ok(Page { items, more })
    }

    /// Walk every page of a listing.
    async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        key: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let mut all = Vec::new();
        let mut offset = 0;
        loop {
            let mut page_params = params.to_vec();
            page_params.push(("limit", PAGE_LIMIT.to_string()));
            page_params.push(("offset", offset.to_string()));

            let page: Page<T> = self.get_page(path, key, &page_params).await?;
            debug!(path, offset, count = page.items.len(), more = page.more, "Fetched page");
            all.extend(page.items);
            if !page.more {
                return Ok(all);
            }
            offset += PAGE_LIMIT;
        }
    }

    /// Resolve configured names to ids.
    ///
    /// Teams match on name, users on email or name, services on exact name.
    /// Empty name lists skip the corresponding lookup. Any configured name
    /// with no match is an error, since dropping it would widen the query.
    #[instrument(
        skip_all,
        fields(teams = teams.len(), users = users.len(), services = services.len())
    )]
    pub async fn resolve_scope(
        &self,
        teams: &[String],
        users: &[String],
        services: &[String],
    ) -> Result<ResolvedScope> {
        let mut scope = ResolvedScope::default();

        if !teams.is_empty() {
            let listed: Vec<Team> = self
                .get_all("teams", "teams", &[])
                .await
                .map_err(|e| resolve_error("teams", e))?;
            let mut missing = Vec::new();
            for name in teams {
                let ids = listed.iter().filter(|t| &t.name == name).map(|t| &t.id);
                collect_match("team", name, ids, &mut scope.team_ids, &mut missing);
            }
            ensure_resolved("teams", missing)?;
        }

        if !users.is_empty() {
            let listed: Vec<User> = self
                .get_all("users", "users", &[])
                .await
                .map_err(|e| resolve_error("users", e))?;
            let mut missing = Vec::new();
            for name in users {
                let ids = listed
                    .iter()
                    .filter(|u| &u.email == name || &u.name == name)
                    .map(|u| &u.id);
                collect_match("user", name, ids, &mut scope.user_ids, &mut missing);
            }
            ensure_resolved("users", missing)?;
        }

        let mut missing = Vec::new();
        for name in services {
            let listed: Vec<Service> = self
                .get_all("services", "services", &[("query", name.clone())])
                .await
                .map_err(|e| resolve_error("services", e))?;
            let ids = listed.iter().filter(|s| &s.name == name).map(|s| &s.id);
            collect_match("service", name, ids, &mut scope.service_ids, &mut missing);
        }
        ensure_resolved("services", missing)?;

        dedup(&mut scope.team_ids);
        dedup(&mut scope.user_ids);
        dedup(&mut scope.service_ids);

        Ok(scope)
    }
}

fn resolve_error(kind: &'static str, source: SyncError) -> SyncError {
    SyncError::Resolve {
        kind,
        source: Box::new(source),
    }
}

/// Append the ids found for `name`, or record it as missing.
fn collect_match<'a>(
    kind: &str,
    name: &str,
    ids: impl Iterator<Item = &'a String>,
    resolved: &mut Vec<String>,
    missing: &mut Vec<String>,
) {
    let before = resolved.len();
    for id in ids {
        info!(kind, name, id = %id, "Found");
        resolved.push(id.clone());
    }
    if resolved.len() == before {
        warn!(kind, name, "No match in PagerDuty");
        missing.push(name.to_string());
    }
}

fn ensure_resolved(kind: &'static str, missing: Vec<String>) -> Result<()> {
    if missing.is_empty() {
        Ok(())
    } else {
        Err(SyncError::Unresolved {
            kind,
            names: missing,
        })
    }
}

fn dedup(ids: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(id.clone()));
}

fn incident_params(query: &IncidentQuery, offset: u32, limit: u32) -> Vec<(&'static str, String)> {
    let mut params = vec![(
        "since",
        query
            .since
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    )];
    params.extend(query.statuses.iter().map(|s| ("statuses[]", s.as_str().to_string())));
    params.extend(query.team_ids.iter().map(|id| ("team_ids[]", id.clone())));
    params.extend(query.user_ids.iter().map(|id| ("user_ids[]", id.clone())));
    params.extend(query.service_ids.iter().map(|id| ("service_ids[]", id.clone())));
    params.push(("sort_by", "created_at:ASC".to_string()));
    params.push(("time_zone", "UTC".to_string()));
    params.push(("limit", limit.to_string()));
    params.push(("offset", offset.to_string()));
    params
}

#[async_trait]
impl IncidentSource for PagerDutyClient {
    #[instrument(skip(self, query), fields(since = %query.since))]
    async fn fetch_page(
        &self,
        query: &IncidentQuery,
        offset: u32,
        limit: u32,
    ) -> Result<Page<Incident>> {
        let params = incident_params(query, offset, limit);
        let page: Page<Incident> = self.get_page("incidents", "incidents", &params).await?;
        debug!(count = page.items.len(), more = page.more, "Got incidents");
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::incidents_since;
    use chrono::{TimeZone, Utc};
    use futures::TryStreamExt;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn incident_json(id: &str, created_at: &str) -> Value {
        json!({
            "id": id,
            "summary": format!("[#1] {id}"),
            "status": "triggered",
            "urgency": "high",
            "created_at": created_at,
            "service": {"id": "S1", "summary": "PaymentsAPI"},
            "teams": [{"id": "T1", "summary": "OnCall"}],
            "html_url": format!("https://example.pagerduty.com/incidents/{id}")
        })
    }

    #[test]
    fn test_incident_params() {
        let since = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let scope = ResolvedScope {
            team_ids: vec!["T1".to_string()],
            user_ids: vec![],
            service_ids: vec!["S1".to_string(), "S2".to_string()],
        };
        let params = incident_params(&scope.query(since), 50, 25);

        assert_eq!(params[0], ("since", "2024-03-09T14:05:07Z".to_string()));
        assert_eq!(
            params.iter().filter(|(k, _)| *k == "statuses[]").count(),
            3
        );
        assert!(params.contains(&("team_ids[]", "T1".to_string())));
        assert!(params.contains(&("service_ids[]", "S2".to_string())));
        assert!(!params.iter().any(|(k, _)| *k == "user_ids[]"));
        assert!(params.contains(&("sort_by", "created_at:ASC".to_string())));
        assert!(params.contains(&("offset", "50".to_string())));
    }

    #[test]
    fn test_rejects_unprintable_token() {
        assert!(PagerDutyClient::new("bad\ntoken").is_err());
    }

    #[tokio::test]
    async fn test_incidents_paginate_in_order() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/incidents"))
            .and(header("authorization", "Token token=secret"))
            .and(header("accept", ACCEPT_V2))
            .and(query_param("offset", "0"))
            .and(query_param("sort_by", "created_at:ASC"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "incidents": [
                    incident_json("P1", "2024-03-09T10:00:00Z"),
                    incident_json("P2", "2024-03-09T10:01:00Z"),
                ],
                "limit": 25,
                "offset": 0,
                "more": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/incidents"))
            .and(query_param("offset", "25"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "incidents": [incident_json("P3", "2024-03-09T10:02:00Z")],
                "limit": 25,
                "offset": 25,
                "more": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = PagerDutyClient::with_url("secret", &server.uri()).unwrap();
        let query = IncidentQuery::since(Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap());
        let incidents: Vec<Incident> =
            incidents_since(&client, &query).try_collect().await.unwrap();

        let ids: Vec<_> = incidents.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["P1", "P2", "P3"]);
        assert!(incidents[0].is_urgent());
        assert_eq!(incidents[2].service.name, "PaymentsAPI");
    }

    #[tokio::test]
    async fn test_api_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/incidents"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let client = PagerDutyClient::with_url("wrong", &server.uri()).unwrap();
        let query = IncidentQuery::since(Utc::now());
        let result = client.fetch_page(&query, 0, PAGE_LIMIT).await;

        match result {
            Err(SyncError::Api { status, body }) => {
                assert_eq!(status.as_u16(), 401);
                assert_eq!(body, "unauthorized");
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_resolve_scope() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/teams"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "teams": [
                    {"id": "T1", "name": "Platform"},
                    {"id": "T2", "name": "Data"}
                ],
                "more": false
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "users": [
                    {"id": "U1", "name": "Alice", "email": "alice@example.com"},
                    {"id": "U2", "name": "Bob", "email": "bob@example.com"}
                ],
                "more": false
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/services"))
            .and(query_param("query", "PaymentsAPI"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "services": [
                    {"id": "S1", "name": "PaymentsAPI"},
                    {"id": "S9", "name": "PaymentsAPI Staging"}
                ],
                "more": false
            })))
            .mount(&server)
            .await;

        let client = PagerDutyClient::with_url("secret", &server.uri()).unwrap();
        let scope = client
            .resolve_scope(
                &["Platform".to_string()],
                &["alice@example.com".to_string(), "Bob".to_string()],
                &["PaymentsAPI".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(scope.team_ids, vec!["T1"]);
        assert_eq!(scope.user_ids, vec!["U1", "U2"]);
        assert_eq!(scope.service_ids, vec!["S1"]);
    }

    async fn mount_teams(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/teams"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "teams": [{"id": "T2", "name": "Data"}],
                "more": false
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_unknown_name_among_known_is_an_error() {
        let server = MockServer::start().await;
        mount_teams(&server).await;

        let client = PagerDutyClient::with_url("secret", &server.uri()).unwrap();
        let err = client
            .resolve_scope(&["Data".to_string(), "Missing".to_string()], &[], &[])
            .await
            .unwrap_err();

        match err {
            SyncError::Unresolved { kind, names } => {
                assert_eq!(kind, "teams");
                assert_eq!(names, vec!["Missing"]);
            }
            other => panic!("expected unresolved teams, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_misspelled_teams_never_widen_the_query() {
        let server = MockServer::start().await;
        mount_teams(&server).await;

        let client = PagerDutyClient::with_url("secret", &server.uri()).unwrap();
        let result = client.resolve_scope(&["Platfrom".to_string()], &[], &[]).await;

        assert!(matches!(
            result,
            Err(SyncError::Unresolved { kind: "teams", .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_service_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/services"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "services": [{"id": "S9", "name": "PaymentsAPI Staging"}],
                "more": false
            })))
            .mount(&server)
            .await;

        let client = PagerDutyClient::with_url("secret", &server.uri()).unwrap();
        let err = client
            .resolve_scope(&[], &[], &["PaymentsAPI".to_string()])
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "No PagerDuty services named PaymentsAPI");
    }

    #[tokio::test]
    async fn test_resolve_failure_names_the_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/teams"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = PagerDutyClient::with_url("secret", &server.uri()).unwrap();
        let err = client
            .resolve_scope(&["Platform".to_string()], &[], &[])
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Resolve { kind: "teams", .. }));
    }

    #[tokio::test]
    async fn test_empty_names_skip_lookups() {
        let server = MockServer::start().await;
        let client = PagerDutyClient::with_url("secret", &server.uri()).unwrap();

        let scope = client.resolve_scope(&[], &[], &[]).await.unwrap();
        assert_eq!(scope, ResolvedScope::default());
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
