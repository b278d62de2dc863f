//! Incident source seam and pagination.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream, TryStreamExt};

use crate::error::{Result, SyncError};
use crate::model::{Incident, IncidentStatus};

/// Page size used when listing incidents.
pub const PAGE_LIMIT: u32 = 25;

/// Filters passed to every incident listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentQuery {
    /// Lower bound on `created_at`, inclusive.
    pub since: DateTime<Utc>,
    pub statuses: Vec<IncidentStatus>,
    pub team_ids: Vec<String>,
    pub user_ids: Vec<String>,
    pub service_ids: Vec<String>,
}

impl IncidentQuery {
    /// Query for every status with no id filters.
    #[must_use]
    pub fn since(since: DateTime<Utc>) -> Self {
        Self {
            since,
            statuses: IncidentStatus::ALL.to_vec(),
            team_ids: Vec::new(),
            user_ids: Vec::new(),
            service_ids: Vec::new(),
        }
    }
}

/// Provider ids the configured team, user and service names resolved to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedScope {
    pub team_ids: Vec<String>,
    pub user_ids: Vec<String>,
    pub service_ids: Vec<String>,
}

impl ResolvedScope {
    /// Incident query restricted to these ids.
    #[must_use]
    pub fn query(&self, since: DateTime<Utc>) -> IncidentQuery {
        IncidentQuery {
            team_ids: self.team_ids.clone(),
            user_ids: self.user_ids.clone(),
            service_ids: self.service_ids.clone(),
            ..IncidentQuery::since(since)
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Whether the provider has more items after this page.
    pub more: bool,
}

/// Anything that can list incidents one page at a time.
#[async_trait]
pub trait IncidentSource: Send + Sync {
    /// Fetch one page of incidents ordered by ascending `created_at`.
    async fn fetch_page(
        &self,
        query: &IncidentQuery,
        offset: u32,
        limit: u32,
    ) -> Result<Page<Incident>>;
}

/// Stream every incident matching `query`, page by page.
///
/// The stream starts at offset 0 on every call and ends after the first page
/// reporting `more == false`. An error ends the stream after it is yielded.
pub fn incidents_since<'a, S>(
    source: &'a S,
    query: &'a IncidentQuery,
) -> impl Stream<Item = Result<Incident>> + Send + 'a
where
    S: IncidentSource + ?Sized,
{
    stream::try_unfold(Some(0u32), move |offset| async move {
        let Some(offset) = offset else {
            return Ok(None);
        };
        let page = source.fetch_page(query, offset, PAGE_LIMIT).await?;
        let next = page.more.then_some(offset + PAGE_LIMIT);
        Ok::<_, SyncError>(Some((page.items, next)))
    })
    .map_ok(|items| stream::iter(items.into_iter().map(Ok::<_, SyncError>)))
    .try_flatten()
}
