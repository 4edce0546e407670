//! Bookmark table access over PostgREST
//!
//! Every request carries the session's access token, so the database's
//! row-level security is what actually scopes rows to their owner. The
//! explicit `user_id=eq.<id>` filters below only narrow what is asked for.

use std::time::Duration;

use uuid::Uuid;

use super::realtime::{self, FeedSettings};
use super::{read_failure, SupabaseClient};
use crate::error::{BookmarkError, Result};
use crate::model::{Bookmark, NewBookmark, Session};
use crate::store::{BookmarkStore, Subscription, SubscriptionHandle};

/// [`BookmarkStore`] backed by a hosted table plus its realtime feed.
#[derive(Debug, Clone)]
pub struct SupabaseBookmarkStore {
    client: SupabaseClient,
    feed: FeedSettings,
}

impl SupabaseBookmarkStore {
    /// Store for `table`, with its change feed at `realtime_path`.
    pub fn new(client: SupabaseClient, table: &str, realtime_path: &str) -> Self {
        Self {
            client,
            feed: FeedSettings {
                path: realtime_path.to_string(),
                table: table.to_string(),
                heartbeat_interval: realtime::DEFAULT_HEARTBEAT_INTERVAL,
            },
        }
    }

    /// Overrides how often the change feed heartbeats.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.feed.heartbeat_interval = interval;
        self
    }

    fn table_url(&self) -> Result<url::Url> {
        self.client.endpoint(&format!("/rest/v1/{}", self.feed.table))
    }

    async fn check(resp: reqwest::Response, action: &str) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let (status, message) = read_failure(resp).await;
        Err(BookmarkError::Store(format!("{action} failed with HTTP {status}: {message}")).into())
    }
}

#[async_trait::async_trait]
impl BookmarkStore for SupabaseBookmarkStore {
    async fn select(&self, session: &Session) -> Result<Vec<Bookmark>> {
        let mut url = self.table_url()?;
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("user_id", &format!("eq.{}", session.user_id))
            .append_pair("order", "created_at.desc");

        let resp = self
            .client
            .request(reqwest::Method::GET, url, Some(&session.access_token))
            .send()
            .await
            .map_err(|e| BookmarkError::Store(format!("select request failed: {e}")))?;
        let resp = Self::check(resp, "select").await?;

        let rows: Vec<Bookmark> = resp
            .json()
            .await
            .map_err(|e| BookmarkError::Store(format!("failed to parse rows: {e}")))?;
        tracing::debug!(count = rows.len(), "fetched bookmarks");
        Ok(rows)
    }

    async fn insert(&self, session: &Session, row: NewBookmark) -> Result<()> {
        let url = self.table_url()?;
        let resp = self
            .client
            .request(reqwest::Method::POST, url, Some(&session.access_token))
            .header("Prefer", "return=minimal")
            .json(&[row])
            .send()
            .await
            .map_err(|e| BookmarkError::Store(format!("insert request failed: {e}")))?;
        Self::check(resp, "insert").await?;
        Ok(())
    }

    async fn delete(&self, session: &Session, id: Uuid) -> Result<()> {
        let mut url = self.table_url()?;
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{id}"))
            .append_pair("user_id", &format!("eq.{}", session.user_id));

        let resp = self
            .client
            .request(reqwest::Method::DELETE, url, Some(&session.access_token))
            .send()
            .await
            .map_err(|e| BookmarkError::Store(format!("delete request failed: {e}")))?;
        Self::check(resp, "delete").await?;
        Ok(())
    }

    async fn subscribe(&self, session: &Session) -> Result<Subscription> {
        realtime::open_feed(&self.client, &self.feed, session).await
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()> {
        tracing::info!(subscription = %handle.id(), owner = %handle.owner(), "change feed closed");
        handle.close();
        Ok(())
    }
}
