//! Hosted backend (Supabase) client
//!
//! The backend is consumed through three surfaces sharing one
//! [`SupabaseClient`]:
//!
//! - [`auth`]     -- GoTrue endpoints behind [`SessionStore`](crate::session::SessionStore)
//! - [`rest`]     -- PostgREST table access behind [`BookmarkStore`](crate::store::BookmarkStore)
//! - [`realtime`] -- the change feed, a Phoenix channel over a websocket

pub mod auth;
pub mod realtime;
pub mod rest;

use std::sync::Arc;

use serde::Deserialize;
use url::Url;

use crate::error::{BookmarkError, Result};

/// Shared HTTP client plus project URL and public API key.
///
/// Cloning is cheap; all clones share one connection pool.
#[derive(Debug, Clone)]
pub struct SupabaseClient {
    http: Arc<reqwest::Client>,
    base_url: Url,
    anon_key: String,
}

impl SupabaseClient {
    /// Creates a client for the project at `base_url`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bookmark_manager::supabase::SupabaseClient;
    ///
    /// let client = SupabaseClient::new("https://abcd.supabase.co", "anon-key").unwrap();
    /// assert_eq!(
    ///     client.endpoint("/rest/v1/bookmarks").unwrap().as_str(),
    ///     "https://abcd.supabase.co/rest/v1/bookmarks"
    /// );
    /// ```
    pub fn new(base_url: &str, anon_key: &str) -> Result<Self> {
        Self::with_http(Arc::new(reqwest::Client::new()), base_url, anon_key)
    }

    /// Creates a client that reuses an existing `reqwest::Client`.
    pub fn with_http(http: Arc<reqwest::Client>, base_url: &str, anon_key: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| BookmarkError::Config(format!("invalid backend URL {base_url}: {e}")))?;
        Ok(Self {
            http,
            base_url,
            anon_key: anon_key.to_string(),
        })
    }

    /// Resolves `path` against the project URL.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| BookmarkError::Config(format!("invalid endpoint path {path}: {e}")).into())
    }

    /// Public API key sent with every call.
    pub(crate) fn anon_key(&self) -> &str {
        &self.anon_key
    }

    /// Request carrying the API key and, if given, a bearer token.
    pub(crate) fn request(
        &self,
        method: reqwest::Method,
        url: Url,
        access_token: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let bearer = access_token.unwrap_or(&self.anon_key);
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }
}

/// Error body shapes returned by the backend's services.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Reads a failed response into `(status, message)`.
pub(crate) async fn read_failure(resp: reqwest::Response) -> (u16, String) {
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
    let message = body
        .error_description
        .or(body.msg)
        .or(body.message)
        .or(body.error)
        .unwrap_or(text);
    (status, message)
}
