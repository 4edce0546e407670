//! Core data model: sessions and bookmark rows
//!
//! Field names follow the hosted database's column names (`user_id`,
//! `created_at`) so rows deserialize straight from REST responses and
//! change-feed payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The authenticated identity plus the tokens proving it.
///
/// Owned by a [`SessionStore`](crate::session::SessionStore); the client
/// controller only ever holds a read-only copy.
///
/// # Examples
///
/// ```
/// use bookmark_manager::model::Session;
/// use uuid::Uuid;
///
/// let session = Session {
///     user_id: Uuid::new_v4(),
///     email: "me@example.com".to_string(),
///     access_token: "t1".to_string(),
///     refresh_token: "r1".to_string(),
///     expires_at: None,
/// };
///
/// // A session with no expiry is never considered expired.
/// assert!(!session.is_expired());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Owner id; every bookmark visible to this session carries it.
    pub user_id: Uuid,
    /// Email address of the signed-in account.
    #[serde(default)]
    pub email: String,
    /// Bearer token for data access.
    pub access_token: String,
    /// Token used to obtain a new access token.
    pub refresh_token: String,
    /// When the access token stops being accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Returns `true` when the access token is expired or about to expire.
    ///
    /// A 60-second buffer is applied so the refresh happens before the
    /// backend starts rejecting requests.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            None => false,
            Some(expires_at) => Utc::now() >= expires_at - chrono::Duration::seconds(60),
        }
    }
}

/// A stored bookmark row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    /// Server-assigned unique id.
    pub id: Uuid,
    /// Target URL.
    pub url: String,
    /// Display title.
    pub title: String,
    /// Owner id (equals [`Session::user_id`] of the owner).
    pub user_id: Uuid,
    /// Server-assigned creation time.
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a new bookmark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBookmark {
    pub url: String,
    pub title: String,
    pub user_id: Uuid,
}
