//! In-memory session and bookmark stores
//!
//! These implement the same contracts as the hosted backend and are used for
//! offline runs (`backend.kind: memory`) and tests:
//!
//! - [`MemorySessionStore`] keeps the current session in its auth-state
//!   channel and honours single-use authorization codes.
//! - [`MemoryBookmarkStore`] keeps rows in a `Vec`, enforces ownership, and
//!   pushes [`ChangeEvent`]s to owner-filtered subscribers.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use url::Url;
use uuid::Uuid;

use crate::error::{BookmarkError, Result};
use crate::model::{Bookmark, NewBookmark, Session};
use crate::pkce;
use crate::session::{OAuthRedirect, OAuthSignInRequest, SessionStore};
use crate::store::{BookmarkStore, ChangeEvent, Subscription, SubscriptionHandle};

/// Account the memory backend signs in as when asked to start an OAuth
/// redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    pub user_id: Uuid,
    pub email: String,
}

#[derive(Debug)]
struct PendingCode {
    session: Session,
    challenge: Option<String>,
}

/// Session store that lives entirely in process memory.
#[derive(Debug)]
pub struct MemorySessionStore {
    codes: Mutex<HashMap<String, PendingCode>>,
    changes: watch::Sender<Option<Session>>,
    identity: Option<LocalIdentity>,
}

impl MemorySessionStore {
    /// Creates a signed-out store with no sign-in identity.
    pub fn new() -> Self {
        let (changes, _) = watch::channel(None);
        Self {
            codes: Mutex::new(HashMap::new()),
            changes,
            identity: None,
        }
    }

    /// Creates a store already holding `session`.
    pub fn with_session(session: Session) -> Self {
        let store = Self::new();
        store.changes.send_replace(Some(session));
        store
    }

    /// Lets [`SessionStore::begin_oauth_sign_in`] complete immediately by
    /// minting a code for `identity`.
    pub fn with_local_identity(mut self, identity: LocalIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Makes `code` exchangeable (once) for `session`.
    pub fn register_code(&self, code: &str, session: Session) {
        self.lock_codes().insert(
            code.to_string(),
            PendingCode {
                session,
                challenge: None,
            },
        );
    }

    fn lock_codes(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingCode>> {
        self.codes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    async fn current_session(&self) -> Result<Option<Session>> {
        Ok(self.changes.borrow().clone())
    }

    async fn begin_oauth_sign_in(&self, request: &OAuthSignInRequest) -> Result<OAuthRedirect> {
        let identity = self.identity.clone().ok_or_else(|| {
            BookmarkError::Auth("memory backend has no local identity configured".to_string())
        })?;

        let pkce = pkce::generate();
        let code = Uuid::new_v4().simple().to_string();
        let session = Session {
            user_id: identity.user_id,
            email: identity.email,
            access_token: Uuid::new_v4().simple().to_string(),
            refresh_token: Uuid::new_v4().simple().to_string(),
            expires_at: None,
        };
        self.lock_codes().insert(
            code.clone(),
            PendingCode {
                session,
                challenge: Some(pkce.challenge),
            },
        );

        let mut url: Url = request.redirect_to.clone();
        url.query_pairs_mut().append_pair("code", &code);
        tracing::debug!(provider = %request.provider, "minted local authorization code");

        Ok(OAuthRedirect {
            url,
            code_verifier: Some(pkce.verifier),
        })
    }

    async fn exchange_code_for_session(
        &self,
        code: &str,
        code_verifier: Option<String>,
    ) -> Result<Session> {
        let pending = self.lock_codes().remove(code).ok_or_else(|| {
            BookmarkError::AuthExchange {
                status: 400,
                message: "invalid or already used authorization code".to_string(),
            }
        })?;

        if let Some(challenge) = pending.challenge {
            let presented = code_verifier.as_deref().map(pkce::challenge_for);
            if presented.as_deref() != Some(challenge.as_str()) {
                return Err(BookmarkError::AuthExchange {
                    status: 400,
                    message: "code verifier does not match".to_string(),
                }
                .into());
            }
        }

        self.changes.send_replace(Some(pending.session.clone()));
        Ok(pending.session)
    }

    async fn sign_out(&self) -> Result<()> {
        self.changes.send_replace(None);
        Ok(())
    }

    fn auth_state_changes(&self) -> watch::Receiver<Option<Session>> {
        self.changes.subscribe()
    }
}

#[derive(Debug, Default)]
struct MemoryRows {
    rows: Vec<Bookmark>,
    subscribers: HashMap<Uuid, (Uuid, mpsc::UnboundedSender<ChangeEvent>)>,
    last_created_at: Option<DateTime<Utc>>,
}

impl MemoryRows {
    fn notify(&mut self, owner: Uuid, event: &ChangeEvent) {
        self.subscribers.retain(|_, (subscriber_owner, tx)| {
            *subscriber_owner != owner || tx.send(event.clone()).is_ok()
        });
    }

    /// Creation times are strictly increasing so ordering stays total even
    /// when two inserts land within the clock's resolution.
    fn next_created_at(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let created_at = match self.last_created_at {
            Some(last) if now <= last => last + chrono::Duration::microseconds(1),
            _ => now,
        };
        self.last_created_at = Some(created_at);
        created_at
    }
}

/// Bookmark store that lives entirely in process memory.
///
/// # Examples
///
/// ```
/// use bookmark_manager::memory::MemoryBookmarkStore;
/// use bookmark_manager::model::{NewBookmark, Session};
/// use bookmark_manager::store::{BookmarkStore, ChangeEvent};
/// use uuid::Uuid;
///
/// # tokio_test::block_on(async {
/// let session = Session {
///     user_id: Uuid::new_v4(),
///     email: "me@example.com".to_string(),
///     access_token: "t1".to_string(),
///     refresh_token: "r1".to_string(),
///     expires_at: None,
/// };
/// let store = MemoryBookmarkStore::new();
/// let mut subscription = store.subscribe(&session).await.unwrap();
///
/// store
///     .insert(&session, NewBookmark {
///         url: "https://www.rust-lang.org".to_string(),
///         title: "Rust".to_string(),
///         user_id: session.user_id,
///     })
///     .await
///     .unwrap();
///
/// assert!(matches!(subscription.events.recv().await, Some(ChangeEvent::Insert(_))));
/// store.unsubscribe(subscription.handle).await.unwrap();
/// # });
/// ```
#[derive(Debug, Default)]
pub struct MemoryBookmarkStore {
    inner: Mutex<MemoryRows>,
}

impl MemoryBookmarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `rows`. No change events are sent.
    pub fn with_rows(rows: Vec<Bookmark>) -> Self {
        let last_created_at = rows.iter().map(|row| row.created_at).max();
        Self {
            inner: Mutex::new(MemoryRows {
                rows,
                subscribers: HashMap::new(),
                last_created_at,
            }),
        }
    }

    /// Number of subscriptions currently open.
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Number of stored rows across all owners.
    pub fn row_count(&self) -> usize {
        self.lock().rows.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryRows> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl BookmarkStore for MemoryBookmarkStore {
    async fn select(&self, session: &Session) -> Result<Vec<Bookmark>> {
        let mut rows: Vec<Bookmark> = self
            .lock()
            .rows
            .iter()
            .filter(|row| row.user_id == session.user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn insert(&self, session: &Session, row: NewBookmark) -> Result<()> {
        if row.user_id != session.user_id {
            return Err(BookmarkError::Store(
                "row owner does not match the signed-in user".to_string(),
            )
            .into());
        }

        let mut inner = self.lock();
        let bookmark = Bookmark {
            id: Uuid::new_v4(),
            url: row.url,
            title: row.title,
            user_id: row.user_id,
            created_at: inner.next_created_at(),
        };
        inner.rows.push(bookmark.clone());
        inner.notify(session.user_id, &ChangeEvent::Insert(bookmark));
        Ok(())
    }

    async fn delete(&self, session: &Session, id: Uuid) -> Result<()> {
        let mut inner = self.lock();
        let position = inner
            .rows
            .iter()
            .position(|row| row.id == id && row.user_id == session.user_id);
        if let Some(index) = position {
            inner.rows.remove(index);
            inner.notify(session.user_id, &ChangeEvent::Delete { id });
        }
        Ok(())
    }

    async fn subscribe(&self, session: &Session) -> Result<Subscription> {
        let (tx, events) = mpsc::unbounded_channel();
        let handle = SubscriptionHandle::new(session.user_id, None);
        self.lock()
            .subscribers
            .insert(handle.id(), (session.user_id, tx));
        Ok(Subscription { handle, events })
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()> {
        let removed = self.lock().subscribers.remove(&handle.id());
        let id = handle.id();
        handle.close();
        match removed {
            Some(_) => Ok(()),
            None => Err(BookmarkError::Realtime(format!("unknown subscription {id}")).into()),
        }
    }
}
