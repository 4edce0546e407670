//! Client controller: the session and bookmark synchronization state machine
//!
//! The controller moves through `Loading -> SignedOut | SignedIn` and
//! mediates every user action:
//!
//! - [`ClientController::bootstrap`] resolves the initial state from the
//!   session store.
//! - Entering `SignedIn` opens an owner-scoped change subscription and
//!   fetches the owner's bookmarks. Leaving it (sign-out, identity switch,
//!   [`ClientController::shutdown`]) releases the subscription exactly once.
//! - Adds and deletes go straight to the bookmark store. The local list only
//!   changes when the change feed echoes them back.
//!
//! Every session transition bumps an epoch. Fetch results, insert
//! completions, and feed events tagged with an older epoch are discarded, so
//! nothing from a previous identity leaks into the current one.
//!
//! Observers (the HTML view, the CLI) watch [`ClientController::updates`] and
//! re-render from [`ClientController::state`].

pub mod form;
pub mod list;

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{BookmarkError, Result};
use crate::model::{Bookmark, Session};
use crate::session::{OAuthRedirect, OAuthSignInRequest, SessionStore};
use crate::store::{BookmarkStore, Subscription, SubscriptionHandle};

use form::{AddForm, AddRejection};
use list::BookmarkList;

/// Everything the user sees while signed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedIn {
    /// Read-only copy of the store's session.
    pub session: Session,
    pub bookmarks: BookmarkList,
    pub form: AddForm,
    /// An add is in flight; further submissions are dropped.
    pub adding: bool,
    /// Set when the initial fetch or the change subscription failed, so an
    /// empty list is not mistaken for "no bookmarks yet".
    pub sync_error: Option<String>,
}

impl SignedIn {
    fn new(session: Session) -> Self {
        Self {
            session,
            bookmarks: BookmarkList::default(),
            form: AddForm::default(),
            adding: false,
            sync_error: None,
        }
    }
}

/// Controller state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerState {
    Loading,
    SignedOut,
    SignedIn(SignedIn),
}

/// Result of an add submission that reached the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The insert was accepted by the store. The row appears once the change
    /// feed delivers it.
    Submitted,
    /// Nothing was sent to the store.
    Rejected(AddRejection),
}

/// Instruction to discard all client state and load `location` afresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullReload {
    pub location: String,
}

/// Static controller settings.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Callback URL the OAuth provider returns to.
    pub redirect_to: Url,
    /// Application root loaded after sign-out.
    pub root: String,
}

/// Open change subscription plus the task applying its events.
#[derive(Debug)]
struct LiveFeed {
    handle: Option<SubscriptionHandle>,
    forwarder: JoinHandle<()>,
}

impl LiveFeed {
    fn stop(mut self) -> Option<SubscriptionHandle> {
        self.forwarder.abort();
        self.handle.take()
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

enum AuthTransition {
    Unchanged,
    Refreshed,
    /// Leave the current state; carries the previous user, if any.
    Switch(Option<Uuid>),
}

#[derive(Debug)]
struct Inner {
    state: ControllerState,
    epoch: u64,
    /// Access tokens held by the signed-in identity, including those
    /// replaced by a refresh. Empty while signed out.
    issued_tokens: HashSet<String>,
}

/// The client-side state machine.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use bookmark_manager::controller::{ClientController, ControllerConfig, ControllerState};
/// use bookmark_manager::memory::{MemoryBookmarkStore, MemorySessionStore};
/// use url::Url;
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let controller = ClientController::new(
///     Arc::new(MemorySessionStore::new()),
///     Arc::new(MemoryBookmarkStore::new()),
///     ControllerConfig {
///         redirect_to: Url::parse("http://localhost:3000/auth/callback")?,
///         root: "/".to_string(),
///     },
/// );
/// controller.bootstrap().await?;
/// assert_eq!(controller.state().await, ControllerState::SignedOut);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ClientController {
    sessions: Arc<dyn SessionStore>,
    store: Arc<dyn BookmarkStore>,
    config: ControllerConfig,
    inner: Arc<Mutex<Inner>>,
    feed: Mutex<Option<LiveFeed>>,
    /// Serializes session transitions (bootstrap, auth changes, sign-out,
    /// shutdown).
    transition: Mutex<()>,
    revision: Arc<watch::Sender<u64>>,
}

impl ClientController {
    /// Creates a controller in the `Loading` state.
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        store: Arc<dyn BookmarkStore>,
        config: ControllerConfig,
    ) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            sessions,
            store,
            config,
            inner: Arc::new(Mutex::new(Inner {
                state: ControllerState::Loading,
                epoch: 0,
                issued_tokens: HashSet::new(),
            })),
            feed: Mutex::new(None),
            transition: Mutex::new(()),
            revision: Arc::new(revision),
        }
    }

    /// Snapshot of the current state.
    pub async fn state(&self) -> ControllerState {
        self.inner.lock().await.state.clone()
    }

    /// Cached session, if signed in.
    pub async fn session(&self) -> Option<Session> {
        match &self.inner.lock().await.state {
            ControllerState::SignedIn(signed_in) => Some(signed_in.session.clone()),
            _ => None,
        }
    }

    /// State as seen by a client holding `access_token`.
    ///
    /// While signed in, a client without a token issued to the signed-in
    /// identity sees `SignedOut`.
    pub async fn state_for(&self, access_token: Option<&str>) -> ControllerState {
        let inner = self.inner.lock().await;
        match &inner.state {
            ControllerState::SignedIn(_)
                if !access_token.is_some_and(|token| inner.issued_tokens.contains(token)) =>
            {
                ControllerState::SignedOut
            }
            state => state.clone(),
        }
    }

    /// Cached session, if `access_token` was issued to the signed-in
    /// identity.
    ///
    /// Tokens replaced by a refresh stay recognized until the identity
    /// signs out or changes.
    pub async fn session_for(&self, access_token: &str) -> Option<Session> {
        let inner = self.inner.lock().await;
        match &inner.state {
            ControllerState::SignedIn(signed_in) if inner.issued_tokens.contains(access_token) => {
                Some(signed_in.session.clone())
            }
            _ => None,
        }
    }

    /// Current local list; empty unless signed in.
    pub async fn bookmarks(&self) -> Vec<Bookmark> {
        match &self.inner.lock().await.state {
            ControllerState::SignedIn(signed_in) => signed_in.bookmarks.as_slice().to_vec(),
            _ => Vec::new(),
        }
    }

    /// Receiver whose value changes every time the state does.
    pub fn updates(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Resolves the initial state from the session store.
    ///
    /// Only acts on the first call; later calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns the session store's error after falling back to `SignedOut`.
    pub async fn bootstrap(&self) -> Result<()> {
        let _transition = self.transition.lock().await;
        let loading = matches!(self.inner.lock().await.state, ControllerState::Loading);
        if !loading {
            return Ok(());
        }

        match self.sessions.current_session().await {
            Ok(Some(session)) => {
                self.enter_signed_in(session).await;
                Ok(())
            }
            Ok(None) => {
                self.enter_signed_out().await;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "session lookup failed, starting signed out");
                self.enter_signed_out().await;
                Err(e)
            }
        }
    }

    /// Reacts to a session change reported by the session store.
    ///
    /// A new session for the same user only refreshes the cached copy. Any
    /// other change re-enters the matching state, re-establishing the fetch
    /// and subscription for a new identity.
    pub async fn handle_auth_change(&self, session: Option<Session>) {
        let _transition = self.transition.lock().await;

        let transition = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            match (&mut inner.state, &session) {
                (ControllerState::SignedIn(signed_in), Some(next))
                    if signed_in.session.user_id == next.user_id =>
                {
                    signed_in.session = next.clone();
                    inner.issued_tokens.insert(next.access_token.clone());
                    AuthTransition::Refreshed
                }
                (ControllerState::SignedIn(signed_in), _) => {
                    AuthTransition::Switch(Some(signed_in.session.user_id))
                }
                (ControllerState::SignedOut, None) => AuthTransition::Unchanged,
                _ => AuthTransition::Switch(None),
            }
        };

        match (transition, session) {
            (AuthTransition::Unchanged, _) => {}
            (AuthTransition::Refreshed, _) => {
                debug!("session refreshed");
                self.bump();
            }
            (AuthTransition::Switch(previous), Some(next)) => {
                if let Some(previous) = previous {
                    info!(from = %previous, to = %next.user_id, "signed-in identity changed");
                }
                self.enter_signed_in(next).await;
            }
            (AuthTransition::Switch(_), None) => self.enter_signed_out().await,
        }
    }

    /// Spawns a task that feeds every session store change into
    /// [`ClientController::handle_auth_change`].
    ///
    /// The task ends when the session store is dropped; abort the returned
    /// handle to stop it earlier.
    pub fn watch_auth_changes(self: &Arc<Self>) -> JoinHandle<()> {
        let mut changes = self.sessions.auth_state_changes();
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let session = changes.borrow_and_update().clone();
                controller.handle_auth_change(session).await;
            }
        })
    }

    /// Starts a Google sign-in that always shows the account chooser.
    ///
    /// Returns where to send the browser.
    pub async fn sign_in(&self) -> Result<OAuthRedirect> {
        let request = OAuthSignInRequest::google(self.config.redirect_to.clone());
        self.sessions.begin_oauth_sign_in(&request).await
    }

    /// Signs out and clears all local state.
    ///
    /// Local state is cleared even when the session store fails to end the
    /// remote session. The caller must perform the returned full reload.
    pub async fn sign_out(&self) -> FullReload {
        let _transition = self.transition.lock().await;
        if let Err(e) = self.sessions.sign_out().await {
            warn!(error = %e, "sign-out request failed, clearing local state anyway");
        }
        self.enter_signed_out().await;
        FullReload {
            location: self.config.root.clone(),
        }
    }

    /// Replaces the add-form fields.
    ///
    /// # Errors
    ///
    /// Returns [`BookmarkError::NotSignedIn`] outside the `SignedIn` state.
    pub async fn set_form(&self, title: impl Into<String>, url: impl Into<String>) -> Result<()> {
        {
            let mut inner = self.inner.lock().await;
            let ControllerState::SignedIn(signed_in) = &mut inner.state else {
                return Err(BookmarkError::NotSignedIn.into());
            };
            signed_in.form = AddForm {
                title: title.into(),
                url: url.into(),
            };
        }
        self.bump();
        Ok(())
    }

    /// Submits the add form.
    ///
    /// The submission is dropped while another one is in flight and rejected
    /// when a field is blank or the URL is not absolute. On success the form
    /// is cleared; on failure it keeps its contents for a manual retry.
    ///
    /// # Errors
    ///
    /// Returns [`BookmarkError::NotSignedIn`] outside the `SignedIn` state
    /// and the store's error when the insert fails.
    pub async fn add_bookmark(&self) -> Result<AddOutcome> {
        let (epoch, session, row) = {
            let mut inner = self.inner.lock().await;
            let epoch = inner.epoch;
            let ControllerState::SignedIn(signed_in) = &mut inner.state else {
                return Err(BookmarkError::NotSignedIn.into());
            };
            if signed_in.adding {
                debug!("add already in flight, dropping submission");
                return Ok(AddOutcome::Rejected(AddRejection::InFlight));
            }
            let row = match signed_in.form.to_row(signed_in.session.user_id) {
                Ok(row) => row,
                Err(rejection) => return Ok(AddOutcome::Rejected(rejection)),
            };
            signed_in.adding = true;
            (epoch, signed_in.session.clone(), row)
        };
        self.bump();

        let result = self.store.insert(&session, row).await;

        {
            let mut inner = self.inner.lock().await;
            if inner.epoch == epoch {
                if let ControllerState::SignedIn(signed_in) = &mut inner.state {
                    signed_in.adding = false;
                    if result.is_ok() {
                        signed_in.form.clear();
                    }
                }
            }
        }
        self.bump();

        match result {
            Ok(()) => Ok(AddOutcome::Submitted),
            Err(e) => {
                warn!(error = %e, "insert failed, keeping form for retry");
                Err(e)
            }
        }
    }

    /// Deletes one of the owner's bookmarks.
    ///
    /// The local list is left alone; the row disappears when the change feed
    /// reports the delete.
    ///
    /// # Errors
    ///
    /// Returns [`BookmarkError::NotSignedIn`] outside the `SignedIn` state
    /// and the store's error when the delete fails.
    pub async fn delete_bookmark(&self, id: Uuid) -> Result<()> {
        let session = self.session().await.ok_or(BookmarkError::NotSignedIn)?;
        self.store.delete(&session, id).await.map_err(|e| {
            warn!(bookmark = %id, error = %e, "delete failed");
            e
        })
    }

    /// Releases the change subscription. Call before discarding the
    /// controller.
    pub async fn shutdown(&self) {
        let _transition = self.transition.lock().await;
        self.close_feed().await;
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    async fn enter_signed_in(&self, session: Session) {
        self.close_feed().await;

        let epoch = {
            let mut inner = self.inner.lock().await;
            inner.epoch += 1;
            inner.state = ControllerState::SignedIn(SignedIn::new(session.clone()));
            inner.issued_tokens = HashSet::from([session.access_token.clone()]);
            inner.epoch
        };
        info!(user = %session.user_id, "signed in");
        self.bump();

        match self.store.subscribe(&session).await {
            Ok(subscription) => {
                let feed = self.spawn_feed(epoch, subscription);
                *self.feed.lock().await = Some(feed);
            }
            Err(e) => {
                warn!(error = %e, "could not open change subscription");
                self.record_sync_error(epoch, format!("Live updates unavailable: {e}"))
                    .await;
            }
        }

        match self.store.select(&session).await {
            Ok(rows) => {
                let mut inner = self.inner.lock().await;
                if inner.epoch == epoch {
                    if let ControllerState::SignedIn(signed_in) = &mut inner.state {
                        debug!(count = rows.len(), "loaded bookmarks");
                        signed_in.bookmarks.replace(rows);
                    }
                }
                drop(inner);
                self.bump();
            }
            Err(e) => {
                warn!(error = %e, "could not load bookmarks");
                self.record_sync_error(epoch, format!("Could not load bookmarks: {e}"))
                    .await;
            }
        }
    }

    async fn enter_signed_out(&self) {
        self.close_feed().await;
        {
            let mut inner = self.inner.lock().await;
            inner.epoch += 1;
            inner.state = ControllerState::SignedOut;
            inner.issued_tokens.clear();
        }
        info!("signed out");
        self.bump();
    }

    fn spawn_feed(&self, epoch: u64, subscription: Subscription) -> LiveFeed {
        let Subscription { handle, mut events } = subscription;
        let inner = Arc::clone(&self.inner);
        let revision = Arc::clone(&self.revision);

        let forwarder = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                debug!(row = %event.id(), ?event, "change event");
                let changed = {
                    let mut inner = inner.lock().await;
                    if inner.epoch != epoch {
                        break;
                    }
                    match &mut inner.state {
                        ControllerState::SignedIn(signed_in) => signed_in.bookmarks.apply(&event),
                        _ => break,
                    }
                };
                if changed {
                    revision.send_modify(|r| *r += 1);
                }
            }
            debug!("change feed forwarder finished");
        });

        LiveFeed {
            handle: Some(handle),
            forwarder,
        }
    }

    async fn close_feed(&self) {
        let feed = self.feed.lock().await.take();
        let Some(handle) = feed.and_then(LiveFeed::stop) else {
            return;
        };
        let id = handle.id();
        match self.store.unsubscribe(handle).await {
            Ok(()) => debug!(subscription = %id, "change subscription closed"),
            Err(e) => warn!(subscription = %id, error = %e, "failed to close change subscription"),
        }
    }

    async fn record_sync_error(&self, epoch: u64, message: String) {
        {
            let mut inner = self.inner.lock().await;
            if inner.epoch != epoch {
                return;
            }
            if let ControllerState::SignedIn(signed_in) = &mut inner.state {
                signed_in.sync_error = Some(message);
            }
        }
        self.bump();
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }
}
