//! Bookmark store abstraction and change-feed types
//!
//! [`BookmarkStore`] is the row-oriented contract consumed from the hosted
//! database: owner-scoped select, insert, delete, and a change subscription.
//!
//! # Subscription lifecycle
//!
//! [`BookmarkStore::subscribe`] returns a [`Subscription`]: the inbound
//! [`ChangeEvent`] receiver plus a [`SubscriptionHandle`]. The handle must be
//! given back through [`BookmarkStore::unsubscribe`] exactly once. Because
//! `unsubscribe` takes the handle by value it cannot be released twice, and
//! dropping a handle without unsubscribing still aborts its transport task.
//! A transport that can leave its channel cleanly registers a stop signal
//! with [`SubscriptionHandle::with_stop`]; [`SubscriptionHandle::close`] then
//! lets the task finish instead of aborting it.

use std::fmt;

use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{BookmarkError, Result};
use crate::model::{Bookmark, NewBookmark, Session};

/// A row-level change delivered by the change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Insert(Bookmark),
    Update(Bookmark),
    Delete { id: Uuid },
}

impl ChangeEvent {
    /// Id of the row the event refers to.
    pub fn id(&self) -> Uuid {
        match self {
            ChangeEvent::Insert(row) | ChangeEvent::Update(row) => row.id,
            ChangeEvent::Delete { id } => *id,
        }
    }
}

/// The `data` object of a realtime `postgres_changes` message.
#[derive(Debug, Deserialize)]
struct PostgresChange {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    record: Option<serde_json::Value>,
    #[serde(default)]
    old_record: Option<serde_json::Value>,
    #[serde(default)]
    errors: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct OldRow {
    id: Uuid,
}

/// Decodes the `data` object of a `postgres_changes` message.
///
/// Returns `Ok(None)` for change types the application does not track.
///
/// # Errors
///
/// Fails when the change carries server-side errors or a row that does not
/// decode as a [`Bookmark`].
///
/// # Examples
///
/// ```
/// use bookmark_manager::store::{parse_change_event, ChangeEvent};
///
/// let data = serde_json::json!({
///     "type": "DELETE",
///     "table": "bookmarks",
///     "record": {},
///     "old_record": { "id": "0b6d7c3e-2f59-4f55-9c3c-2a3e8a0c5b11" },
///     "errors": null
/// });
/// let event = parse_change_event(&data).unwrap();
/// assert!(matches!(event, Some(ChangeEvent::Delete { .. })));
/// ```
pub fn parse_change_event(data: &serde_json::Value) -> Result<Option<ChangeEvent>> {
    let change = PostgresChange::deserialize(data)?;
    if let Some(errors) = change.errors {
        return Err(BookmarkError::Realtime(format!("change carried errors: {errors}")).into());
    }
    let event = match change.kind.as_str() {
        "INSERT" => Some(ChangeEvent::Insert(Bookmark::deserialize(
            &change.record.unwrap_or_default(),
        )?)),
        "UPDATE" => Some(ChangeEvent::Update(Bookmark::deserialize(
            &change.record.unwrap_or_default(),
        )?)),
        "DELETE" => {
            let old = OldRow::deserialize(&change.old_record.unwrap_or_default())?;
            Some(ChangeEvent::Delete { id: old.id })
        }
        _ => None,
    };
    Ok(event)
}

/// Releasable reference to an open change subscription.
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: Uuid,
    owner: Uuid,
    task: Option<JoinHandle<()>>,
    stop: Option<oneshot::Sender<()>>,
}

impl SubscriptionHandle {
    /// Creates a handle. `task` is the transport task feeding the
    /// subscription, if the store runs one.
    pub fn new(owner: Uuid, task: Option<JoinHandle<()>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            task,
            stop: None,
        }
    }

    /// Registers a signal that asks the transport task to shut down on its
    /// own when the handle is closed.
    pub fn with_stop(mut self, stop: oneshot::Sender<()>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Owner the subscription is filtered to.
    pub fn owner(&self) -> Uuid {
        self.owner
    }

    /// Stops the transport task, if any.
    ///
    /// A task with a stop signal is asked to finish and left to run to
    /// completion; any other task is aborted.
    pub fn close(mut self) {
        if let Some(stop) = self.stop.take() {
            if stop.send(()).is_ok() {
                self.task.take();
                return;
            }
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            tracing::debug!(subscription = %self.id, "aborting change feed task on drop");
            task.abort();
        }
    }
}

/// An open change subscription.
#[derive(Debug)]
pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub events: mpsc::UnboundedReceiver<ChangeEvent>,
}

/// Contract consumed from the hosted database.
///
/// Every call is scoped to the owner of `session`. Ownership is enforced by
/// the store; callers do not re-check it.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait BookmarkStore: Send + Sync + fmt::Debug {
    /// Returns the owner's bookmarks ordered by `created_at` descending.
    async fn select(&self, session: &Session) -> Result<Vec<Bookmark>>;

    /// Inserts a row. The store assigns `id` and `created_at`.
    async fn insert(&self, session: &Session, row: NewBookmark) -> Result<()>;

    /// Deletes the owner's row with the given id.
    async fn delete(&self, session: &Session, id: Uuid) -> Result<()>;

    /// Opens a change subscription filtered to the owner.
    async fn subscribe(&self, session: &Session) -> Result<Subscription>;

    /// Closes a subscription opened by [`BookmarkStore::subscribe`].
    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()>;
}
