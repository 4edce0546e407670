use std::sync::Arc;
use std::time::Duration;

use url::Url;
use uuid::Uuid;

use bookmark_manager::controller::{ClientController, ControllerConfig, ControllerState};
use bookmark_manager::memory::{MemoryBookmarkStore, MemorySessionStore};
use bookmark_manager::session::SessionStore;
use bookmark_manager::store::BookmarkStore;
use bookmark_manager::Session;

#[allow(dead_code)]
pub fn session_for(user_id: Uuid, email: &str) -> Session {
    Session {
        user_id,
        email: email.to_string(),
        access_token: format!("access-{user_id}"),
        refresh_token: format!("refresh-{user_id}"),
        expires_at: None,
    }
}

#[allow(dead_code)]
pub fn controller_config() -> ControllerConfig {
    ControllerConfig {
        redirect_to: Url::parse("http://localhost:3000/auth/callback").expect("valid url"),
        root: "/".to_string(),
    }
}

#[allow(dead_code)]
pub fn controller_with(
    sessions: Arc<dyn SessionStore>,
    store: Arc<dyn BookmarkStore>,
) -> Arc<ClientController> {
    Arc::new(ClientController::new(sessions, store, controller_config()))
}

/// Memory-backed controller already holding `session`.
#[allow(dead_code)]
pub fn memory_controller(
    session: Option<Session>,
) -> (
    Arc<ClientController>,
    Arc<MemorySessionStore>,
    Arc<MemoryBookmarkStore>,
) {
    let sessions = Arc::new(match session {
        Some(session) => MemorySessionStore::with_session(session),
        None => MemorySessionStore::new(),
    });
    let store = Arc::new(MemoryBookmarkStore::new());
    let controller = controller_with(sessions.clone(), store.clone());
    (controller, sessions, store)
}

/// Waits until `predicate` holds for the controller state.
///
/// Panics after two seconds.
#[allow(dead_code)]
pub async fn eventually<F>(controller: &ClientController, predicate: F) -> ControllerState
where
    F: Fn(&ControllerState) -> bool,
{
    let mut updates = controller.updates();
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let state = controller.state().await;
            if predicate(&state) {
                return state;
            }
            updates
                .changed()
                .await
                .expect("controller dropped while waiting");
        }
    })
    .await
    .expect("condition not reached within timeout")
}

/// Titles of the signed-in list, in display order.
#[allow(dead_code)]
pub fn titles(state: &ControllerState) -> Vec<String> {
    match state {
        ControllerState::SignedIn(signed_in) => signed_in
            .bookmarks
            .iter()
            .map(|row| row.title.clone())
            .collect(),
        _ => Vec::new(),
    }
}
