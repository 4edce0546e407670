//! HTTP front end
//!
//! Serves the rendered controller state and turns form posts into
//! controller operations. The process hosts one signed-in identity at a
//! time; the shared [`ClientController`] follows the session store through
//! [`ClientController::watch_auth_changes`].
//!
//! Every request is checked against that identity through its
//! `sb-access-token` cookie (see [`authorize`]). A request without the
//! cookie, or with a token the controller never issued, sees the sign-in
//! page and cannot read or change the list.

pub mod callback;
pub mod cookies;
pub mod routes;

use std::sync::Arc;

use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use thiserror::Error;
use tokio::{net::TcpListener, signal};
use tracing::info;

use crate::config::CALLBACK_PATH;
use crate::controller::ClientController;
use crate::error::Result;
use crate::model::Session;
use crate::session::SessionStore;

/// State shared by every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub controller: Arc<ClientController>,
    pub sessions: Arc<dyn SessionStore>,
}

/// Errors a handler reports to the browser.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not signed in")]
    NotSignedIn,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::NotSignedIn => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, self.to_string()).into_response()
    }
}

/// Session presented by a request whose access token cookie the controller
/// recognizes.
///
/// # Errors
///
/// Returns [`AppError::NotSignedIn`] when the cookie is missing or belongs
/// to no signed-in identity.
pub(crate) async fn authorize(
    state: &AppState,
    headers: &HeaderMap,
) -> std::result::Result<Session, AppError> {
    let Some(token) = cookies::get(headers, cookies::ACCESS_TOKEN) else {
        return Err(AppError::NotSignedIn);
    };
    let session = state.controller.session_for(&token).await;
    if session.is_none() {
        tracing::debug!("request carries an unrecognized access token");
    }
    session.ok_or(AppError::NotSignedIn)
}

/// `302 Found` to `location`.
pub(crate) fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// `303 See Other` to `location`, used after form posts.
pub(crate) fn see_other(location: &str) -> Response {
    (StatusCode::SEE_OTHER, [(header::LOCATION, location.to_string())]).into_response()
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/auth/sign-in", get(routes::sign_in))
        .route(CALLBACK_PATH, get(callback::auth_callback))
        .route("/auth/sign-out", post(routes::sign_out))
        .route("/bookmarks", post(routes::add_bookmark))
        .route("/bookmarks/:id/delete", post(routes::delete_bookmark))
        .with_state(state)
}

/// Binds `address` and serves until Ctrl+C or SIGTERM.
///
/// On shutdown the auth watcher is stopped and the controller's live feed
/// is released.
pub async fn serve(address: &str, state: AppState) -> Result<()> {
    // A failed lookup is logged by the controller, which starts signed out.
    let _ = state.controller.bootstrap().await;
    let watcher = state.controller.watch_auth_changes();
    let controller = Arc::clone(&state.controller);

    let app = router(state);

    info!("Binding to {address}");
    let listener = TcpListener::bind(address).await?;
    info!("Server running on http://{address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down");
    watcher.abort();
    controller.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
