//! Page and form handlers
//!
//! Handlers that read or change the list first resolve the request's
//! session with [`authorize`].

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::{Html, IntoResponse, Response},
    Form,
};
use serde::Deserialize;
use uuid::Uuid;

use super::{authorize, cookies, found, see_other, AppError, AppState};
use crate::controller::{AddOutcome, ControllerState};
use crate::error::BookmarkError;
use crate::view;

/// `GET /`: the controller state as this request may see it.
///
/// A recognized token that a refresh has since replaced is swapped for the
/// current one.
pub async fn index(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if matches!(state.controller.state().await, ControllerState::Loading) {
        let _ = state.controller.bootstrap().await;
    }
    let presented = cookies::get(&headers, cookies::ACCESS_TOKEN);
    let visible = state.controller.state_for(presented.as_deref()).await;

    let screen = view::render(&visible);
    let mut response = Html(view::render_html(&screen)).into_response();
    if let ControllerState::SignedIn(signed_in) = &visible {
        let session = &signed_in.session;
        if presented.as_deref() != Some(session.access_token.as_str()) {
            let out = response.headers_mut();
            cookies::append(out, cookies::set(cookies::ACCESS_TOKEN, &session.access_token));
            cookies::append(out, cookies::set(cookies::REFRESH_TOKEN, &session.refresh_token));
        }
    }
    response
}

/// `GET /auth/sign-in`: starts the Google redirect.
pub async fn sign_in(State(state): State<AppState>) -> Result<Response, AppError> {
    let redirect = state.controller.sign_in().await?;
    let mut response = found(redirect.url.as_str());
    if let Some(verifier) = redirect.code_verifier {
        cookies::append(
            response.headers_mut(),
            cookies::set(cookies::CODE_VERIFIER, &verifier),
        );
    }
    Ok(response)
}

/// `POST /auth/sign-out`: ends the session and reloads the root page.
///
/// Without a recognized session only the request's own cookies are
/// cleared; the signed-in identity is left alone.
pub async fn sign_out(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let location = match authorize(&state, &headers).await {
        Ok(_) => state.controller.sign_out().await.location,
        Err(_) => {
            tracing::debug!("sign-out without a recognized session, clearing cookies only");
            "/".to_string()
        }
    };
    let mut response = found(&location);
    let out = response.headers_mut();
    cookies::append(out, cookies::clear(cookies::ACCESS_TOKEN));
    cookies::append(out, cookies::clear(cookies::REFRESH_TOKEN));
    response
}

#[derive(Debug, Deserialize)]
pub struct AddParams {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
}

/// `POST /bookmarks`: submits the add form.
pub async fn add_bookmark(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(params): Form<AddParams>,
) -> Result<Response, AppError> {
    authorize(&state, &headers).await?;
    state
        .controller
        .set_form(params.title, params.url)
        .await
        .map_err(not_signed_in_or_internal)?;

    match state
        .controller
        .add_bookmark()
        .await
        .map_err(not_signed_in_or_internal)?
    {
        AddOutcome::Submitted => {}
        AddOutcome::Rejected(reason) => tracing::debug!(?reason, "add rejected"),
    }
    Ok(see_other("/"))
}

/// `POST /bookmarks/:id/delete`
pub async fn delete_bookmark(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    authorize(&state, &headers).await?;
    state
        .controller
        .delete_bookmark(id)
        .await
        .map_err(not_signed_in_or_internal)?;
    Ok(see_other("/"))
}

fn not_signed_in_or_internal(err: anyhow::Error) -> AppError {
    match err.downcast_ref::<BookmarkError>() {
        Some(BookmarkError::NotSignedIn) => AppError::NotSignedIn,
        _ => AppError::Internal(err),
    }
}
