//! OAuth callback: `GET /auth/callback?code=...`
//!
//! Exchanges the authorization code for a session and always answers with a
//! `302` back to the root page:
//!
//! | outcome          | `Location`                     | cookies                         |
//! |------------------|--------------------------------|---------------------------------|
//! | no `code`        | `/`                            | none                            |
//! | exchange failed  | `/?error=auth_error_<status>`  | verifier cleared                |
//! | exchange ok      | `/`                            | access + refresh tokens set     |
//!
//! The query is read raw so that a malformed or repeated parameter still
//! ends in a redirect; the first `code` wins.

use axum::{
    extract::{RawQuery, State},
    http::HeaderMap,
    response::Response,
};

use super::{cookies, found, AppState};
use crate::error::BookmarkError;

/// Status reported when the auth service gave none.
const DEFAULT_ERROR_STATUS: u16 = 500;

/// First non-empty value of `code` in a raw query string.
pub fn first_code(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

pub async fn auth_callback(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let Some(code) = first_code(query.as_deref()) else {
        return found("/");
    };

    let verifier = cookies::get(&headers, cookies::CODE_VERIFIER);

    match state
        .sessions
        .exchange_code_for_session(&code, verifier)
        .await
    {
        Ok(session) => {
            tracing::info!(user_id = %session.user_id, "sign-in completed");
            let mut response = found("/");
            let out = response.headers_mut();
            cookies::append(out, cookies::set(cookies::ACCESS_TOKEN, &session.access_token));
            cookies::append(out, cookies::set(cookies::REFRESH_TOKEN, &session.refresh_token));
            cookies::append(out, cookies::clear(cookies::CODE_VERIFIER));

            // The root page must see the new session on the very next request.
            state.controller.handle_auth_change(Some(session)).await;
            response
        }
        Err(e) => {
            let status = BookmarkError::exchange_status(&e).unwrap_or(DEFAULT_ERROR_STATUS);
            tracing::error!(status, error = %e, "authorization code exchange failed");
            let mut response = found(&format!("/?error=auth_error_{status}"));
            cookies::append(
                response.headers_mut(),
                cookies::clear(cookies::CODE_VERIFIER),
            );
            response
        }
    }
}
