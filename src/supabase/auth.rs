//! Hosted auth service (GoTrue) session store
//!
//! Implements [`SessionStore`] against the `/auth/v1` endpoints:
//!
//! 1. `begin_oauth_sign_in` builds the `/authorize` URL with a PKCE S256
//!    challenge and hands the verifier back to the caller.
//! 2. `exchange_code_for_session` posts the code and verifier to
//!    `/token?grant_type=pkce`.
//! 3. `current_session` refreshes an expired session through
//!    `/token?grant_type=refresh_token`.
//! 4. `sign_out` calls `/logout` and always drops the local session.
//!
//! The current session is optionally mirrored to a [`SessionFile`] so a
//! restarted server keeps the user signed in.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use super::{read_failure, SupabaseClient};
use crate::error::{BookmarkError, Result};
use crate::model::Session;
use crate::pkce;
use crate::session::{OAuthRedirect, OAuthSignInRequest, SessionStore};
use crate::session_file::SessionFile;

#[derive(Debug, Deserialize)]
struct TokenUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

/// Token endpoint response body.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    /// Unix seconds.
    #[serde(default)]
    expires_at: Option<i64>,
    user: TokenUser,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at: Option<DateTime<Utc>> = match (self.expires_at, self.expires_in) {
            (Some(at), _) => Utc.timestamp_opt(at, 0).single(),
            (None, Some(secs)) => Some(Utc::now() + chrono::Duration::seconds(secs)),
            (None, None) => None,
        };
        Session {
            user_id: self.user.id,
            email: self.user.email.unwrap_or_default(),
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
        }
    }
}

/// [`SessionStore`] backed by the hosted auth service.
#[derive(Debug)]
pub struct SupabaseSessionStore {
    client: SupabaseClient,
    changes: watch::Sender<Option<Session>>,
    session_file: Option<SessionFile>,
    refresh_lock: Mutex<()>,
}

impl SupabaseSessionStore {
    /// Creates a store, restoring the session from `session_file` if one was
    /// saved.
    ///
    /// An unreadable session file is logged and treated as signed out.
    pub fn new(client: SupabaseClient, session_file: Option<SessionFile>) -> Self {
        let restored = match session_file.as_ref().map(SessionFile::load) {
            Some(Ok(session)) => session,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "ignoring unreadable session file");
                None
            }
            None => None,
        };
        if let Some(session) = &restored {
            tracing::info!(user_id = %session.user_id, "restored saved session");
        }

        let (changes, _) = watch::channel(restored);
        Self {
            client,
            changes,
            session_file,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Makes `session` current, persisting it when a session file is set.
    fn publish(&self, session: Option<Session>) {
        if let Some(file) = &self.session_file {
            let persisted = match &session {
                Some(s) => file.save(s),
                None => file.clear(),
            };
            if let Err(e) = persisted {
                tracing::warn!(error = %e, path = %file.path().display(), "failed to update session file");
            }
        }
        self.changes.send_replace(session);
    }

    async fn post_token(&self, grant_type: &str, body: serde_json::Value) -> Result<Session> {
        let mut url = self.client.endpoint("/auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);

        let resp = self
            .client
            .request(reqwest::Method::POST, url, None)
            .json(&body)
            .send()
            .await
            .map_err(|e| BookmarkError::Auth(format!("token request failed: {e}")))?;

        if !resp.status().is_success() {
            let (status, message) = read_failure(resp).await;
            return Err(BookmarkError::AuthExchange { status, message }.into());
        }

        let raw: TokenResponse = resp
            .json()
            .await
            .map_err(|e| BookmarkError::Auth(format!("failed to parse token response: {e}")))?;
        Ok(raw.into_session())
    }

    async fn refresh(&self, stale: &Session) -> Result<Session> {
        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited.
        let current = self.changes.borrow().clone();
        if let Some(current) = current {
            if current.access_token != stale.access_token && !current.is_expired() {
                return Ok(current);
            }
        }

        tracing::debug!(user_id = %stale.user_id, "refreshing expired session");
        let session = self
            .post_token(
                "refresh_token",
                json!({ "refresh_token": stale.refresh_token }),
            )
            .await?;
        self.publish(Some(session.clone()));
        Ok(session)
    }
}

#[async_trait::async_trait]
impl SessionStore for SupabaseSessionStore {
    async fn current_session(&self) -> Result<Option<Session>> {
        let current = self.changes.borrow().clone();
        let Some(session) = current else {
            return Ok(None);
        };
        if !session.is_expired() {
            return Ok(Some(session));
        }

        match self.refresh(&session).await {
            Ok(refreshed) => Ok(Some(refreshed)),
            Err(e) => {
                tracing::warn!(error = %e, "session refresh failed; signing out locally");
                self.publish(None);
                Err(BookmarkError::Auth(format!("session could not be refreshed: {e}")).into())
            }
        }
    }

    async fn begin_oauth_sign_in(&self, request: &OAuthSignInRequest) -> Result<OAuthRedirect> {
        let pkce = pkce::generate();

        let mut url = self.client.endpoint("/auth/v1/authorize")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("provider", request.provider.as_str())
                .append_pair("redirect_to", request.redirect_to.as_str())
                .append_pair("code_challenge", &pkce.challenge)
                .append_pair("code_challenge_method", "s256");
            for (key, value) in &request.query_params {
                query.append_pair(key, value);
            }
        }

        tracing::debug!(provider = %request.provider, "built authorization redirect");
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
        let Some(code_verifier) = code_verifier else {
            return Err(BookmarkError::AuthExchange {
                status: 400,
                message: "missing PKCE code verifier".to_string(),
            }
            .into());
        };

        let session = self
            .post_token(
                "pkce",
                json!({ "auth_code": code, "code_verifier": code_verifier }),
            )
            .await?;
        tracing::info!(user_id = %session.user_id, "authorization code exchanged");
        self.publish(Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        let current = self.changes.borrow().clone();
        // Local state is dropped whatever the service answers.
        self.publish(None);

        let Some(session) = current else {
            return Ok(());
        };

        let url = self.client.endpoint("/auth/v1/logout")?;
        let resp = self
            .client
            .request(reqwest::Method::POST, url, Some(&session.access_token))
            .send()
            .await
            .map_err(|e| BookmarkError::Auth(format!("sign-out request failed: {e}")))?;

        if !resp.status().is_success() {
            let (status, message) = read_failure(resp).await;
            return Err(
                BookmarkError::Auth(format!("sign-out returned HTTP {status}: {message}")).into(),
            );
        }
        Ok(())
    }

    fn auth_state_changes(&self) -> watch::Receiver<Option<Session>> {
        self.changes.subscribe()
    }
}
