//! Session store abstraction
//!
//! This module defines the [`SessionStore`] trait, the contract the rest of
//! the application consumes from the hosted auth service. Concrete
//! implementations live in [`crate::supabase::auth`] and [`crate::memory`].
//!
//! The store owns the current session. Callers read it with
//! [`SessionStore::current_session`] and observe sign-in / sign-out through
//! the [`tokio::sync::watch`] channel returned by
//! [`SessionStore::auth_state_changes`].

use std::fmt;

use tokio::sync::watch;
use url::Url;

use crate::error::Result;
use crate::model::Session;

/// Identity providers the sign-in flow can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
}

impl OAuthProvider {
    /// Provider name as the auth service expects it.
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
        }
    }

    /// Parses a configured provider name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "google" => Some(OAuthProvider::Google),
            _ => None,
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for starting an OAuth redirect.
///
/// # Examples
///
/// ```
/// use bookmark_manager::session::{OAuthProvider, OAuthSignInRequest};
/// use url::Url;
///
/// let request = OAuthSignInRequest::google(
///     Url::parse("http://localhost:3000/auth/callback").unwrap(),
/// );
/// assert_eq!(request.provider, OAuthProvider::Google);
/// assert!(request
///     .query_params
///     .contains(&("prompt".to_string(), "select_account".to_string())));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthSignInRequest {
    pub provider: OAuthProvider,
    /// Where the provider sends the browser back (the callback handler).
    pub redirect_to: Url,
    /// Extra provider query parameters.
    pub query_params: Vec<(String, String)>,
}

impl OAuthSignInRequest {
    /// Google sign-in that always shows the account chooser and asks for
    /// offline access.
    pub fn google(redirect_to: Url) -> Self {
        Self {
            provider: OAuthProvider::Google,
            redirect_to,
            query_params: vec![
                ("prompt".to_string(), "select_account".to_string()),
                ("access_type".to_string(), "offline".to_string()),
            ],
        }
    }
}

/// Where to send the browser to continue an OAuth sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthRedirect {
    /// Provider authorization URL.
    pub url: Url,
    /// PKCE verifier to present when the code comes back, if the flow uses
    /// one.
    pub code_verifier: Option<String>,
}

/// Contract consumed from the hosted auth service.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync + fmt::Debug {
    /// Returns the current session, refreshing it first if it expired.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::BookmarkError::Auth`] when the session cannot
    /// be read or refreshed.
    async fn current_session(&self) -> Result<Option<Session>>;

    /// Builds the provider redirect that starts an OAuth sign-in.
    async fn begin_oauth_sign_in(&self, request: &OAuthSignInRequest) -> Result<OAuthRedirect>;

    /// Exchanges a single-use authorization code for a session and makes it
    /// the current one.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::BookmarkError::AuthExchange`] carrying the
    /// service's status code when the exchange is rejected, including when
    /// the code was already consumed.
    async fn exchange_code_for_session(
        &self,
        code: &str,
        code_verifier: Option<String>,
    ) -> Result<Session>;

    /// Terminates the current session.
    async fn sign_out(&self) -> Result<()>;

    /// Receiver that observes every change of the current session.
    fn auth_state_changes(&self) -> watch::Receiver<Option<Session>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_round_trips_name() {
        assert_eq!(OAuthProvider::parse("google"), Some(OAuthProvider::Google));
        assert_eq!(OAuthProvider::Google.to_string(), "google");
    }

    #[test]
    fn test_unknown_provider_rejected() {
        assert_eq!(OAuthProvider::parse("github"), None);
    }

    #[test]
    fn test_google_request_forces_account_selection() {
        let request =
            OAuthSignInRequest::google(Url::parse("http://localhost/auth/callback").unwrap());
        assert_eq!(request.redirect_to.path(), "/auth/callback");
        assert!(request
            .query_params
            .iter()
            .any(|(k, v)| k == "prompt" && v == "select_account"));
        assert!(request
            .query_params
            .iter()
            .any(|(k, v)| k == "access_type" && v == "offline"));
    }
}
