//! Backend selection and application wiring

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::config::Config;
use crate::controller::{ClientController, ControllerConfig};
use crate::error::{BookmarkError, Result};
use crate::memory::{LocalIdentity, MemoryBookmarkStore, MemorySessionStore};
use crate::server::AppState;
use crate::session::SessionStore;
use crate::session_file::SessionFile;
use crate::store::BookmarkStore;
use crate::supabase::auth::SupabaseSessionStore;
use crate::supabase::rest::SupabaseBookmarkStore;
use crate::supabase::SupabaseClient;

/// The two collaborators the controller consumes.
#[derive(Debug, Clone)]
pub struct Backend {
    pub sessions: Arc<dyn SessionStore>,
    pub store: Arc<dyn BookmarkStore>,
}

impl Backend {
    /// Creates the backend named by `config.backend.kind`.
    ///
    /// # Errors
    ///
    /// Returns [`BookmarkError::Config`] for an unknown backend kind or
    /// missing Supabase settings.
    pub fn from_config(config: &Config) -> Result<Self> {
        match config.backend.kind.as_str() {
            "memory" => Ok(Self::memory(&config.auth.local_email)),
            "supabase" => Self::supabase(config),
            other => Err(BookmarkError::Config(format!("Unknown backend kind: {other}")).into()),
        }
    }

    /// In-process backend signing in as a single local account.
    pub fn memory(email: &str) -> Self {
        let identity = LocalIdentity {
            user_id: Uuid::new_v4(),
            email: email.to_string(),
        };
        tracing::info!(email, "using in-memory backend");
        Self {
            sessions: Arc::new(MemorySessionStore::new().with_local_identity(identity)),
            store: Arc::new(MemoryBookmarkStore::new()),
        }
    }

    fn supabase(config: &Config) -> Result<Self> {
        let supabase = &config.backend.supabase;
        let url = supabase
            .url
            .as_deref()
            .ok_or_else(|| BookmarkError::Config("backend.supabase.url is not set".to_string()))?;
        let anon_key = supabase.anon_key.as_deref().ok_or_else(|| {
            BookmarkError::Config("backend.supabase.anon_key is not set".to_string())
        })?;
        let client = SupabaseClient::new(url, anon_key)?;

        let session_file = if config.auth.persist_session {
            Some(match &config.auth.session_file {
                Some(path) => SessionFile::new(path),
                None => SessionFile::default_location()?,
            })
        } else {
            None
        };
        if let Some(file) = &session_file {
            tracing::debug!(path = %file.path().display(), "persisting session");
        }

        tracing::info!(url, table = %supabase.table, "using supabase backend");
        Ok(Self {
            sessions: Arc::new(SupabaseSessionStore::new(client.clone(), session_file)),
            store: Arc::new(
                SupabaseBookmarkStore::new(client, &supabase.table, &supabase.realtime_path)
                    .with_heartbeat_interval(Duration::from_secs(supabase.realtime_heartbeat_secs)),
            ),
        })
    }

    /// Controller over this backend.
    pub fn controller(&self, config: &Config) -> Result<Arc<ClientController>> {
        Ok(Arc::new(ClientController::new(
            Arc::clone(&self.sessions),
            Arc::clone(&self.store),
            ControllerConfig {
                redirect_to: config.callback_url()?,
                root: "/".to_string(),
            },
        )))
    }

    /// Handler state for the web server.
    pub fn app_state(&self, config: &Config) -> Result<AppState> {
        Ok(AppState {
            controller: self.controller(config)?,
            sessions: Arc::clone(&self.sessions),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_backend_from_config() {
        let mut config = Config::default();
        config.backend.kind = "memory".to_string();
        assert!(Backend::from_config(&config).is_ok());
    }

    #[test]
    fn test_supabase_backend_without_url_fails() {
        let config = Config::default();
        assert!(Backend::from_config(&config).is_err());
    }

    #[test]
    fn test_supabase_backend_without_persistence() {
        let mut config = Config::default();
        config.backend.supabase.url = Some("https://abcd.supabase.co".to_string());
        config.backend.supabase.anon_key = Some("anon".to_string());
        config.auth.persist_session = false;
        assert!(Backend::from_config(&config).is_ok());
    }

    #[test]
    fn test_unknown_backend_fails() {
        let mut config = Config::default();
        config.backend.kind = "sqlite".to_string();
        assert!(Backend::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_controller_redirects_to_callback() {
        let mut config = Config::default();
        config.backend.kind = "memory".to_string();
        config.server.public_origin = Some("http://bookmarks.test".to_string());
        let backend = Backend::from_config(&config).unwrap();
        let controller = backend.controller(&config).unwrap();
        controller.bootstrap().await.unwrap();

        let redirect = controller.sign_in().await.unwrap();
        assert_eq!(redirect.url.host_str(), Some("bookmarks.test"));
        assert_eq!(redirect.url.path(), "/auth/callback");
    }
}
