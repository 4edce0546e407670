//! Configuration management for the bookmark manager
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{BookmarkError, Result};
use crate::session::OAuthProvider;

/// Path of the OAuth callback route.
pub const CALLBACK_PATH: &str = "/auth/callback";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Which backend stores sessions and bookmarks
    #[serde(default)]
    pub backend: BackendConfig,
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Sign-in settings
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Backend selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// `supabase` or `memory`
    #[serde(default = "default_backend_kind")]
    pub kind: String,

    /// Hosted backend settings
    #[serde(default)]
    pub supabase: SupabaseConfig,
}

fn default_backend_kind() -> String {
    "supabase".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
            supabase: SupabaseConfig::default(),
        }
    }
}

/// Hosted backend (Supabase) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://abcd.supabase.co`
    #[serde(default)]
    pub url: Option<String>,

    /// Public (anon) API key
    #[serde(default)]
    pub anon_key: Option<String>,

    /// Table holding bookmark rows
    #[serde(default = "default_table")]
    pub table: String,

    /// Path of the realtime websocket endpoint
    #[serde(default = "default_realtime_path")]
    pub realtime_path: String,

    /// Seconds between realtime heartbeats
    #[serde(default = "default_realtime_heartbeat_secs")]
    pub realtime_heartbeat_secs: u64,
}

fn default_table() -> String {
    "bookmarks".to_string()
}

fn default_realtime_path() -> String {
    "/realtime/v1/websocket".to_string()
}

fn default_realtime_heartbeat_secs() -> u64 {
    25
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            table: default_table(),
            realtime_path: default_realtime_path(),
            realtime_heartbeat_secs: default_realtime_heartbeat_secs(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind
    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally visible origin. Defaults to `http://{host}:{port}`.
    #[serde(default)]
    pub public_origin: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_origin: None,
        }
    }
}

/// Sign-in settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// OAuth provider; only `google` is supported
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Keep the session on disk so restarts stay signed in
    #[serde(default = "default_persist_session")]
    pub persist_session: bool,

    /// Session file location; defaults to the platform data directory
    #[serde(default)]
    pub session_file: Option<PathBuf>,

    /// Email of the local account used by the memory backend
    #[serde(default = "default_local_email")]
    pub local_email: String,
}

fn default_provider() -> String {
    "google".to_string()
}

fn default_persist_session() -> bool {
    true
}

fn default_local_email() -> String {
    "local@localhost".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            persist_session: default_persist_session(),
            session_file: None,
            local_email: default_local_email(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment overrides
    ///
    /// A missing file is not an error; defaults are used instead.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| BookmarkError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| BookmarkError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(kind) = std::env::var("BOOKMARKS_BACKEND") {
            self.backend.kind = kind;
        }

        if let Ok(url) = std::env::var("BOOKMARKS_SUPABASE_URL") {
            self.backend.supabase.url = Some(url);
        }

        if let Ok(key) = std::env::var("BOOKMARKS_SUPABASE_ANON_KEY") {
            self.backend.supabase.anon_key = Some(key);
        }

        if let Ok(host) = std::env::var("BOOKMARKS_HOST") {
            self.server.host = host;
        }

        if let Ok(port) = std::env::var("BOOKMARKS_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(e) => tracing::warn!("Ignoring invalid BOOKMARKS_PORT {}: {}", port, e),
            }
        }

        if let Ok(origin) = std::env::var("BOOKMARKS_PUBLIC_ORIGIN") {
            self.server.public_origin = Some(origin);
        }

        if let Ok(path) = std::env::var("BOOKMARKS_SESSION_FILE") {
            self.auth.session_file = Some(PathBuf::from(path));
        }
    }

    /// Externally visible origin of the web server.
    pub fn public_origin(&self) -> Result<Url> {
        let raw = self
            .server
            .public_origin
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.server.host, self.server.port));
        Url::parse(&raw)
            .map_err(|e| BookmarkError::Config(format!("Invalid public origin {}: {}", raw, e)).into())
    }

    /// URL the OAuth provider redirects back to.
    pub fn callback_url(&self) -> Result<Url> {
        self.public_origin()?
            .join(CALLBACK_PATH)
            .map_err(|e| BookmarkError::Config(format!("Invalid callback URL: {}", e)).into())
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        let valid_backends = ["supabase", "memory"];
        if !valid_backends.contains(&self.backend.kind.as_str()) {
            return Err(BookmarkError::Config(format!(
                "Invalid backend kind: {}. Must be one of: {}",
                self.backend.kind,
                valid_backends.join(", ")
            ))
            .into());
        }

        if self.backend.kind == "supabase" {
            let url = self.backend.supabase.url.as_deref().unwrap_or_default();
            if url.is_empty() {
                return Err(BookmarkError::Config(
                    "backend.supabase.url is required for the supabase backend".to_string(),
                )
                .into());
            }
            Url::parse(url).map_err(|e| {
                BookmarkError::Config(format!("backend.supabase.url is not a valid URL: {}", e))
            })?;

            if self
                .backend
                .supabase
                .anon_key
                .as_deref()
                .unwrap_or_default()
                .is_empty()
            {
                return Err(BookmarkError::Config(
                    "backend.supabase.anon_key is required for the supabase backend".to_string(),
                )
                .into());
            }

            if self.backend.supabase.table.is_empty() {
                return Err(
                    BookmarkError::Config("backend.supabase.table cannot be empty".to_string())
                        .into(),
                );
            }

            if self.backend.supabase.realtime_heartbeat_secs == 0 {
                return Err(BookmarkError::Config(
                    "backend.supabase.realtime_heartbeat_secs must be greater than 0".to_string(),
                )
                .into());
            }
        }

        if OAuthProvider::parse(&self.auth.provider).is_none() {
            return Err(BookmarkError::Config(format!(
                "Unsupported auth provider: {}. Must be: google",
                self.auth.provider
            ))
            .into());
        }

        if self.server.port == 0 {
            return Err(
                BookmarkError::Config("server.port must be greater than 0".to_string()).into(),
            );
        }

        self.public_origin()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn memory_config() -> Config {
        let mut config = Config::default();
        config.backend.kind = "memory".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.backend.kind, "supabase");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.auth.provider, "google");
        assert_eq!(config.backend.supabase.table, "bookmarks");
    }

    #[test]
    fn test_memory_config_validates() {
        assert!(memory_config().validate().is_ok());
    }

    #[test]
    fn test_supabase_without_url_rejected() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("supabase.url"));
    }

    #[test]
    fn test_supabase_without_key_rejected() {
        let mut config = Config::default();
        config.backend.supabase.url = Some("https://abcd.supabase.co".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("anon_key"));
    }

    #[test]
    fn test_zero_heartbeat_rejected() {
        let mut config = Config::default();
        config.backend.supabase.url = Some("https://abcd.supabase.co".to_string());
        config.backend.supabase.anon_key = Some("key".to_string());
        assert!(config.validate().is_ok());
        config.backend.supabase.realtime_heartbeat_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let mut config = Config::default();
        config.backend.kind = "sqlite".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut config = memory_config();
        config.auth.provider = "github".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut config = memory_config();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_callback_url_uses_public_origin() {
        let mut config = memory_config();
        config.server.public_origin = Some("https://marks.example.com".to_string());
        assert_eq!(
            config.callback_url().unwrap().as_str(),
            "https://marks.example.com/auth/callback"
        );
    }

    #[test]
    fn test_callback_url_defaults_to_bind_address() {
        let config = memory_config();
        assert_eq!(
            config.callback_url().unwrap().as_str(),
            "http://127.0.0.1:3000/auth/callback"
        );
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
backend:
  kind: supabase
  supabase:
    url: https://abcd.supabase.co
    anon_key: public-anon-key
server:
  port: 8080
auth:
  persist_session: false
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(!config.auth.persist_session);
        assert_eq!(
            config.backend.supabase.realtime_path,
            "/realtime/v1/websocket"
        );
        assert_eq!(config.backend.supabase.realtime_heartbeat_secs, 25);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_load_nonexistent_file_uses_defaults() {
        let config = Config::load("/nonexistent/bookmarks.yaml").unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_load_invalid_yaml_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "server: [not, a, map]").unwrap();
        assert!(Config::load(path.to_str().unwrap()).is_err());
    }

    #[test]
    #[serial]
    fn test_apply_env_vars_overrides_backend() {
        std::env::set_var("BOOKMARKS_SUPABASE_URL", "https://env.supabase.co");
        std::env::set_var("BOOKMARKS_SUPABASE_ANON_KEY", "env-key");
        std::env::set_var("BOOKMARKS_PORT", "4000");

        let mut config = Config::default();
        config.apply_env_vars();

        std::env::remove_var("BOOKMARKS_SUPABASE_URL");
        std::env::remove_var("BOOKMARKS_SUPABASE_ANON_KEY");
        std::env::remove_var("BOOKMARKS_PORT");

        assert_eq!(
            config.backend.supabase.url.as_deref(),
            Some("https://env.supabase.co")
        );
        assert_eq!(config.backend.supabase.anon_key.as_deref(), Some("env-key"));
        assert_eq!(config.server.port, 4000);
    }

    #[test]
    #[serial]
    fn test_apply_env_vars_ignores_bad_port() {
        std::env::set_var("BOOKMARKS_PORT", "not-a-port");
        let mut config = Config::default();
        config.apply_env_vars();
        std::env::remove_var("BOOKMARKS_PORT");

        assert_eq!(config.server.port, 3000);
    }
}
