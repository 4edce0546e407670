//! Error types for the bookmark manager
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for bookmark manager operations
///
/// Covers configuration loading, the OAuth code exchange, bookmark store
/// queries and mutations, and the realtime change feed.
#[derive(Error, Debug)]
pub enum BookmarkError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authentication errors other than the code exchange (sign-in, sign-out,
    /// session lookup, refresh)
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The OAuth authorization code could not be exchanged for a session
    #[error("Auth code exchange failed: status={status}, {message}")]
    AuthExchange {
        /// HTTP status reported by the auth service
        status: u16,
        /// Message reported by the auth service
        message: String,
    },

    /// Bookmark store query or mutation errors
    #[error("Store error: {0}")]
    Store(String),

    /// Realtime change feed errors
    #[error("Realtime error: {0}")]
    Realtime(String),

    /// An operation that needs a signed-in user was called without one
    #[error("Not signed in")]
    NotSignedIn,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl BookmarkError {
    /// Returns the HTTP status carried by an [`BookmarkError::AuthExchange`]
    /// error anywhere in an `anyhow` chain.
    ///
    /// # Examples
    ///
    /// ```
    /// use bookmark_manager::error::BookmarkError;
    ///
    /// let err: anyhow::Error = BookmarkError::AuthExchange {
    ///     status: 400,
    ///     message: "invalid flow state".to_string(),
    /// }
    /// .into();
    /// assert_eq!(BookmarkError::exchange_status(&err), Some(400));
    /// ```
    pub fn exchange_status(err: &anyhow::Error) -> Option<u16> {
        err.chain().find_map(|cause| match cause.downcast_ref::<BookmarkError>() {
            Some(BookmarkError::AuthExchange { status, .. }) => Some(*status),
            _ => None,
        })
    }
}

/// Result type alias for bookmark manager operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
