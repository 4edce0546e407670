//! Bookmark manager library
//!
//! A personal bookmark manager: one Google-authenticated user stores, lists,
//! and deletes URL/title pairs, with live updates across open sessions
//! through a hosted backend.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `session`: session store contract (OAuth sign-in, code exchange, sign-out)
//! - `store`: bookmark store contract and change-feed types
//! - `supabase`: hosted backend implementation of both contracts
//! - `memory`: in-process implementation of both contracts
//! - `controller`: the client state machine
//! - `view`: pure rendering of controller state
//! - `server`: axum routes, including the OAuth callback
//! - `config`: configuration management and validation
//! - `error`: error types and result aliases
//! - `cli`: command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use bookmark_manager::{app::Backend, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml")?;
//!     config.validate()?;
//!
//!     let backend = Backend::from_config(&config)?;
//!     let controller = backend.controller(&config)?;
//!     controller.bootstrap().await?;
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod controller;
pub mod error;
pub mod memory;
pub mod model;
pub mod pkce;
pub mod server;
pub mod session;
pub mod session_file;
pub mod store;
pub mod supabase;
pub mod view;

// Re-export commonly used types
pub use config::Config;
pub use controller::{ClientController, ControllerState};
pub use error::{BookmarkError, Result};
pub use model::{Bookmark, NewBookmark, Session};
pub use session::SessionStore;
pub use store::{BookmarkStore, ChangeEvent};
