//! Command handlers for the CLI
//!
//! - `serve` runs the web server until interrupted
//! - `list`  bootstraps the controller once and prints the bookmark list

pub mod list;
pub mod serve;
