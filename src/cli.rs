//! Command-line interface definition
//!
//! This module defines the CLI structure using clap's derive API: `serve`
//! runs the web front end, `list` prints the signed-in user's bookmarks.

use clap::{Parser, Subcommand};

/// Personal bookmark manager with Google sign-in and live updates
#[derive(Parser, Debug, Clone)]
#[command(name = "bookmark-manager")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the web server
    Serve {
        /// Override the bind host from config
        #[arg(long)]
        host: Option<String>,

        /// Override the port from config
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the backend from config (supabase, memory)
        #[arg(short, long)]
        backend: Option<String>,
    },

    /// Print the signed-in user's bookmarks
    List,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
