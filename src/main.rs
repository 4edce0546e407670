//! Bookmark manager - web server and CLI
//!
#![doc = "Main entry point for the bookmark manager."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bookmark_manager::cli::{Cli, Commands};
use bookmark_manager::commands;
use bookmark_manager::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    init_tracing(cli.verbose, cli.json_logs);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path)?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            backend,
        } => {
            tracing::info!("Starting web server");
            commands::serve::run_serve(config, host, port, backend).await?;
            Ok(())
        }
        Commands::List => {
            config.validate()?;
            commands::list::run_list(config).await?;
            Ok(())
        }
    }
}

/// Initialize the tracing subscriber
///
/// `RUST_LOG` wins when set; otherwise the filter defaults to `info` for
/// this crate (`debug` with `--verbose`).
fn init_tracing(verbose: bool, json_logs: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("bookmark_manager={default_level}")));

    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
