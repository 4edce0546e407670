//! `serve` command

use crate::app::Backend;
use crate::config::Config;
use crate::error::Result;
use crate::server;

/// Applies CLI overrides, then serves until Ctrl+C or SIGTERM.
pub async fn run_serve(
    mut config: Config,
    host: Option<String>,
    port: Option<u16>,
    backend: Option<String>,
) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(kind) = backend {
        tracing::debug!("Using backend override: {}", kind);
        config.backend.kind = kind;
    }
    config.validate()?;

    let backend = Backend::from_config(&config)?;
    let state = backend.app_state(&config)?;
    let address = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(origin = %config.public_origin()?, "Public origin");

    server::serve(&address, state).await
}
