//! `list` command

use crate::app::Backend;
use crate::config::Config;
use crate::error::Result;
use crate::view;

/// Resolves the stored session and prints its bookmarks.
///
/// Prints `Not signed in.` when no session is stored; sign in through the
/// web server first.
pub async fn run_list(config: Config) -> Result<()> {
    let backend = Backend::from_config(&config)?;
    let controller = backend.controller(&config)?;

    let bootstrapped = controller.bootstrap().await;
    let screen = view::render(&controller.state().await);
    controller.shutdown().await;
    bootstrapped?;

    print!("{}", view::render_text(&screen));
    Ok(())
}
