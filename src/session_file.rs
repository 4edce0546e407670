//! On-disk persistence of the current session
//!
//! The session is stored as a single JSON document. On Unix the file is
//! created with mode `0600` since it holds bearer tokens.

use std::path::{Path, PathBuf};

use crate::error::{BookmarkError, Result};
use crate::model::Session;

/// JSON file holding at most one session.
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Session file in the platform data directory
    /// (e.g. `~/.local/share/bookmark-manager/session.json`).
    ///
    /// # Errors
    ///
    /// Returns [`BookmarkError::Config`] when no home directory is known.
    pub fn default_location() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "bookmark-manager").ok_or_else(|| {
            BookmarkError::Config("could not determine a data directory".to_string())
        })?;
        Ok(Self::new(dirs.data_dir().join("session.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored session. A missing file means no session.
    pub fn load(&self) -> Result<Option<Session>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes `session`, creating parent directories as needed.
    pub fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(session)?;
        write_private(&self.path, contents.as_bytes())?;
        tracing::debug!(path = %self.path.display(), "session saved");
        Ok(())
    }

    /// Removes the stored session. Removing a missing file succeeds.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write as _;
    use std::os::unix::fs::OpenOptionsExt as _;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, contents)
}
