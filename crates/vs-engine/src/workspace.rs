//! Working storage for the ffmpeg backend.
//!
//! A [`Workspace`] is a temporary directory holding flat, named buffers. The
//! engine runs with the workspace as its current directory, so command lines
//! refer to staged files by bare name.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tempfile::TempDir;
use vs_core::{Error, Result};

/// Temporary named-buffer storage, removed when dropped.
pub struct Workspace {
    temp_dir: TempDir,
}

impl Workspace {
    /// Create a workspace under `parent`, or the system temp dir.
    pub fn new(parent: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("vidshrink-");
        let temp_dir = match parent {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
        .map_err(|e| Error::engine_init(format!("failed to create working storage: {e}")))?;

        Ok(Self { temp_dir })
    }

    /// Path to the workspace directory.
    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Resolve a buffer name to its path inside the workspace.
    ///
    /// Names must be a single path component: no separators, not empty, not
    /// `.` or `..`.
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\'])
            && !name.contains('\0');
        if !valid {
            return Err(Error::Validation(format!(
                "invalid working storage name: {name:?}"
            )));
        }
        Ok(self.temp_dir.path().join(name))
    }

    /// Store `data` under `name`, replacing any previous buffer.
    pub async fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        let path = self.path_for(name)?;
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    /// Read the buffer stored under `name`.
    ///
    /// Fails with [`Error::OutputMissing`] if nothing was stored.
    pub async fn read(&self, name: &str) -> Result<Bytes> {
        let path = self.path_for(name)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::output_missing(name)),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the buffer stored under `name`, if any.
    pub async fn remove(&self, name: &str) -> Result<()> {
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
