use std::{
    io,
    path::{Path, PathBuf},
};

use tempfile::TempDir;

/// Private scratch directory for one archive session.
///
/// The fetcher writes its intermediate files here. The directory is removed
/// when the value is dropped, whichever way the session ends; a directory
/// that has already vanished is not an error.
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
    dir: Option<TempDir>,
}

impl WorkDir {
    const PREFIX: &str = "clip-harvest-";

    /// Creates a fresh, empty directory under `parent`
    pub fn create_in(parent: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(parent)?;
        let dir = tempfile::Builder::new()
            .prefix(Self::PREFIX)
            .tempdir_in(parent)
            .inspect_err(|e| {
                tracing::error!(error = ?e, parent = ?parent, "Failed to create work directory")
            })?;

        tracing::debug!(path = ?dir.path(), "Created work directory");
        Ok(Self {
            path: dir.path().to_path_buf(),
            dir: Some(dir),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        match dir.close() {
            Ok(()) => tracing::info!(path = ?self.path, "Cleaned up work directory"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = ?self.path, "Work directory already gone");
            }
            Err(e) => {
                tracing::warn!(error = ?e, path = ?self.path, "Failed to clean up work directory")
            }
        }
    }
}
