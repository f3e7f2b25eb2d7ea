//! Temp-directory bookkeeping for downloaded files

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The directory backends download into, and the only place cleanup may delete from
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    root: Arc<PathBuf>,
}

impl ArtifactStore {
    /// Create the directory if needed and pin its canonical path
    pub fn open(temp_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(temp_dir).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create temp directory '{}': {}",
                    temp_dir.display(),
                    e
                ),
            ))
        })?;
        let root = temp_dir.canonicalize()?;
        Ok(Self {
            root: Arc::new(root),
        })
    }

    /// Canonical temp directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Remove a file previously produced by a backend
    ///
    /// Returns `Ok(true)` when a file was removed and `Ok(false)` when there was
    /// nothing to remove (empty path, already gone). Paths that resolve to the
    /// temp directory itself or anywhere outside it are refused.
    pub fn cleanup(&self, path: &Path) -> Result<bool> {
        if path.as_os_str().is_empty() {
            return Ok(false);
        }

        let resolved = match path.canonicalize() {
            Ok(resolved) => resolved,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        if resolved == *self.root || !resolved.starts_with(&*self.root) {
            return Err(Error::PathOutsideTempDir {
                path: path.to_path_buf(),
            });
        }

        match std::fs::remove_file(&resolved) {
            Ok(()) => {
                tracing::info!(file = %resolved.display(), "Temporary file removed");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Take ownership of a downloaded file; it is removed when the guard drops
    pub fn adopt(&self, path: PathBuf) -> TempArtifact {
        TempArtifact {
            store: self.clone(),
            path,
        }
    }
}

/// A downloaded file that is deleted when this guard goes out of scope
#[derive(Debug)]
pub struct TempArtifact {
    store: ArtifactStore,
    path: PathBuf,
}

impl TempArtifact {
    /// Location of the file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the file in bytes
    pub async fn size(&self) -> std::io::Result<u64> {
        Ok(tokio::fs::metadata(&self.path).await?.len())
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if let Err(e) = self.store.cleanup(&self.path) {
            tracing::warn!(file = %self.path.display(), error = %e, "Failed to clean up file");
        }
    }
}
