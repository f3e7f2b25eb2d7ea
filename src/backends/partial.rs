//! Cleanup of output a backend has started but not finished writing

use std::path::{Path, PathBuf};

/// Removes every file in `dir` whose name starts with `stem`, unless disarmed
///
/// The guard lives inside the backend's download future. When the request's
/// deadline or cancellation drops that future mid-download, the guard drops
/// with it, so the cleanup uses blocking `std::fs` calls.
#[derive(Debug)]
pub(crate) struct PartialOutput {
    dir: PathBuf,
    stem: String,
    armed: bool,
}

impl PartialOutput {
    pub(crate) fn new(dir: &Path, stem: impl Into<String>) -> Self {
        Self {
            dir: dir.to_path_buf(),
            stem: stem.into(),
            armed: true,
        }
    }

    /// File name prefix every output of this download shares
    pub(crate) fn stem(&self) -> &str {
        &self.stem
    }

    /// Keep the output: the download finished and the caller takes ownership
    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialOutput {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), error = %e, "Failed to scan for partial downloads");
                return;
            }
        };

        for entry in entries.flatten() {
            if !entry.file_name().to_string_lossy().starts_with(&self.stem) {
                continue;
            }
            let path = entry.path();
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!(file = %path.display(), "Removed partial download"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "Failed to remove partial download")
                }
            }
        }
    }
}
