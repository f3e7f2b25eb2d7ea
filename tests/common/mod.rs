//! Shared helpers for the live backend tests

use std::path::PathBuf;
use tempfile::TempDir;

/// Skip the current test when yt-dlp is not installed
#[macro_export]
macro_rules! skip_if_no_ytdlp {
    () => {
        if which::which("yt-dlp").is_err() {
            eprintln!("Skipping: yt-dlp not found in PATH");
            return;
        }
    };
}

/// Read an optional URL override from the environment (`.env` is honoured)
pub fn live_url(key: &str, default: &str) -> String {
    dotenvy::dotenv().ok();
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Temp directory for backend output; keep the guard alive for the whole test
pub fn output_dir() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir
        .path()
        .canonicalize()
        .expect("failed to canonicalize temp dir");
    (dir, path)
}
