//! Stand-in backend for platforms whose tooling is missing

use super::traits::Downloader;
use crate::types::Platform;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Backend used when yt-dlp cannot be found
///
/// Keeps the platform routable so users get a clear failure reply instead of
/// an "unsupported link" message.
pub struct UnavailableDownloader {
    platform: Platform,
    reason: String,
}

impl UnavailableDownloader {
    /// Create a stand-in that fails every download with `reason`
    pub fn new(platform: Platform, reason: impl Into<String>) -> Self {
        Self {
            platform,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Downloader for UnavailableDownloader {
    async fn download(&self, _cancel: &CancellationToken, url: &str) -> crate::Result<PathBuf> {
        tracing::warn!(platform = %self.platform, url = %url, "Download backend unavailable");
        Err(crate::Error::ExternalTool(self.reason.clone()))
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }
}
