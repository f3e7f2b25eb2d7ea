//! The download capability shared by every platform backend

use async_trait::async_trait;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// A platform backend that turns a URL into a local file
///
/// Implementations must write their artifact inside the configured temp
/// directory under a name no other request can produce, and must stop promptly
/// once `cancel` fires, removing any partial output they created.
///
/// # Examples
///
/// ```no_run
/// use reelser_bot::backends::{Downloader, YtDlpDownloader};
/// use reelser_bot::types::Platform;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = YtDlpDownloader::from_path("./tmp".into(), Platform::YouTube, "best")
///     .expect("yt-dlp not found in PATH");
///
/// let path = backend
///     .download(&CancellationToken::new(), "https://youtu.be/dQw4w9WgXcQ")
///     .await?;
/// println!("saved to {}", path.display());
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download the media behind `url`
    ///
    /// # Returns
    ///
    /// Path of the downloaded artifact. Cancellation yields
    /// [`crate::error::DownloadError::Cancelled`].
    async fn download(&self, cancel: &CancellationToken, url: &str) -> crate::Result<PathBuf>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}
