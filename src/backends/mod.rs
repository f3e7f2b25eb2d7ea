//! Platform download backends
//!
//! Every backend implements the [`Downloader`] trait. The router binds a
//! [`Platform`](crate::types::Platform) to one of these:
//!
//! - [`YtDlpDownloader`]: runs the external `yt-dlp` binary (YouTube, Instagram)
//! - [`TikTokDownloader`]: resolves a direct URL through the TikWM API
//! - [`UnavailableDownloader`]: stand-in when yt-dlp is not installed

mod partial;
mod tiktok;
mod traits;
mod unavailable;
mod ytdlp;

pub use tiktok::TikTokDownloader;
pub use traits::Downloader;
pub use unavailable::UnavailableDownloader;
pub use ytdlp::{MediaKind, YtDlpDownloader};
