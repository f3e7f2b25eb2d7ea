//! yt-dlp backed downloader (YouTube, Instagram)

use super::partial::PartialOutput;
use super::traits::Downloader;
use crate::error::DownloadError;
use crate::types::Platform;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Kind of media behind an Instagram link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Video with a video codec
    Video,
    /// Still image
    Photo,
    /// Audio only
    Audio,
}

impl MediaKind {
    /// Classify from the JSON document printed by `yt-dlp -J`
    ///
    /// Playlists (carousel posts) are classified by their first entry.
    pub fn from_info(info: &serde_json::Value) -> Self {
        let entry = info
            .get("entries")
            .and_then(|e| e.as_array())
            .and_then(|e| e.first())
            .unwrap_or(info);

        let field = |name: &str| {
            entry
                .get(name)
                .and_then(|v| v.as_str())
                .filter(|v| !v.is_empty() && *v != "none")
        };
        let dimension = |name: &str| entry.get(name).and_then(|v| v.as_u64()).unwrap_or(0);

        if field("vcodec").is_some() {
            return MediaKind::Video;
        }
        if field("acodec").is_some() {
            return MediaKind::Audio;
        }
        if dimension("width") > 0 && dimension("height") > 0 {
            return MediaKind::Photo;
        }

        match field("ext").map(|e| e.to_lowercase()).as_deref() {
            Some("jpg" | "jpeg" | "png" | "webp") => MediaKind::Photo,
            Some("mp3" | "m4a" | "ogg" | "opus") => MediaKind::Audio,
            _ => MediaKind::Video,
        }
    }

    /// Classify from non-JSON probe output by keyword
    fn sniff(output: &str) -> Option<Self> {
        if output.contains("video") || output.contains("mp4") {
            Some(MediaKind::Video)
        } else if output.contains("image") || output.contains("jpg") || output.contains("png") {
            Some(MediaKind::Photo)
        } else {
            None
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Photo => "photo",
            MediaKind::Audio => "audio",
        }
    }
}

/// Downloader that shells out to the `yt-dlp` binary
///
/// Each download writes `{prefix}_{uuid}.{ext}` into the temp directory. The
/// child process is killed and everything written under that prefix removed
/// when the download future is dropped, so cancelling the request or hitting
/// its deadline stops yt-dlp and leaves no partial files behind.
pub struct YtDlpDownloader {
    binary_path: PathBuf,
    temp_dir: PathBuf,
    platform: Platform,
    quality: String,
}

impl YtDlpDownloader {
    /// Create a downloader with an explicit binary path
    ///
    /// # Arguments
    ///
    /// * `binary_path` - Path to the yt-dlp binary
    /// * `temp_dir` - Directory that receives downloaded files
    /// * `platform` - Platform this instance serves (Instagram enables media probing)
    /// * `quality` - "best" or "worst"; anything else means "best"
    pub fn new(
        binary_path: PathBuf,
        temp_dir: PathBuf,
        platform: Platform,
        quality: impl Into<String>,
    ) -> Self {
        Self {
            binary_path,
            temp_dir,
            platform,
            quality: quality.into(),
        }
    }

    /// Attempt to find yt-dlp in PATH
    pub fn from_path(temp_dir: PathBuf, platform: Platform, quality: &str) -> Option<Self> {
        which::which("yt-dlp")
            .ok()
            .map(|binary| Self::new(binary, temp_dir, platform, quality))
    }

    fn file_prefix(&self) -> &'static str {
        match self.platform {
            Platform::Instagram => "ig",
            Platform::YouTube => "yt",
            Platform::TikTok => "tt",
        }
    }

    fn video_format(&self) -> &'static str {
        match self.quality.to_lowercase().as_str() {
            "worst" => "worst[ext=mp4]/worst",
            _ => "best[ext=mp4]/best",
        }
    }

    /// Arguments for the download invocation
    fn download_args(&self, url: &str, kind: MediaKind, output_template: &Path) -> Vec<String> {
        let mut args = vec![
            url.to_string(),
            "-o".to_string(),
            output_template.to_string_lossy().into_owned(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--quiet".to_string(),
        ];

        match kind {
            MediaKind::Video => args.extend(["-f".to_string(), self.video_format().to_string()]),
            MediaKind::Photo => args.extend(["-f".to_string(), "best".to_string()]),
            MediaKind::Audio => args.extend(
                ["-f", "bestaudio/best", "-x", "--audio-format", "mp3"].map(String::from),
            ),
        }

        args
    }

    /// Probe the media type with `yt-dlp -J`; any failure means video
    async fn probe_media_kind(&self, url: &str) -> MediaKind {
        let output = Command::new(&self.binary_path)
            .args([url, "-J", "--no-playlist", "--no-warnings", "--quiet"])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        let output = match output {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                tracing::warn!(
                    url = %url,
                    status = %output.status,
                    "Media probe failed, assuming video"
                );
                return MediaKind::Video;
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Media probe failed, assuming video");
                return MediaKind::Video;
            }
        };

        match serde_json::from_slice::<serde_json::Value>(&output.stdout) {
            Ok(info) => MediaKind::from_info(&info),
            Err(e) => MediaKind::sniff(&String::from_utf8_lossy(&output.stdout)).unwrap_or_else(
                || {
                    tracing::warn!(url = %url, error = %e, "Unparseable media probe, assuming video");
                    MediaKind::Video
                },
            ),
        }
    }

    async fn run(&self, url: &str, stem: &str) -> crate::Result<PathBuf> {
        let kind = if self.platform == Platform::Instagram {
            let kind = self.probe_media_kind(url).await;
            tracing::info!(url = %url, media = kind.as_str(), "Detected media type");
            kind
        } else {
            MediaKind::Video
        };

        let template = self.temp_dir.join(format!("{}.%(ext)s", stem));
        let output = Command::new(&self.binary_path)
            .args(self.download_args(url, kind, &template))
            .current_dir(&self.temp_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| crate::Error::ExternalTool(format!("Failed to execute yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("yt-dlp exited with an error")
                .trim()
                .to_string();
            tracing::error!(
                url = %url,
                platform = %self.platform,
                status = %output.status,
                stderr = %stderr,
                "yt-dlp download failed"
            );
            return Err(DownloadError::Backend {
                platform: self.platform,
                reason,
            }
            .into());
        }

        find_output(&self.temp_dir, stem).await?.ok_or_else(|| {
            DownloadError::Backend {
                platform: self.platform,
                reason: "downloaded file not found".to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl Downloader for YtDlpDownloader {
    async fn download(&self, cancel: &CancellationToken, url: &str) -> crate::Result<PathBuf> {
        let output = PartialOutput::new(
            &self.temp_dir,
            format!("{}_{}", self.file_prefix(), uuid::Uuid::new_v4().simple()),
        );
        tracing::info!(url = %url, platform = %self.platform, "Starting yt-dlp download");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DownloadError::Cancelled.into()),
            result = self.run(url, output.stem()) => result,
        };

        if result.is_ok() {
            output.disarm();
        }
        result
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

/// Find the finished file for `stem`, ignoring yt-dlp's partial files
async fn find_output(dir: &Path, stem: &str) -> crate::Result<Option<PathBuf>> {
    let prefix = format!("{}.", stem);
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(&prefix) && !name.ends_with(".part") && !name.ends_with(".ytdl") {
            return Ok(Some(entry.path()));
        }
    }
    Ok(None)
}
