//! TikTok downloader backed by the TikWM API

use super::partial::PartialOutput;
use super::traits::Downloader;
use crate::error::DownloadError;
use crate::types::Platform;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const REFERER: &str = "https://www.tiktok.com/";

#[derive(Debug, Deserialize)]
struct TikWmResponse {
    #[serde(default)]
    data: Option<TikWmData>,
}

#[derive(Debug, Deserialize)]
struct TikWmData {
    #[serde(default)]
    play: Option<String>,
}

/// Downloads TikTok videos by resolving a direct play URL through TikWM
pub struct TikTokDownloader {
    client: reqwest::Client,
    api_base: String,
    temp_dir: PathBuf,
}

impl TikTokDownloader {
    /// Create a downloader
    ///
    /// # Arguments
    ///
    /// * `api_base` - TikWM base URL, e.g. "https://tikwm.com"
    /// * `temp_dir` - Directory that receives downloaded files
    pub fn new(api_base: impl Into<String>, temp_dir: PathBuf) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            temp_dir,
        })
    }

    fn backend_error(reason: impl Into<String>) -> crate::Error {
        DownloadError::Backend {
            platform: Platform::TikTok,
            reason: reason.into(),
        }
        .into()
    }

    /// Ask TikWM for the direct video URL
    async fn resolve_play_url(&self, url: &str) -> crate::Result<String> {
        let response = self
            .client
            .get(format!("{}/api", self.api_base))
            .query(&[("url", url)])
            .timeout(Duration::from_secs(30))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::backend_error(format!(
                "API returned status code: {}",
                response.status().as_u16()
            )));
        }

        let body = response.text().await?;
        let play = match serde_json::from_str::<TikWmResponse>(&body) {
            Ok(parsed) => parsed.data.and_then(|d| d.play),
            Err(e) => {
                tracing::debug!(error = %e, "TikWM response is not valid JSON, scanning raw text");
                extract_play_url(&body)
            }
        };

        let play = play
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Self::backend_error("video URL not found in API response"))?;

        // TikWM sometimes hands out host-relative paths
        url::Url::parse(&self.api_base)
            .and_then(|base| base.join(&play))
            .map(String::from)
            .map_err(|e| Self::backend_error(format!("invalid video URL '{}': {}", play, e)))
    }

    async fn fetch_to(&self, play_url: &str, path: &Path) -> crate::Result<()> {
        let response = self
            .client
            .get(play_url)
            .header(reqwest::header::REFERER, REFERER)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::backend_error(format!(
                "video download returned status code: {}",
                response.status().as_u16()
            )));
        }

        let mut file = tokio::fs::File::create(path).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        Ok(())
    }

    async fn run(&self, url: &str, path: &Path) -> crate::Result<()> {
        let play_url = self.resolve_play_url(url).await?;
        self.fetch_to(&play_url, path).await
    }
}

#[async_trait]
impl Downloader for TikTokDownloader {
    async fn download(&self, cancel: &CancellationToken, url: &str) -> crate::Result<PathBuf> {
        tracing::info!(url = %url, "Starting TikTok video download");

        let output = PartialOutput::new(
            &self.temp_dir,
            format!("tiktok_{}", uuid::Uuid::new_v4().simple()),
        );
        let path = self.temp_dir.join(format!("{}.mp4", output.stem()));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled.into()),
            result = self.run(url, &path) => result?,
        }

        output.disarm();
        tracing::info!(url = %url, file = %path.display(), "TikTok video downloaded");
        Ok(path)
    }

    fn name(&self) -> &'static str {
        "tikwm"
    }
}

/// Pull `"play":"..."` out of a response that failed to parse as JSON
fn extract_play_url(body: &str) -> Option<String> {
    const KEY: &str = "\"play\":\"";
    let start = body.find(KEY)? + KEY.len();
    let end = body[start..].find('"')?;
    let url = body[start..start + end]
        .replace("\\/", "/")
        .replace("\\u0026", "&");
    Some(url)
}
