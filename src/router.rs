//! URL routing: which platform a link belongs to and which backend serves it

use crate::backends::{Downloader, TikTokDownloader, UnavailableDownloader, YtDlpDownloader};
use crate::config::DownloadConfig;
use crate::types::Platform;
use std::collections::HashMap;
use std::sync::Arc;

/// Domain markers per platform, checked in [`Platform::ALL`] order
const DOMAIN_MARKERS: [(Platform, &[&str]); 3] = [
    (Platform::YouTube, &["youtube.com", "youtu.be"]),
    (Platform::TikTok, &["tiktok.com"]),
    (Platform::Instagram, &["instagram.com"]),
];

/// Classify a URL by case-insensitive domain sniffing
///
/// The first platform in priority order whose marker occurs anywhere in the
/// text wins. Returns `None` for unsupported links.
pub fn route(text: &str) -> Option<Platform> {
    let lower = text.to_lowercase();
    DOMAIN_MARKERS
        .iter()
        .find(|(_, markers)| markers.iter().any(|m| lower.contains(m)))
        .map(|(platform, _)| *platform)
}

/// Whether the text looks like it carries a link
pub fn contains_url(text: &str) -> bool {
    text.contains("http://")
        || text.contains("https://")
        || DOMAIN_MARKERS
            .iter()
            .flat_map(|(_, markers)| markers.iter())
            .any(|m| text.contains(m))
}

/// First whitespace-separated word starting with `http://` or `https://`
///
/// Trailing sentence punctuation (`.,;:!?`) is stripped.
pub fn extract_url(text: &str) -> Option<&str> {
    text.split_whitespace()
        .find(|word| word.starts_with("http://") || word.starts_with("https://"))
        .map(|word| word.trim_end_matches(['.', ',', ';', ':', '!', '?']))
}

/// Platform to backend bindings
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<Platform, Arc<dyn Downloader>>,
}

impl BackendRegistry {
    /// Empty registry; every URL resolves to `None`
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the standard bindings from configuration
    ///
    /// YouTube and Instagram use yt-dlp (explicit path, else PATH lookup). When
    /// yt-dlp is missing both platforms stay routable but fail every download.
    pub fn from_config(config: &DownloadConfig) -> crate::Result<Self> {
        let temp_dir = config.temp_dir.clone();
        let ytdlp = |platform: Platform| -> Arc<dyn Downloader> {
            let backend = match &config.ytdlp_path {
                Some(path) => Some(YtDlpDownloader::new(
                    path.clone(),
                    temp_dir.clone(),
                    platform,
                    config.video_quality.as_str(),
                )),
                None => YtDlpDownloader::from_path(
                    temp_dir.clone(),
                    platform,
                    &config.video_quality,
                ),
            };
            match backend {
                Some(backend) => Arc::new(backend),
                None => {
                    tracing::warn!(
                        platform = %platform,
                        "yt-dlp not found in PATH, downloads for this platform will fail"
                    );
                    Arc::new(UnavailableDownloader::new(
                        platform,
                        "yt-dlp not found. Please install yt-dlp: https://github.com/yt-dlp/yt-dlp",
                    ))
                }
            }
        };

        Ok(Self::new()
            .with(Platform::YouTube, ytdlp(Platform::YouTube))
            .with(Platform::Instagram, ytdlp(Platform::Instagram))
            .with(
                Platform::TikTok,
                Arc::new(TikTokDownloader::new(
                    config.tiktok_api_url.as_str(),
                    temp_dir.clone(),
                )?),
            ))
    }

    /// Bind (or rebind) a platform
    pub fn with(mut self, platform: Platform, backend: Arc<dyn Downloader>) -> Self {
        self.backends.insert(platform, backend);
        self
    }

    /// Route the URL and return the bound backend
    pub fn resolve(&self, url: &str) -> Option<(Platform, Arc<dyn Downloader>)> {
        let platform = route(url)?;
        self.backends
            .get(&platform)
            .map(|backend| (platform, backend.clone()))
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for platform in Platform::ALL {
            if let Some(backend) = self.backends.get(&platform) {
                map.entry(&platform.as_str(), &backend.name());
            }
        }
        map.finish()
    }
}
