#![cfg(feature = "live-tests")]

//! Live tests against the real download backends.
//!
//! These hit YouTube through yt-dlp and TikTok through the public TikWM API,
//! so they need network access (and yt-dlp in `PATH` for the YouTube test).
//!
//! Gated behind the `live-tests` feature flag.
//!
//! ```bash
//! cargo test --features live-tests --test live_backends -- --nocapture
//! ```
//!
//! URLs can be overridden with `LIVE_YOUTUBE_URL` and `LIVE_TIKTOK_URL`.

#[macro_use]
mod common;

use reelser_bot::backends::{Downloader, TikTokDownloader, YtDlpDownloader};
use reelser_bot::config::DownloadConfig;
use reelser_bot::{BackendRegistry, Platform};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const SHORT_VIDEO: &str = "https://www.youtube.com/watch?v=jNQXAC9IVRw";

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn live_ytdlp_downloads_short_video() {
    skip_if_no_ytdlp!();

    let (_guard, dir) = common::output_dir();
    let backend = YtDlpDownloader::from_path(dir.clone(), Platform::YouTube, "worst")
        .expect("yt-dlp should be discoverable");
    let url = common::live_url("LIVE_YOUTUBE_URL", SHORT_VIDEO);

    let path = tokio::time::timeout(
        Duration::from_secs(180),
        backend.download(&CancellationToken::new(), &url),
    )
    .await
    .expect("download timed out")
    .expect("download failed");

    assert!(path.starts_with(&dir), "{} not in {}", path.display(), dir.display());
    let size = std::fs::metadata(&path).unwrap().len();
    assert!(size > 0);
    println!("Downloaded {} ({} bytes)", path.display(), size);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn live_ytdlp_cancellation_leaves_no_files() {
    skip_if_no_ytdlp!();

    let (_guard, dir) = common::output_dir();
    let backend = YtDlpDownloader::from_path(dir.clone(), Platform::YouTube, "best")
        .expect("yt-dlp should be discoverable");
    let url = common::live_url("LIVE_YOUTUBE_URL", SHORT_VIDEO);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let result = backend.download(&cancel, &url).await;
    assert!(result.is_err(), "cancelled download must not succeed");
    tokio::time::sleep(Duration::from_millis(200)).await;
    let leftovers: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
    assert!(leftovers.is_empty(), "left behind: {:?}", leftovers);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn live_tikwm_resolves_and_downloads() {
    let url = match std::env::var("LIVE_TIKTOK_URL") {
        Ok(url) if !url.trim().is_empty() => url,
        _ => {
            eprintln!("Skipping: LIVE_TIKTOK_URL not set");
            return;
        }
    };

    let (_guard, dir) = common::output_dir();
    let backend = TikTokDownloader::new("https://tikwm.com", dir.clone()).unwrap();
    let path = backend
        .download(&CancellationToken::new(), &url)
        .await
        .expect("TikTok download failed");

    assert!(path.file_name().unwrap().to_string_lossy().starts_with("tiktok_"));
    assert!(std::fs::metadata(&path).unwrap().len() > 0);
}

#[tokio::test]
async fn live_registry_binds_real_backends() {
    let (_guard, dir) = common::output_dir();
    let config = DownloadConfig {
        temp_dir: dir,
        ..DownloadConfig::default()
    };
    let registry = BackendRegistry::from_config(&config).unwrap();

    let (platform, backend) = registry.resolve(SHORT_VIDEO).unwrap();
    assert_eq!(platform, Platform::YouTube);
    let expected = if which::which("yt-dlp").is_ok() {
        "yt-dlp"
    } else {
        "unavailable"
    };
    assert_eq!(backend.name(), expected);
}
