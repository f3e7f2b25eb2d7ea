//! Configuration types for reelser-bot
//!
//! Configuration is grouped into sub-configs and normally loaded from the
//! environment (plus an optional `.env` file) with [`Config::from_env`].

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Telegram's hard upload ceiling for bot-sent videos, in megabytes
pub const TELEGRAM_MAX_VIDEO_SIZE_MB: i64 = 50;

/// Telegram Bot API connection settings
#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot credential issued by @BotFather (required)
    #[serde(default)]
    pub bot_token: String,

    /// Bot API base URL (default: "https://api.telegram.org")
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Long-polling timeout for getUpdates (default: 60 seconds)
    #[serde(default = "default_poll_timeout", with = "duration_serde")]
    pub poll_timeout: Duration,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_url: default_api_url(),
            poll_timeout: default_poll_timeout(),
        }
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("poll_timeout", &self.poll_timeout)
            .finish()
    }
}

/// Download behavior configuration (temp storage, limits, worker pool)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Directory for downloaded artifacts (default: "./tmp")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Maximum artifact size in megabytes (default: 50)
    ///
    /// Clamped to Telegram's 50 MB ceiling; non-positive values mean "use the ceiling".
    #[serde(default = "default_max_video_size_mb")]
    pub max_video_size_mb: i64,

    /// Quality hint passed to yt-dlp ("best" or "worst", default: "best")
    #[serde(default = "default_video_quality")]
    pub video_quality: String,

    /// Number of download workers (default: available parallelism)
    ///
    /// The download queue holds twice this many pending requests.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// Deadline for a single request, from admission to delivery (default: 5 minutes)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Path to yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,

    /// Base URL of the TikWM API used for TikTok (default: "https://tikwm.com")
    #[serde(default = "default_tiktok_api_url")]
    pub tiktok_api_url: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            max_video_size_mb: default_max_video_size_mb(),
            video_quality: default_video_quality(),
            worker_pool_size: default_worker_pool_size(),
            request_timeout: default_request_timeout(),
            ytdlp_path: None,
            tiktok_api_url: default_tiktok_api_url(),
        }
    }
}

/// Inbound update dispatch configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Number of update workers (default: available parallelism clamped to 2..=10)
    ///
    /// The update queue holds twice this many pending updates.
    #[serde(default = "default_update_workers")]
    pub update_workers: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            update_workers: default_update_workers(),
        }
    }
}

/// Token-gated access configuration
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Whether users must redeem a token before using the bot (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Valid access tokens
    #[serde(default)]
    pub tokens: Vec<String>,

    /// File mirroring approved user ids, one per line (None = memory only)
    #[serde(default)]
    pub allowed_users_file: Option<PathBuf>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("enabled", &self.enabled)
            .field("tokens", &format_args!("<{} redacted>", self.tokens.len()))
            .field("allowed_users_file", &self.allowed_users_file)
            .finish()
    }
}

/// Logging configuration (consumed by the binary)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default level filter when RUST_LOG is unset (default: "info")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// File that mirrors stderr logging (default: "reelser-bot.log")
    #[serde(default = "default_log_file")]
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration for reelser-bot
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Telegram Bot API settings
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Download settings (temp dir, limits, worker pool)
    #[serde(default)]
    pub download: DownloadConfig,

    /// Update dispatch settings
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Access control settings
    #[serde(default)]
    pub auth: AuthConfig,

    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from the process environment
    ///
    /// A `.env` file in the working directory is loaded first if present.
    /// See [`Config::from_lookup`] for the recognised keys.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// Empty values count as unset. Unparseable numbers and booleans fall back to
    /// their defaults.
    ///
    /// Recognised keys: `TELEGRAM_BOT_TOKEN`, `TELEGRAM_API_URL`,
    /// `TELEGRAM_POLL_TIMEOUT_SECS`, `TEMP_DIR`, `MAX_VIDEO_SIZE_MB`,
    /// `VIDEO_QUALITY`, `WORKER_POOL_SIZE`, `DOWNLOAD_TIMEOUT_SECS`, `YT_DLP_PATH`,
    /// `TIKTOK_API_URL`, `UPDATE_WORKER_POOL_SIZE`, `AUTH_ENABLED`, `AUTH_TOKENS`,
    /// `AUTH_ALLOWED_USERS_FILE`, `LOG_LEVEL`, `LOG_FILE`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let get_or = |key: &str, default: String| get(key).unwrap_or(default);
        let get_parsed = |key: &str| get(key).and_then(|v| v.trim().parse::<i64>().ok());

        let config = Self {
            telegram: TelegramConfig {
                bot_token: get_or("TELEGRAM_BOT_TOKEN", String::new()),
                api_url: get_or("TELEGRAM_API_URL", default_api_url()),
                poll_timeout: get_parsed("TELEGRAM_POLL_TIMEOUT_SECS")
                    .and_then(|s| u64::try_from(s).ok())
                    .map(Duration::from_secs)
                    .unwrap_or_else(default_poll_timeout),
            },
            download: DownloadConfig {
                temp_dir: get("TEMP_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(default_temp_dir),
                max_video_size_mb: get_parsed("MAX_VIDEO_SIZE_MB")
                    .unwrap_or_else(default_max_video_size_mb),
                video_quality: get_or("VIDEO_QUALITY", default_video_quality()),
                worker_pool_size: get_parsed("WORKER_POOL_SIZE")
                    .map(|n| usize::try_from(n).unwrap_or(0).max(1))
                    .unwrap_or_else(default_worker_pool_size),
                request_timeout: get_parsed("DOWNLOAD_TIMEOUT_SECS")
                    .and_then(|s| u64::try_from(s).ok())
                    .filter(|s| *s > 0)
                    .map(Duration::from_secs)
                    .unwrap_or_else(default_request_timeout),
                ytdlp_path: get("YT_DLP_PATH").map(PathBuf::from),
                tiktok_api_url: get_or("TIKTOK_API_URL", default_tiktok_api_url()),
            },
            dispatch: DispatchConfig {
                update_workers: get_parsed("UPDATE_WORKER_POOL_SIZE")
                    .map(|n| usize::try_from(n).unwrap_or(0).max(1))
                    .unwrap_or_else(default_update_workers),
            },
            auth: AuthConfig {
                enabled: get("AUTH_ENABLED")
                    .and_then(|v| parse_bool(&v))
                    .unwrap_or(false),
                tokens: get("AUTH_TOKENS")
                    .map(|v| split_and_trim(&v))
                    .unwrap_or_default(),
                allowed_users_file: Some(
                    get("AUTH_ALLOWED_USERS_FILE")
                        .map(PathBuf::from)
                        .unwrap_or_else(default_allowed_users_file),
                ),
            },
            log: LogConfig {
                level: get_or("LOG_LEVEL", default_log_level()),
                file: get("LOG_FILE").map(PathBuf::from).or_else(default_log_file),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Check required settings
    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(Error::config(
                "TELEGRAM_BOT_TOKEN is required",
                "TELEGRAM_BOT_TOKEN",
            ));
        }
        if self.auth.enabled && self.auth.tokens.is_empty() {
            tracing::warn!("Authorization is enabled but AUTH_TOKENS is empty; nobody new can sign in");
        }
        Ok(())
    }
}

/// Parse the boolean spellings accepted in environment variables
pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" => Some(true),
        "0" | "false" | "f" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// Split a comma separated list, trimming entries and dropping empty ones
pub(crate) fn split_and_trim(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("./tmp")
}

fn default_max_video_size_mb() -> i64 {
    TELEGRAM_MAX_VIDEO_SIZE_MB
}

fn default_video_quality() -> String {
    "best".to_string()
}

fn default_worker_pool_size() -> usize {
    available_parallelism()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_tiktok_api_url() -> String {
    "https://tikwm.com".to_string()
}

fn default_update_workers() -> usize {
    available_parallelism().clamp(2, 10)
}

fn default_allowed_users_file() -> PathBuf {
    PathBuf::from("./allowed_users.txt")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("reelser-bot.log"))
}

/// Serialize durations as whole seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn bot_token_is_required() {
        let err = load(&[]).unwrap_err();
        match err {
            Error::Config { key, .. } => assert_eq!(key.as_deref(), Some("TELEGRAM_BOT_TOKEN")),
            other => panic!("expected config error, got {:?}", other),
        }

        // Whitespace-only counts as unset
        assert!(load(&[("TELEGRAM_BOT_TOKEN", "   ")]).is_err());
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[("TELEGRAM_BOT_TOKEN", "123:abc")]).unwrap();

        assert_eq!(config.telegram.bot_token, "123:abc");
        assert_eq!(config.telegram.api_url, "https://api.telegram.org");
        assert_eq!(config.download.temp_dir, PathBuf::from("./tmp"));
        assert_eq!(config.download.max_video_size_mb, 50);
        assert_eq!(config.download.video_quality, "best");
        assert_eq!(config.download.request_timeout, Duration::from_secs(300));
        assert!(config.download.worker_pool_size >= 1);
        assert!((2..=10).contains(&config.dispatch.update_workers));
        assert!(!config.auth.enabled);
        assert!(config.auth.tokens.is_empty());
        assert_eq!(
            config.auth.allowed_users_file,
            Some(PathBuf::from("./allowed_users.txt"))
        );
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = load(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("TEMP_DIR", "/var/tmp/reels"),
            ("MAX_VIDEO_SIZE_MB", "20"),
            ("VIDEO_QUALITY", "worst"),
            ("WORKER_POOL_SIZE", "4"),
            ("UPDATE_WORKER_POOL_SIZE", "3"),
            ("DOWNLOAD_TIMEOUT_SECS", "90"),
            ("YT_DLP_PATH", "/opt/bin/yt-dlp"),
            ("AUTH_ENABLED", "yes"),
            ("AUTH_TOKENS", " alpha, beta ,,gamma "),
            ("AUTH_ALLOWED_USERS_FILE", "/data/allowed.txt"),
            ("LOG_LEVEL", "debug"),
        ])
        .unwrap();

        assert_eq!(config.download.temp_dir, PathBuf::from("/var/tmp/reels"));
        assert_eq!(config.download.max_video_size_mb, 20);
        assert_eq!(config.download.video_quality, "worst");
        assert_eq!(config.download.worker_pool_size, 4);
        assert_eq!(config.dispatch.update_workers, 3);
        assert_eq!(config.download.request_timeout, Duration::from_secs(90));
        assert_eq!(
            config.download.ytdlp_path,
            Some(PathBuf::from("/opt/bin/yt-dlp"))
        );
        assert!(config.auth.enabled);
        assert_eq!(config.auth.tokens, vec!["alpha", "beta", "gamma"]);
        assert_eq!(
            config.auth.allowed_users_file,
            Some(PathBuf::from("/data/allowed.txt"))
        );
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn malformed_numbers_fall_back_and_zero_workers_are_raised() {
        let config = load(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("MAX_VIDEO_SIZE_MB", "lots"),
            ("WORKER_POOL_SIZE", "0"),
            ("UPDATE_WORKER_POOL_SIZE", "-3"),
            ("DOWNLOAD_TIMEOUT_SECS", "0"),
            ("AUTH_ENABLED", "maybe"),
        ])
        .unwrap();

        assert_eq!(config.download.max_video_size_mb, 50);
        assert_eq!(config.download.worker_pool_size, 1);
        assert_eq!(config.dispatch.update_workers, 1);
        assert_eq!(config.download.request_timeout, Duration::from_secs(300));
        assert!(!config.auth.enabled);
    }

    #[test]
    fn negative_size_is_kept_for_clamping_downstream() {
        let config = load(&[("TELEGRAM_BOT_TOKEN", "t"), ("MAX_VIDEO_SIZE_MB", "-1")]).unwrap();
        assert_eq!(config.download.max_video_size_mb, -1);
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        for v in ["1", "true", "T", "yes", "Y"] {
            assert_eq!(parse_bool(v), Some(true), "{}", v);
        }
        for v in ["0", "false", "f", "NO", "n"] {
            assert_eq!(parse_bool(v), Some(false), "{}", v);
        }
        assert_eq!(parse_bool("sometimes"), None);
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = load(&[
            ("TELEGRAM_BOT_TOKEN", "123:very-secret"),
            ("AUTH_TOKENS", "hunter2"),
        ])
        .unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("very-secret"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"telegram": {"bot_token": "t"}, "download": {"request_timeout": 30}}"#)
                .unwrap();
        assert_eq!(config.telegram.bot_token, "t");
        assert_eq!(config.download.request_timeout, Duration::from_secs(30));
        assert_eq!(config.download.max_video_size_mb, 50);
        assert!(config.validate().is_ok());
    }
}
