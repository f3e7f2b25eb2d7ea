//! Error types for reelser-bot
//!
//! This module provides the error taxonomy for the bot, including:
//! - Domain-specific error types (Download, Config, transport, etc.)
//! - A coarse [`FailureCategory`] used for logging and user-facing replies
//! - Context information (platform, file path, sizes) on the variants that need it

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::Platform;

/// Result type alias for reelser-bot operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for reelser-bot
///
/// Each variant includes contextual information to help diagnose issues.
/// Nothing here is process-fatal except configuration errors and failing to
/// reach the transport at startup.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "TELEGRAM_BOT_TOKEN")
        key: Option<String>,
    },

    /// Download queue is at capacity, the request was not admitted
    #[error("download queue is full (capacity {capacity})")]
    QueueFull {
        /// Capacity of the queue that rejected the request
        capacity: usize,
    },

    /// User is not on the allow-list and presented no valid token
    #[error("user {0} is not authorized")]
    Unauthorized(i64),

    /// No backend recognises the URL
    #[error("unsupported platform or invalid URL: {0}")]
    UnsupportedUrl(String),

    /// Download-related error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Telegram Bot API rejected a call
    #[error("telegram API error in {method}: {description}")]
    Telegram {
        /// Bot API method name (e.g., "sendVideo")
        method: String,
        /// Error description returned by the API
        description: String,
        /// Error code returned by the API, if any
        code: Option<i64>,
    },

    /// Sending the finished video back to the chat failed
    #[error("delivery failed: {0}")]
    Delivery(#[source] Box<Error>),

    /// Cleanup was asked to remove a path outside the temp directory
    #[error("refusing to touch {path}: outside temp directory")]
    PathOutsideTempDir {
        /// The rejected path
        path: PathBuf,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External tool execution failed (yt-dlp)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Shutdown in progress - not accepting new work
    #[error("shutdown in progress: not accepting new requests")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Download-related errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The request's cancellation scope was cancelled
    #[error("download cancelled")]
    Cancelled,

    /// The request's deadline passed before processing finished
    #[error("request timed out after {timeout:?}")]
    TimedOut {
        /// Configured request timeout
        timeout: Duration,
    },

    /// A backend reported a failure
    #[error("{platform} download failed: {reason}")]
    Backend {
        /// The platform whose backend failed
        platform: Platform,
        /// The reason reported by the backend
        reason: String,
    },

    /// The backend claimed success but no file exists
    #[error("downloaded file does not exist: {path}")]
    ArtifactMissing {
        /// The path the backend returned
        path: PathBuf,
    },

    /// The artifact exceeds the effective size ceiling
    #[error("video is too large ({size} bytes, limit {limit} bytes)")]
    TooLarge {
        /// Artifact size in bytes
        size: u64,
        /// Effective ceiling in bytes
        limit: u64,
    },
}

/// Coarse failure classes used for logging and for picking user-facing replies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    /// Queue full, user should retry later
    Admission,
    /// Bad or missing token
    Authorization,
    /// URL not recognised
    Routing,
    /// Backend, network, tooling or cancellation failure
    Backend,
    /// Artifact exceeds the size ceiling
    SizeViolation,
    /// Send/delete failure on the messaging transport
    Transport,
    /// Anything else (configuration, local I/O, panics)
    Internal,
}

impl FailureCategory {
    /// Stable lowercase name for log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::Admission => "admission",
            FailureCategory::Authorization => "authorization",
            FailureCategory::Routing => "routing",
            FailureCategory::Backend => "backend",
            FailureCategory::SizeViolation => "size_violation",
            FailureCategory::Transport => "transport",
            FailureCategory::Internal => "internal",
        }
    }
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Create a configuration error tied to a specific key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Map this error onto the failure taxonomy
    pub fn category(&self) -> FailureCategory {
        match self {
            Error::QueueFull { .. } | Error::ShuttingDown => FailureCategory::Admission,
            Error::Unauthorized(_) => FailureCategory::Authorization,
            Error::UnsupportedUrl(_) => FailureCategory::Routing,
            Error::Download(DownloadError::TooLarge { .. }) => FailureCategory::SizeViolation,
            Error::Download(_) | Error::ExternalTool(_) | Error::Network(_) => {
                FailureCategory::Backend
            }
            Error::Telegram { .. } | Error::Delivery(_) => FailureCategory::Transport,
            Error::Config { .. }
            | Error::PathOutsideTempDir { .. }
            | Error::Io(_)
            | Error::Serialization(_)
            | Error::Other(_) => FailureCategory::Internal,
        }
    }

    /// Wrap an error raised while handing the video to the transport
    pub fn delivery(source: impl Into<Error>) -> Self {
        Error::Delivery(Box::new(source.into()))
    }

    /// Whether this error is the request's deadline or cancellation firing
    pub fn is_cancellation(&self) -> bool {
        match self {
            Error::Download(DownloadError::Cancelled | DownloadError::TimedOut { .. }) => true,
            Error::Delivery(source) => source.is_cancellation(),
            _ => false,
        }
    }
}
