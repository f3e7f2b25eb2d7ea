//! # reelser-bot
//!
//! Telegram bot that downloads videos from YouTube, TikTok and Instagram and
//! sends them back to the chat.
//!
//! ## Design
//!
//! - **Bounded** - Inbound updates and download requests each go through a fixed
//!   pool of workers draining a queue of twice that size. A full queue rejects
//!   immediately instead of blocking the poll loop.
//! - **Deadline-driven** - Every request carries a cancellation token and an
//!   absolute deadline covering both the download and the upload.
//! - **Pluggable** - Backends implement [`backends::Downloader`] and the
//!   messaging side is behind [`transport::Transport`].
//! - **Event-driven** - Subscribers receive [`Event`]s for every request
//!   stage change.
//!
//! ## Quick Start
//!
//! ```no_run
//! use reelser_bot::{Config, ReelserBot, TelegramClient, run_with_shutdown};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let transport = Arc::new(TelegramClient::new(
//!         &config.telegram.api_url,
//!         &config.telegram.bot_token,
//!     )?);
//!     let bot = ReelserBot::new(config, transport).await?;
//!
//!     // Subscribe to events
//!     let mut events = bot.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     run_with_shutdown(bot).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Token-gated access control
pub mod auth;
/// Downloader backends (yt-dlp, TikWM)
pub mod backends;
/// Telegram front-end: update dispatch and classification
pub mod bot;
/// Configuration types
pub mod config;
/// Download orchestration (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Bounded work queue with a fixed worker pool
pub mod queue;
/// URL routing and backend registry
pub mod router;
/// Messaging transport abstraction and the Telegram Bot API client
pub mod transport;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use auth::AuthGate;
pub use bot::ReelserBot;
pub use config::Config;
pub use downloader::DownloadOrchestrator;
pub use error::{DownloadError, Error, FailureCategory, Result};
pub use router::BackendRegistry;
pub use transport::{TelegramClient, Transport};
pub use types::{ChatId, Event, MessageId, Platform, RequestId, RequestOrigin, RequestStage, UserId};

/// Helper function to run the bot with graceful signal handling.
///
/// Polls for updates until a termination signal arrives, then calls the bot's
/// `shutdown()` method.
///
/// # Platform Support
///
/// - **Unix:** listens for SIGTERM and SIGINT.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(bot: ReelserBot) -> Result<()> {
    let runner = bot.clone();
    let mut polling = tokio::spawn(async move { runner.run().await });

    let early_exit = tokio::select! {
        _ = wait_for_signal() => None,
        result = &mut polling => Some(result),
    };

    bot.shutdown().await?;

    let result = match early_exit {
        Some(result) => result,
        None => match tokio::time::timeout(bot::POLL_STOP_TIMEOUT, polling).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Poll loop did not stop in time");
                return Ok(());
            }
        },
    };
    result.map_err(|e| Error::Other(format!("poll loop task failed: {}", e)))?
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
