//! reelser-bot binary: loads configuration from the environment, sets up
//! logging and runs the bot until SIGTERM/SIGINT.

use reelser_bot::config::LogConfig;
use reelser_bot::{Config, ReelserBot, Result, TelegramClient, run_with_shutdown};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::from_env();
    let log = config
        .as_ref()
        .map(|config| config.log.clone())
        .unwrap_or_default();
    let _log_guard = init_logging(&log);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Bot exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(mut config: Config) -> Result<()> {
    std::fs::create_dir_all(&config.download.temp_dir)?;
    config.download.temp_dir = config.download.temp_dir.canonicalize()?;
    tracing::info!(
        temp_dir = %config.download.temp_dir.display(),
        max_video_size_mb = config.download.max_video_size_mb,
        worker_pool_size = config.download.worker_pool_size,
        timeout_secs = config.download.request_timeout.as_secs(),
        "Configuration loaded"
    );

    let transport = Arc::new(TelegramClient::new(
        &config.telegram.api_url,
        &config.telegram.bot_token,
    )?);
    let bot = ReelserBot::new(config, transport).await?;

    run_with_shutdown(bot).await
}

/// Log to stderr and, when possible, append to the configured log file
///
/// `RUST_LOG` takes precedence over the configured level. File output goes
/// through a background writer; the returned guard flushes it on drop and must
/// live until the process exits.
fn init_logging(log: &LogConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&log.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let mut file_error = None;
    let mut guard = None;
    let file_layer = log.file.as_ref().and_then(|path| {
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
        {
            Ok(file) => {
                let (writer, worker) = tracing_appender::non_blocking(file);
                guard = Some(worker);
                Some(fmt::layer().with_ansi(false).with_writer(writer))
            }
            Err(e) => {
                file_error = Some((path.clone(), e));
                None
            }
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    if let Some((path, e)) = file_error {
        tracing::warn!(
            file = %path.display(),
            error = %e,
            "Failed to open log file, logging to stderr only"
        );
    }

    guard
}
