//! Telegram front-end wiring the dispatcher, the authorization gate and the
//! download orchestrator together.
//!
//! - [`dispatcher`] - Long-poll loop and the bounded update worker pool
//! - [`handler`] - Classification of messages, commands and inline updates
//! - [`text`] - Every user-facing reply

mod dispatcher;
mod handler;
pub mod text;

use crate::auth::AuthGate;
use crate::config::Config;
use crate::downloader::DownloadOrchestrator;
use crate::error::Result;
use crate::router::BackendRegistry;
use crate::transport::Transport;
use crate::types::Event;
use dispatcher::Dispatcher;
use handler::UpdateHandler;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// The bot (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct ReelserBot {
    transport: Arc<dyn Transport>,
    auth: Arc<AuthGate>,
    orchestrator: DownloadOrchestrator,
    dispatcher: Arc<Dispatcher>,
    event_tx: broadcast::Sender<Event>,
    shutdown: CancellationToken,
    bot_username: Arc<str>,
}

impl ReelserBot {
    /// Build the bot with the backends described by `config.download`
    ///
    /// Asks the transport for the bot's username, so this fails when the
    /// messaging platform is unreachable or the token is rejected.
    pub async fn new(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        let registry = BackendRegistry::from_config(&config.download)?;
        Self::with_registry(config, transport, registry).await
    }

    /// Build the bot over an explicit set of backends
    pub async fn with_registry(
        config: Config,
        transport: Arc<dyn Transport>,
        registry: BackendRegistry,
    ) -> Result<Self> {
        config.validate()?;

        let bot_username = transport.bot_username().await?;
        tracing::debug!(backends = ?registry, "Download backends configured");

        // Event channel (buffer 1000 events)
        let (event_tx, _rx) = broadcast::channel(1000);

        let auth = Arc::new(AuthGate::new(&config.auth));
        let orchestrator = DownloadOrchestrator::new(
            &config.download,
            registry,
            transport.clone(),
            event_tx.clone(),
        )?;

        let handler = Arc::new(UpdateHandler::new(
            transport.clone(),
            auth.clone(),
            orchestrator.clone(),
            bot_username.as_str(),
        ));
        let dispatcher = Dispatcher::start(
            config.dispatch.update_workers,
            handler,
            transport.clone(),
            event_tx.clone(),
            config.telegram.poll_timeout,
        );

        tracing::info!(
            username = %bot_username,
            update_workers = dispatcher.workers(),
            update_queue_size = dispatcher.capacity(),
            download_queue_size = orchestrator.capacity(),
            auth_enabled = auth.is_enabled(),
            "Bot initialized"
        );

        Ok(Self {
            transport,
            auth,
            orchestrator,
            dispatcher: Arc::new(dispatcher),
            event_tx,
            shutdown: CancellationToken::new(),
            bot_username: bot_username.into(),
        })
    }

    /// Username of the bot account
    pub fn username(&self) -> &str {
        &self.bot_username
    }

    /// Subscribe to request and dispatch events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The authorization gate
    pub fn auth(&self) -> &AuthGate {
        &self.auth
    }

    /// The download orchestrator
    pub fn orchestrator(&self) -> &DownloadOrchestrator {
        &self.orchestrator
    }

    /// The messaging transport
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Poll for updates until [`ReelserBot::shutdown`] is called
    pub async fn run(&self) -> Result<()> {
        tracing::info!(username = %self.bot_username, "Starting bot");
        self.dispatcher.run(self.shutdown.clone()).await;
        Ok(())
    }

    /// Stop polling, then drain both worker pools
    ///
    /// In-flight downloads are cancelled and their chats notified; pending
    /// updates are discarded.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Stopping bot");
        self.shutdown.cancel();
        self.dispatcher.shutdown().await;
        self.orchestrator.shutdown().await;
        tracing::info!("Bot stopped");
        Ok(())
    }

    /// Whether [`ReelserBot::shutdown`] has been called
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Grace period `run_with_shutdown` gives the poll loop to notice shutdown
pub(crate) const POLL_STOP_TIMEOUT: Duration = Duration::from_secs(5);
